//! Event and topic types
//!
//! The vocabulary of nudgebot activity: every message crossing the bus is
//! an [`Event`] whose payload belongs to exactly one [`Topic`]. The pairing
//! is a total match in [`EventPayload::topic`], so a payload cannot be
//! published under the wrong topic - there is no string key to get wrong.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskstore::Task;
use uuid::Uuid;

/// Logical channels on the event bus
///
/// The set is closed: adding a variant means adding a payload variant and
/// extending the `topic()` match, both checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Inbound user text accepted by the chat service
    MessageReceived,
    /// Parser extracted a task draft from user text
    TaskParsed,
    /// Parser could not extract a task
    TaskParseFailed,
    /// Chat service asks the repository to act on a task
    TaskActionRequested,
    /// Repository finished a requested action
    TaskActionCompleted,
    /// Repository persisted a new task
    TaskCreated,
    /// Scheduler found a task newly past due
    ReminderDue,
    /// Scheduler found a reminded task overdue past the nudge delay
    ReminderNudge,
}

impl Topic {
    /// All topics, in no particular order
    pub const ALL: [Topic; 8] = [
        Topic::MessageReceived,
        Topic::TaskParsed,
        Topic::TaskParseFailed,
        Topic::TaskActionRequested,
        Topic::TaskActionCompleted,
        Topic::TaskCreated,
        Topic::ReminderDue,
        Topic::ReminderNudge,
    ];

    /// Wire/log name of the topic
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::MessageReceived => "message.received",
            Topic::TaskParsed => "task.parsed",
            Topic::TaskParseFailed => "task.parse_failed",
            Topic::TaskActionRequested => "task.action.requested",
            Topic::TaskActionCompleted => "task.action.completed",
            Topic::TaskCreated => "task.created",
            Topic::ReminderDue => "reminder.due",
            Topic::ReminderNudge => "reminder.nudge",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task operation requested on behalf of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TaskAction {
    /// Persist a confirmed draft
    Create {
        description: String,
        due_at: DateTime<Utc>,
    },
    /// Mark a task done
    Complete { task_id: String },
    /// Remove a task entirely
    Delete { task_id: String },
    /// Push a task's due time out by some minutes
    Snooze { task_id: String, minutes: i64 },
}

impl TaskAction {
    /// Short name for logs and replies
    pub fn name(&self) -> &'static str {
        match self {
            TaskAction::Create { .. } => "create",
            TaskAction::Complete { .. } => "complete",
            TaskAction::Delete { .. } => "delete",
            TaskAction::Snooze { .. } => "snooze",
        }
    }
}

/// What happened to a requested action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Completed { description: String },
    Deleted { description: String },
    Snoozed { description: String, until: DateTime<Utc> },
    /// The referenced task no longer exists
    NotFound,
}

/// Topic-specific event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    MessageReceived {
        user_id: i64,
        chat_id: i64,
        text: String,
    },
    TaskParsed {
        user_id: i64,
        chat_id: i64,
        description: String,
        due_at: DateTime<Utc>,
    },
    TaskParseFailed {
        user_id: i64,
        chat_id: i64,
        text: String,
        reason: String,
    },
    TaskActionRequested {
        user_id: i64,
        chat_id: i64,
        action: TaskAction,
    },
    TaskActionCompleted {
        chat_id: i64,
        action: String,
        task_id: Option<String>,
        outcome: ActionOutcome,
    },
    TaskCreated {
        task: Task,
    },
    ReminderDue {
        task: Task,
    },
    ReminderNudge {
        task: Task,
        overdue_secs: i64,
    },
}

impl EventPayload {
    /// The topic this payload is published under
    pub fn topic(&self) -> Topic {
        match self {
            EventPayload::MessageReceived { .. } => Topic::MessageReceived,
            EventPayload::TaskParsed { .. } => Topic::TaskParsed,
            EventPayload::TaskParseFailed { .. } => Topic::TaskParseFailed,
            EventPayload::TaskActionRequested { .. } => Topic::TaskActionRequested,
            EventPayload::TaskActionCompleted { .. } => Topic::TaskActionCompleted,
            EventPayload::TaskCreated { .. } => Topic::TaskCreated,
            EventPayload::ReminderDue { .. } => Topic::ReminderDue,
            EventPayload::ReminderNudge { .. } => Topic::ReminderNudge,
        }
    }
}

/// An immutable record of something that happened
///
/// `correlation_id` is minted where a request enters the system (webhook
/// ingestion, scheduler cycle) and carried through every derived event so
/// one user interaction can be traced across services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID (uuid v7)
    pub id: String,

    /// ID tying this event to the request that triggered it
    pub correlation_id: String,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// Topic-specific payload
    pub payload: EventPayload,
}

impl Event {
    /// Create an event carrying an existing correlation ID
    pub fn new(correlation_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            correlation_id: correlation_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Create an event starting a fresh correlation chain
    pub fn fresh(payload: EventPayload) -> Self {
        Self::new(Uuid::now_v7().to_string(), payload)
    }

    /// The topic this event is published under
    pub fn topic(&self) -> Topic {
        self.payload.topic()
    }
}
