//! Task record type
//!
//! A Task is one reminder the user asked for: what to do and when to be
//! nudged about it. The `status` field doubles as the scheduler's
//! deduplication state - once a task leaves a reminder-eligible status,
//! `find_due` stops returning it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, no reminder sent yet
    #[default]
    Active,
    /// Initial reminder delivered
    Reminded,
    /// Escalation (nudge) delivered; no further notifications
    Nudged,
    /// Marked done by the user
    Completed,
    /// Discarded by the user
    Cancelled,
}

impl TaskStatus {
    /// Statuses the scheduler still cares about
    pub fn is_reminder_eligible(&self) -> bool {
        matches!(self, Self::Active | Self::Reminded)
    }

    /// Terminal statuses never come back
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Reminded => write!(f, "reminded"),
            Self::Nudged => write!(f, "nudged"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "reminded" => Ok(Self::Reminded),
            "nudged" => Ok(Self::Nudged),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A single reminder task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (uuid v7)
    pub id: String,

    /// Chat the task was created in (replies go here)
    pub chat_id: i64,

    /// User who created the task
    pub user_id: i64,

    /// What the user asked to be reminded about
    pub description: String,

    /// When the reminder is due
    pub due_at: DateTime<Utc>,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new active task with a generated ID
    pub fn new(chat_id: i64, user_id: i64, description: impl Into<String>, due_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            chat_id,
            user_id,
            description: description.into(),
            due_at,
            status: TaskStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the status, bumping `updated_at`
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Seconds past due at `now`; negative when not yet due
    pub fn overdue_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.due_at).num_seconds()
    }
}
