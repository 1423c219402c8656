//! Per-user chat session state
//!
//! Conversations are short state machines: a user asks for a task, the bot
//! parses and asks for confirmation, the user confirms or manages existing
//! tasks. State lives in an explicitly constructed [`SessionManager`]
//! injected into the chat service - never a global - so tests can run
//! isolated instances in parallel. Sessions idle past the configured
//! window are swept to bound memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

/// A parsed task awaiting user confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub description: String,
    pub due_at: DateTime<Utc>,
}

/// Where one user's conversation currently stands
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ChatState {
    /// Nothing pending
    #[default]
    Idle,
    /// `/add` issued, waiting for the task text
    AwaitingTask,
    /// Draft parsed, waiting for the confirm/discard button
    ConfirmingTask { draft: TaskDraft },
    /// `/list` issued, task-management keyboard showing
    ManagingTasks,
}

struct Session {
    state: ChatState,
    last_activity: Instant,
}

/// Owns the session map, keyed by user ID
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for a user (Idle when no session exists)
    pub fn state(&self, user_id: i64) -> ChatState {
        let sessions = self.sessions.lock().expect("session map poisoned");
        sessions.get(&user_id).map(|s| s.state.clone()).unwrap_or_default()
    }

    /// Set a user's state, refreshing the idle clock
    pub fn set_state(&self, user_id: i64, state: ChatState) {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        sessions.insert(
            user_id,
            Session {
                state,
                last_activity: Instant::now(),
            },
        );
    }

    /// Refresh a user's idle clock without changing state
    pub fn touch(&self, user_id: i64) {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        if let Some(session) = sessions.get_mut(&user_id) {
            session.last_activity = Instant::now();
        }
    }

    /// Return the user to Idle, taking the draft if one was pending
    pub fn take_draft(&self, user_id: i64) -> Option<TaskDraft> {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        let session = sessions.get_mut(&user_id)?;
        match std::mem::take(&mut session.state) {
            ChatState::ConfirmingTask { draft } => {
                session.last_activity = Instant::now();
                Some(draft)
            }
            other => {
                // not confirming: put the state back untouched
                session.state = other;
                None
            }
        }
    }

    /// Drop the user's session entirely
    pub fn clear(&self, user_id: i64) {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        sessions.remove(&user_id);
    }

    /// Drop sessions idle beyond the window; returns how many were evicted
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        let before = sessions.len();
        sessions.retain(|_, s| s.last_activity.elapsed() < max_idle);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session map poisoned").len()
    }

    /// True when no sessions are live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn backdate(&self, user_id: i64, age: Duration) {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        if let Some(session) = sessions.get_mut(&user_id) {
            if let Some(backdated) = Instant::now().checked_sub(age) {
                session.last_activity = backdated;
            }
        }
    }
}

/// Spawn the periodic idle-eviction sweep
pub fn spawn_session_sweeper(
    sessions: Arc<SessionManager>,
    interval: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sessions.evict_idle(max_idle);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> TaskDraft {
        TaskDraft {
            description: "water plants".to_string(),
            due_at: Utc::now(),
        }
    }

    #[test]
    fn test_unknown_user_is_idle() {
        let sessions = SessionManager::new();
        assert_eq!(sessions.state(99), ChatState::Idle);
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_state_transitions() {
        let sessions = SessionManager::new();

        sessions.set_state(1, ChatState::AwaitingTask);
        assert_eq!(sessions.state(1), ChatState::AwaitingTask);

        sessions.set_state(1, ChatState::ConfirmingTask { draft: draft() });
        assert!(matches!(sessions.state(1), ChatState::ConfirmingTask { .. }));

        sessions.set_state(1, ChatState::ManagingTasks);
        assert_eq!(sessions.state(1), ChatState::ManagingTasks);

        sessions.clear(1);
        assert_eq!(sessions.state(1), ChatState::Idle);
    }

    #[test]
    fn test_sessions_are_per_user() {
        let sessions = SessionManager::new();
        sessions.set_state(1, ChatState::AwaitingTask);
        sessions.set_state(2, ChatState::ManagingTasks);

        assert_eq!(sessions.state(1), ChatState::AwaitingTask);
        assert_eq!(sessions.state(2), ChatState::ManagingTasks);
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn test_take_draft_only_when_confirming() {
        let sessions = SessionManager::new();

        sessions.set_state(1, ChatState::AwaitingTask);
        assert!(sessions.take_draft(1).is_none());
        // state untouched by the failed take
        assert_eq!(sessions.state(1), ChatState::AwaitingTask);

        sessions.set_state(1, ChatState::ConfirmingTask { draft: draft() });
        let taken = sessions.take_draft(1).unwrap();
        assert_eq!(taken.description, "water plants");
        // taking the draft lands the user back in Idle
        assert_eq!(sessions.state(1), ChatState::Idle);
    }

    #[test]
    fn test_evict_idle_drops_only_stale_sessions() {
        let sessions = SessionManager::new();
        sessions.set_state(1, ChatState::AwaitingTask);
        sessions.set_state(2, ChatState::ManagingTasks);
        sessions.backdate(1, Duration::from_secs(10));

        let evicted = sessions.evict_idle(Duration::from_secs(5));
        assert_eq!(evicted, 1);
        assert_eq!(sessions.state(1), ChatState::Idle);
        assert_eq!(sessions.state(2), ChatState::ManagingTasks);
    }

    #[test]
    fn test_touch_resets_idle_clock() {
        let sessions = SessionManager::new();
        sessions.set_state(1, ChatState::AwaitingTask);
        sessions.backdate(1, Duration::from_secs(10));
        sessions.touch(1);

        assert_eq!(sessions.evict_idle(Duration::from_secs(5)), 0);
        assert_eq!(sessions.state(1), ChatState::AwaitingTask);
    }
}
