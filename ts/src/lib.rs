//! TaskStore - task persistence for nudgebot
//!
//! A small storage crate with one job: keep reminder tasks and answer the
//! scheduler's "what is due right now?" question. Two implementations of
//! the [`TaskStore`] trait are provided:
//!
//! - [`SqliteStore`] - the real store, a single SQLite file
//! - [`MemoryStore`] - hash-map store for tests
//!
//! # Contract
//!
//! `find_due(now)` returns only reminder-eligible tasks (status `active` or
//! `reminded`) whose due time has passed. Once a task's status is updated
//! past those states, subsequent `find_due` calls exclude it - this is the
//! scheduler's sole deduplication mechanism, so implementations must honor
//! it exactly.

mod error;
mod memory;
mod sqlite;
mod task;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use task::{Task, TaskStatus};

use chrono::{DateTime, Utc};

/// Storage contract consumed by the scheduler and the orchestrating services
///
/// Implementations are synchronous; callers in async contexts rely on the
/// operations being short (single-row statements against a local database).
pub trait TaskStore: Send + Sync {
    /// Insert a new task
    fn create(&self, task: &Task) -> Result<(), StoreError>;

    /// Fetch a task by ID
    fn get(&self, id: &str) -> Result<Option<Task>, StoreError>;

    /// Set a task's status; `NotFound` if the ID does not exist
    fn update_status(&self, id: &str, status: TaskStatus) -> Result<(), StoreError>;

    /// Move a task's due time and reset it to `active` (snooze)
    fn reschedule(&self, id: &str, due_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Remove a task; returns whether anything was deleted
    fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Reminder-eligible tasks whose due time has passed, soonest first
    fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError>;

    /// Non-terminal tasks for one chat, soonest first
    fn list_open(&self, chat_id: i64) -> Result<Vec<Task>, StoreError>;
}
