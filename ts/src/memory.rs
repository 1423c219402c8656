//! In-memory task store
//!
//! Same contract as the SQLite store, backed by a hash map. Used by unit
//! and integration tests that do not want a database file.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::task::{Task, TaskStatus};
use crate::TaskStore;

/// Hash-map implementation of [`TaskStore`]
#[derive(Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks currently held (any status)
    pub fn len(&self) -> usize {
        self.tasks.read().expect("store lock poisoned").len()
    }

    /// True when no tasks are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskStore for MemoryStore {
    fn create(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().expect("store lock poisoned");
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().expect("store lock poisoned");
        Ok(tasks.get(id).cloned())
    }

    fn update_status(&self, id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().expect("store lock poisoned");
        let task = tasks.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.set_status(status);
        Ok(())
    }

    fn reschedule(&self, id: &str, due_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().expect("store lock poisoned");
        let task = tasks.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.due_at = due_at;
        task.set_status(TaskStatus::Active);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().expect("store lock poisoned");
        Ok(tasks.remove(id).is_some())
    }

    fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().expect("store lock poisoned");
        let mut due: Vec<Task> = tasks
            .values()
            .filter(|t| t.status.is_reminder_eligible() && t.due_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.due_at);
        Ok(due)
    }

    fn list_open(&self, chat_id: i64) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().expect("store lock poisoned");
        let mut open: Vec<Task> = tasks
            .values()
            .filter(|t| t.chat_id == chat_id && !t.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by_key(|t| t.due_at);
        Ok(open)
    }
}
