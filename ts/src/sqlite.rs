//! SQLite-backed task store

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, Row, params};
use tracing::debug;

use crate::error::StoreError;
use crate::task::{Task, TaskStatus};
use crate::TaskStore;

/// SQLite-backed implementation of [`TaskStore`]
///
/// Timestamps are stored as unix milliseconds so `find_due` can compare
/// them in SQL. The connection is wrapped in a mutex; statements are short
/// enough that contention is not a concern for a single-process bot.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        debug!(path = %path.display(), "opened task store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory store (tests, throwaway runs)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id          TEXT PRIMARY KEY,
                chat_id     INTEGER NOT NULL,
                user_id     INTEGER NOT NULL,
                description TEXT NOT NULL,
                due_at      INTEGER NOT NULL,
                status      TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_status_due ON tasks (status, due_at);
            CREATE INDEX IF NOT EXISTS idx_tasks_chat ON tasks (chat_id);",
        )
    }

    fn row_to_task(row: &Row<'_>) -> Result<Task, StoreError> {
        let status_text: String = row.get("status")?;
        let status: TaskStatus = status_text.parse().map_err(StoreError::Corrupt)?;

        Ok(Task {
            id: row.get("id")?,
            chat_id: row.get("chat_id")?,
            user_id: row.get("user_id")?,
            description: row.get("description")?,
            due_at: millis_to_utc(row.get("due_at")?)?,
            status,
            created_at: millis_to_utc(row.get("created_at")?)?,
            updated_at: millis_to_utc(row.get("updated_at")?)?,
        })
    }
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

impl TaskStore for SqliteStore {
    fn create(&self, task: &Task) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO tasks (id, chat_id, user_id, description, due_at, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.id,
                task.chat_id,
                task.user_id,
                task.description,
                task.due_at.timestamp_millis(),
                task.status.to_string(),
                task.created_at.timestamp_millis(),
                task.updated_at.timestamp_millis(),
            ],
        )?;
        debug!(task_id = %task.id, chat_id = task.chat_id, "created task");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_task(row)?)),
            None => Ok(None),
        }
    }

    fn update_status(&self, id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.to_string(), Utc::now().timestamp_millis(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        debug!(task_id = %id, %status, "updated task status");
        Ok(())
    }

    fn reschedule(&self, id: &str, due_at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute(
            "UPDATE tasks SET due_at = ?1, status = 'active', updated_at = ?2 WHERE id = ?3",
            params![due_at.timestamp_millis(), Utc::now().timestamp_millis(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        debug!(task_id = %id, %due_at, "rescheduled task");
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks
             WHERE status IN ('active', 'reminded') AND due_at <= ?1
             ORDER BY due_at",
        )?;
        let mut rows = stmt.query(params![now.timestamp_millis()])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(Self::row_to_task(row)?);
        }
        Ok(tasks)
    }

    fn list_open(&self, chat_id: i64) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks
             WHERE chat_id = ?1 AND status NOT IN ('completed', 'cancelled')
             ORDER BY due_at",
        )?;
        let mut rows = stmt.query(params![chat_id])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(Self::row_to_task(row)?);
        }
        Ok(tasks)
    }
}
