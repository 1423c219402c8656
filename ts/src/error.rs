//! Store error types

use thiserror::Error;

/// Errors from task store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}
