//! Error types for the state store

use thiserror::Error;

/// Errors that can occur while reading or writing the store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt recovery log at {path}: {reason}")]
    CorruptLog { path: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
