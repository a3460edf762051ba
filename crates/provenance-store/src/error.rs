//! Error types for the store module.

use provenance_core::CoreError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Event or block serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored event line could not be parsed.
    #[error("corrupt entry at line {line}: {reason}")]
    Corrupt { line: u64, reason: String },

    /// Invalid data in storage or passed to it.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Background task failed to complete.
    #[error("storage task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
