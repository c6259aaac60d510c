//! Error types for logpilot-db.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for logpilot-db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in logpilot-db operations.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // SQL store errors
    // ========================================================================
    /// Failed to open a database file.
    #[error("Failed to open database at {path}: {message}")]
    Open { path: PathBuf, message: String },

    /// A statement failed to prepare or execute.
    #[error("{message}")]
    Query { message: String },

    /// The database stayed locked after all retry attempts.
    #[error("Database at {path} is locked (gave up after {attempts} attempts)")]
    Locked { path: PathBuf, attempts: u32 },

    /// A table referenced by name does not exist.
    #[error("Table `{0}` not found")]
    TableNotFound(String),

    /// A conversation role outside `user`/`assistant`.
    #[error("Invalid message role `{0}` (expected `user` or `assistant`)")]
    InvalidRole(String),

    // ========================================================================
    // Knowledge store errors
    // ========================================================================
    /// Knowledge store I/O error.
    #[error("Knowledge store I/O error at {path}: {message}")]
    KnowledgeIo { path: PathBuf, message: String },

    /// Vector dimension mismatch.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // ========================================================================
    // General errors
    // ========================================================================
    /// IO error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an open error.
    pub fn open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Open {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create a knowledge store I/O error.
    pub fn knowledge_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::KnowledgeIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Query {
            message: err.to_string(),
        }
    }
}
