//! Error types for the replication library.

use std::time::Duration;

use thiserror::Error;

/// Main error type for replication operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (missing variables, bad cron expression, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query error from either endpoint
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Information catalog could not be read
    #[error("Catalog probe failed: {0}")]
    Catalog(String),

    /// Schema reconciliation failed for a specific table
    #[error("Schema sync failed for table {table}: {message}")]
    Schema { table: String, message: String },

    /// Row replication failed for a specific table
    #[error("Replication failed for table {table}: {message}")]
    Replicate { table: String, message: String },

    /// A statement exceeded its wall-clock deadline
    #[error("{operation} timed out after {limit:?}")]
    Timeout { operation: String, limit: Duration },

    /// StartSync was called while the engine is running
    #[error("sync already running")]
    AlreadyRunning,

    /// StopSync was called while the engine is stopped
    #[error("sync is not running")]
    NotRunning,
}

impl SyncError {
    /// Create a Catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        SyncError::Catalog(message.into())
    }

    /// Create a Schema error for a table.
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Replicate error for a table.
    pub fn replicate(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Replicate {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Timeout error.
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        SyncError::Timeout {
            operation: operation.into(),
            limit,
        }
    }
}

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, SyncError>;
