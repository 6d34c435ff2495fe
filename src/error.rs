//! Error types for chargeq
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in chargeq
#[derive(Debug, Error)]
pub enum StationError {
    /// Rejected input: bad amount, unknown user, duplicate active request
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operation not allowed in the current state
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Holding area has no room for another request
    #[error("Waiting area is full ({0} requests waiting)")]
    WaitingAreaFull(usize),

    /// Record not found in storage
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bill generation failed
    #[error("Billing error: {0}")]
    Billing(String),

    /// Notification delivery failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StationError {
    /// True for rejections caused by the caller's input or the request's state,
    /// as opposed to infrastructure faults.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StationError::Validation(_)
                | StationError::Precondition(_)
                | StationError::WaitingAreaFull(_)
                | StationError::NotFound(_)
        )
    }
}

/// Result type alias for chargeq operations
pub type Result<T> = std::result::Result<T, StationError>;
