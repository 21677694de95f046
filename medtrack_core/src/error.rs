//! Error types for the medtrack_core library.

use crate::types::DoseStatus;
use std::io;
use uuid::Uuid;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for medtrack_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed recurrence parameters or schedule dates, rejected at construction
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lifecycle transition attempted from a terminal or mismatched state.
    ///
    /// Carries the dose's current status so the caller can decide whether
    /// to offer `force_mark_taken` instead of retrying blindly.
    #[error("Invalid transition: dose {dose_id} is {current}")]
    InvalidTransition { dose_id: Uuid, current: DoseStatus },

    /// Transient persistence failure (lock contention past the timeout).
    ///
    /// Safe to retry with backoff for reads and generation; `mark_taken`
    /// must re-read current status before retrying.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}
