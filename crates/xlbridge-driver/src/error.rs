//! Error types for the COM host client.

use thiserror::Error;

/// Result type alias using [`DriverError`].
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors from the Excel COM host client.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("could not spawn the COM host process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("the COM host process is gone")]
    NotRunning,

    #[error("writing to the COM host failed: {0}")]
    SendFailed(String),

    #[error("reading from the COM host failed: {0}")]
    ReadFailed(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("COM host reported: {0}")]
    Host(String),

    #[error("the COM host sent an unexpected response payload")]
    UnexpectedResponse,

    #[error("no usable WINE installation ('wine' not found in PATH)")]
    WineNotFound,

    #[error("COM host executable missing at {0}")]
    HostExeNotFound(String),
}
