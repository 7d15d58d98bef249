//! Error types for the bridge component.

use std::time::Duration;

use thiserror::Error;
use xlbridge_driver::DriverError;

use crate::runner::{MacroError, MacroStage};

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced to the host framework by one `compute` invocation.
///
/// `Startup` is fatal for the invocation. `MacroFailed` and `Timeout` are the
/// recoverable analysis failures; a recorded timeout always suppresses
/// whatever secondary error the killed process produced.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The spreadsheet application process could not be launched.
    #[error("failed to start the spreadsheet application")]
    Startup(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A wrapped macro reported a non-zero error code.
    #[error("Excel macro \"{name}\" executed in \"{stage}\" stage failed: {error}")]
    MacroFailed {
        name: String,
        stage: MacroStage,
        error: MacroError,
    },

    /// The watchdog deadline was reached and the application was killed.
    #[error("timeout reached after {limit:?}")]
    Timeout { limit: Duration },

    /// An output range holds a spreadsheet error value (strict read policy).
    #[error("output \"{name}\" (range {range}) holds spreadsheet error {code}")]
    CellError {
        name: String,
        range: String,
        code: String,
    },

    /// An output range holds text where a number was expected.
    #[error("output \"{name}\" (range {range}) holds non-numeric value \"{value}\"")]
    NonNumeric {
        name: String,
        range: String,
        value: String,
    },

    /// A value's length does not match its variable's declared shape.
    #[error("variable \"{name}\": shape expects {expected} values, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// The caller's input mapping is missing a configured variable.
    #[error("no value provided for input variable \"{name}\"")]
    MissingInput { name: String },

    /// Component configuration rejected before any external work.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An error propagated from the COM host client.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Create a new "other" error with a message.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        BridgeError::Other(msg.into())
    }
}
