//! Wrapped macro execution and structured error decoding.

use xlbridge_protocol::MacroErrorRaw;

use crate::error::{BridgeError, Result};
use crate::host::{BookHandle, SheetApp};
use crate::wrapper::wrapper_name;

/// Pipeline stage a macro runs at. Diagnostic context only; it has no
/// effect on execution semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroStage {
    Pre,
    Main,
    Post,
}

impl MacroStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MacroStage::Pre => "pre",
            MacroStage::Main => "main",
            MacroStage::Post => "post",
        }
    }
}

impl std::fmt::Display for MacroStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `Err` object state captured by a wrapper macro, decoded positionally.
///
/// `code == 0` is success. On failure only `code`, `source` and
/// `description` are guaranteed meaningful; the remaining fields may be
/// empty or arbitrary.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroError {
    pub code: i64,
    pub source: String,
    pub description: String,
    pub help_file: String,
    pub help_context: String,
    pub last_dll_error: i64,
}

impl From<MacroErrorRaw> for MacroError {
    fn from(raw: MacroErrorRaw) -> Self {
        Self {
            code: raw.code,
            source: raw.source,
            description: raw.description,
            help_file: raw.help_file,
            help_context: raw.help_context,
            last_dll_error: raw.last_dll_error,
        }
    }
}

impl std::fmt::Display for MacroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "error {} from {:?}: {:?}",
            self.code, self.source, self.description
        )
    }
}

/// Outcome of one wrapped macro run.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroResult {
    pub error: MacroError,
}

impl MacroResult {
    pub fn success(&self) -> bool {
        self.error.code == 0
    }
}

/// Run the wrapper for `macro_name` and decode its result.
pub fn run_wrapped<A: SheetApp>(
    app: &A,
    book: BookHandle,
    macro_name: &str,
) -> Result<MacroResult> {
    let raw = app.run_macro(book, &wrapper_name(macro_name))?;
    Ok(MacroResult {
        error: MacroError::from(raw),
    })
}

/// Run the wrapper for `macro_name` and fail with a classified error when
/// the captured error code is non-zero.
pub fn run_and_raise<A: SheetApp>(
    app: &A,
    book: BookHandle,
    macro_name: &str,
    stage: MacroStage,
) -> Result<()> {
    tracing::info!("Running macro {macro_name} at {stage} stage...");
    let result = run_wrapped(app, book, macro_name)?;
    tracing::info!(
        "Finished running macro {macro_name} at {stage} stage with code {}.",
        result.error.code
    );

    if result.success() {
        Ok(())
    } else {
        Err(BridgeError::MacroFailed {
            name: macro_name.to_string(),
            stage,
            error: result.error,
        })
    }
}
