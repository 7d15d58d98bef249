//! Shared protocol types for communication between the native client and the
//! Windows COM host process running under WINE.
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.

use serde::{Deserialize, Serialize};

/// A command sent from the native client to the COM host process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM and create the Excel.Application instance in a
    /// non-interactive configuration (not visible, alerts and screen
    /// updating suppressed). Returns the application's process ID.
    Init,

    /// Open an existing workbook from a file path (Windows path).
    /// AutoRecover is disabled on the opened workbook.
    OpenWorkbook { path: String },

    /// Write a full grid of values to a named range or A1-style address
    /// in one bulk assignment.
    SetRangeValues {
        workbook: u64,
        range: String,
        values: Vec<Vec<CellValue>>,
    },

    /// Read the full grid of computed values from a named range or
    /// A1-style address.
    GetRangeValues { workbook: u64, range: String },

    /// Switch the application-wide calculation mode.
    SetCalculation { mode: CalcMode },

    /// Force a full recalculation of all open workbooks.
    Recalculate,

    /// Add a VBA code module with the given name and source to the
    /// workbook's macro project.
    AddMacroModule {
        workbook: u64,
        name: String,
        code: String,
    },

    /// Run a macro function by name via Application.Run. The function is
    /// expected to return the six-element error array produced by the
    /// generated wrapper macros.
    RunMacro { workbook: u64, name: String },

    /// Close a workbook without saving.
    CloseWorkbook { workbook: u64 },

    /// Quit Excel, uninitialize COM, and exit the host process.
    Quit,
}

/// Application-wide calculation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalcMode {
    Manual,
    Automatic,
}

/// A cell value that can be sent to/from Excel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Error(CellError),
}

/// An Excel error value (e.g. #DIV/0!) read back from a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellError {
    pub code: String,
}

/// The six fields of VBA's `Err` object, captured positionally by a wrapper
/// macro immediately after invoking the wrapped user macro.
///
/// `code == 0` denotes success; on failure only `code`, `source` and
/// `description` are guaranteed meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroErrorRaw {
    pub code: i64,
    pub source: String,
    pub description: String,
    pub help_file: String,
    pub help_context: String,
    pub last_dll_error: i64,
}

/// A response sent from the COM host back to the native client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Data returned in successful responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Application info returned by Init.
    AppInfo { excel_pid: u32 },
    /// Handle to a newly opened workbook.
    WorkbookHandle { workbook: u64 },
    /// A grid of cell values.
    Values { values: Vec<Vec<CellValue>> },
    /// The captured error state after running a wrapper macro.
    MacroOutcome { error: MacroErrorRaw },
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => write!(f, "<empty>"),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Error(e) => write!(f, "{}", e.code),
        }
    }
}

impl MacroErrorRaw {
    /// A zeroed error tuple, as the wrapper returns after a clean run.
    pub fn success() -> Self {
        Self {
            code: 0,
            source: String::new(),
            description: String::new(),
            help_file: String::new(),
            help_context: String::new(),
            last_dll_error: 0,
        }
    }
}
