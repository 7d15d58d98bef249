//! Workbook handle — ergonomic API for one open workbook in the session.

use xlbridge_protocol::{CellValue, MacroErrorRaw};

use crate::error::Result;
use crate::session::ExcelSession;

/// A handle to an open workbook in the Excel COM host.
///
/// Operations are forwarded to the host process. Ranges are addressed by
/// workbook-level named ranges or A1-style references.
pub struct Workbook<'a> {
    session: &'a ExcelSession,
    handle: u64,
}

impl<'a> Workbook<'a> {
    pub(crate) fn new(session: &'a ExcelSession, handle: u64) -> Self {
        Self { session, handle }
    }

    /// Get the internal handle ID.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Write a full grid of values to a range in one bulk assignment.
    pub fn write_range(&self, range: &str, values: Vec<Vec<CellValue>>) -> Result<()> {
        self.session.set_range_values(self.handle, range, values)
    }

    /// Read the full grid of computed values from a range.
    pub fn read_range(&self, range: &str) -> Result<Vec<Vec<CellValue>>> {
        self.session.get_range_values(self.handle, range)
    }

    /// Add a VBA code module to the workbook's macro project.
    pub fn add_macro_module(&self, name: &str, code: &str) -> Result<()> {
        self.session.add_macro_module(self.handle, name, code)
    }

    /// Run a macro function and return the captured error tuple.
    pub fn run_macro(&self, name: &str) -> Result<MacroErrorRaw> {
        self.session.run_macro(self.handle, name)
    }

    /// Close the workbook without saving.
    pub fn close(self) -> Result<()> {
        self.session.close_workbook(self.handle)
    }
}
