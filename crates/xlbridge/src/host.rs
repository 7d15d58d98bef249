//! The spreadsheet application capability set, as a trait.
//!
//! The bridge component drives the application through this seam only. The
//! production implementation is [`ExcelSession`] (the WINE COM host client);
//! tests substitute an in-process fake to exercise the full orchestration
//! without Excel.

use std::path::Path;

use xlbridge_driver::{kill_pid, ExcelSession, SessionConfig};
use xlbridge_protocol::{CalcMode, CellValue, MacroErrorRaw};

use crate::error::{BridgeError, Result};
use crate::lifecycle::KillHandle;

/// Opaque identifier for an open workbook within an application session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookHandle(pub u64);

/// One live spreadsheet application process.
///
/// All methods are issued from the single thread driving the bridge, except
/// the handle returned by [`SheetApp::kill_handle`], which must be safe to
/// fire from any thread while another call is still blocked.
pub trait SheetApp {
    /// Open an existing workbook from a native path.
    fn open(&self, path: &Path) -> Result<BookHandle>;

    /// Write a full grid of values to a range in one bulk assignment.
    fn write_range(&self, book: BookHandle, range: &str, values: Vec<Vec<CellValue>>)
        -> Result<()>;

    /// Read the full grid of computed values from a range.
    fn read_range(&self, book: BookHandle, range: &str) -> Result<Vec<Vec<CellValue>>>;

    /// Add a VBA code module to the workbook's macro project.
    fn add_macro_module(&self, book: BookHandle, name: &str, code: &str) -> Result<()>;

    /// Run a macro function by name, returning the captured error tuple.
    fn run_macro(&self, book: BookHandle, name: &str) -> Result<MacroErrorRaw>;

    /// Close the workbook without saving.
    fn close(&self, book: BookHandle) -> Result<()>;

    /// Switch the application-wide calculation mode.
    fn set_calculation(&self, mode: CalcMode) -> Result<()>;

    /// Force a full recalculation.
    fn recalculate(&self) -> Result<()>;

    /// Ask the application to exit cleanly. Callers on teardown paths must
    /// treat any error as non-fatal: a forceful kill always follows.
    fn quit(&self) -> Result<()>;

    /// OS process identifier of the application process.
    fn pid(&self) -> u32;

    /// A thread-safe handle that forcefully terminates the application.
    fn kill_handle(&self) -> KillHandle;
}

/// Launches application sessions on demand. The lifecycle manager calls this
/// lazily on first use and again after a kill.
pub trait AppLauncher {
    type App: SheetApp;

    fn launch(&self) -> Result<Self::App>;
}

impl SheetApp for ExcelSession {
    fn open(&self, path: &Path) -> Result<BookHandle> {
        let book = self.open_workbook(path)?;
        Ok(BookHandle(book.handle()))
    }

    fn write_range(
        &self,
        book: BookHandle,
        range: &str,
        values: Vec<Vec<CellValue>>,
    ) -> Result<()> {
        Ok(self.set_range_values(book.0, range, values)?)
    }

    fn read_range(&self, book: BookHandle, range: &str) -> Result<Vec<Vec<CellValue>>> {
        Ok(self.get_range_values(book.0, range)?)
    }

    fn add_macro_module(&self, book: BookHandle, name: &str, code: &str) -> Result<()> {
        Ok(ExcelSession::add_macro_module(self, book.0, name, code)?)
    }

    fn run_macro(&self, book: BookHandle, name: &str) -> Result<MacroErrorRaw> {
        Ok(ExcelSession::run_macro(self, book.0, name)?)
    }

    fn close(&self, book: BookHandle) -> Result<()> {
        Ok(self.close_workbook(book.0)?)
    }

    fn set_calculation(&self, mode: CalcMode) -> Result<()> {
        Ok(ExcelSession::set_calculation(self, mode)?)
    }

    fn recalculate(&self) -> Result<()> {
        Ok(ExcelSession::recalculate(self)?)
    }

    fn quit(&self) -> Result<()> {
        Ok(ExcelSession::quit(self)?)
    }

    fn pid(&self) -> u32 {
        ExcelSession::pid(self)
    }

    fn kill_handle(&self) -> KillHandle {
        // Excel runs as a COM local server outside the host exe, so both
        // processes must go.
        let pids = [self.excel_pid(), ExcelSession::pid(self)];
        KillHandle::new(move || {
            for pid in pids {
                tracing::info!("Killing PID {pid}.");
                kill_pid(pid);
            }
        })
    }
}

/// Launcher for real Excel sessions via the WINE COM host.
#[derive(Clone, Default)]
pub struct ExcelLauncher {
    config: SessionConfig,
}

impl ExcelLauncher {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

impl AppLauncher for ExcelLauncher {
    type App = ExcelSession;

    fn launch(&self) -> Result<ExcelSession> {
        ExcelSession::launch(self.config.clone()).map_err(|e| BridgeError::Startup(Box::new(e)))
    }
}
