//! Native Linux client library for the xlbridge Excel COM host.
//!
//! This crate spawns a Windows `.exe` under WINE that automates Excel through
//! COM, communicating over JSON-over-stdio. It owns the host process handle
//! and exposes the capability set the bridge component builds on: open a
//! workbook, bulk-read/write named ranges, inject VBA modules, run macros,
//! switch calculation mode, recalculate, quit — and forcefully kill the
//! process when nothing else works.
//!
//! # Architecture
//!
//! ```text
//! Bridge component (native Linux)
//!     └── ExcelSession (this crate)
//!           └── spawns: wine xlbridge-com-host.exe
//!                 └── COM: Excel.Application
//! ```

mod error;
mod process;
mod session;
mod workbook;

pub use error::{DriverError, Result};
pub use process::kill_pid;
pub use session::{wine_path, ExcelSession, SessionConfig};
pub use workbook::Workbook;
