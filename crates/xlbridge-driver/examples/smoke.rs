//! Example: drive the COM host directly through the session API.
//!
//! Opens a workbook, writes a named range, recalculates, reads it back,
//! and quits. Useful for checking a WINE + Excel installation before
//! wiring up the full bridge component.
//!
//! Prerequisites:
//!   - WINE installed and in PATH
//!   - Microsoft Excel installed in the WINE prefix
//!   - xlbridge-com-host.exe built:
//!     cargo build --target x86_64-pc-windows-gnu -p xlbridge-com-host --release
//!
//! Run:
//!   cargo run --example smoke -p xlbridge-driver -- path/to/model.xlsx

use std::path::Path;

use xlbridge_driver::{kill_pid, ExcelSession, SessionConfig};
use xlbridge_protocol::{CalcMode, CellValue};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let file_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "model.xlsx".to_string());

    println!("Starting Excel COM host...");
    let session = ExcelSession::launch(SessionConfig::default())?;
    println!(
        "Host PID {}, Excel PID {}",
        session.pid(),
        session.excel_pid()
    );

    let book = session.open_workbook(Path::new(&file_path))?;

    session.set_calculation(CalcMode::Manual)?;
    book.write_range("a", vec![vec![CellValue::Number(42.0)]])?;
    session.set_calculation(CalcMode::Automatic)?;
    session.recalculate()?;

    let values = book.read_range("a")?;
    println!("a = {}", values[0][0]);

    book.close()?;

    // Graceful quit, then the unconditional kill that teardown always does.
    let (excel_pid, host_pid) = (session.excel_pid(), session.pid());
    session.quit()?;
    kill_pid(excel_pid);
    kill_pid(host_pid);
    Ok(())
}
