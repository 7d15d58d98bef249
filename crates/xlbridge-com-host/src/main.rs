//! xlbridge COM host: the Windows side of the bridge.
//!
//! Runs under WINE, reads one JSON `Request` per stdin line, applies it to a
//! lazily created `Excel.Application`, and answers with one JSON `Response`
//! per stdout line. Diagnostics go to stderr only, so the protocol stream
//! stays clean.

#[cfg(windows)]
mod dispatch;
#[cfg(windows)]
mod excel;

#[cfg(windows)]
use xlbridge_protocol::{Command, Request, Response, ResponseData, ResponseResult};

fn log(message: &str) {
    eprintln!("[xlbridge-com-host] {message}");
}

#[cfg(not(windows))]
fn main() {
    log("this binary targets Windows and runs under WINE on Linux");
    log("cross-compile with: cargo build --target x86_64-pc-windows-gnu -p xlbridge-com-host");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    log("starting");
    serve();
    log("exiting");
}

/// Read requests until the client quits or hangs up.
#[cfg(windows)]
fn serve() {
    use std::io::{self, BufRead};

    let mut host = Host::default();
    let stdout = io::stdout();
    let mut replies = stdout.lock();

    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log(&format!("stdin failed: {e}"));
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                // A request that does not parse has no usable id; answer
                // under id 0 so the client at least sees the message.
                log(&format!("malformed request: {e}"));
                let message = format!("malformed request: {e}");
                reply(&mut replies, 0, ResponseResult::Error { message });
                continue;
            }
        };

        let quitting = matches!(request.command, Command::Quit);
        let result = match host.execute(&request.command) {
            Ok(data) => ResponseResult::Ok { data },
            Err(message) => ResponseResult::Error { message },
        };
        let succeeded = matches!(result, ResponseResult::Ok { .. });
        reply(&mut replies, request.id, result);

        if quitting && succeeded {
            log("quit acknowledged");
            return;
        }
    }

    // The client hung up with Excel possibly still running; tear it down
    // rather than leaving an orphaned instance behind the closed pipe.
    log("stdin closed, shutting down Excel");
    if let Err(e) = host.shutdown() {
        log(&format!("shutdown failed: {e}"));
    }
}

/// Serialize one response onto stdout.
#[cfg(windows)]
fn reply(out: &mut impl std::io::Write, id: u64, result: ResponseResult) {
    match serde_json::to_string(&Response { id, result }) {
        Ok(json) => {
            let _ = writeln!(out, "{json}");
            let _ = out.flush();
        }
        Err(e) => log(&format!("response serialization failed: {e}")),
    }
}

/// Command executor owning the (lazily created) Excel instance.
#[cfg(windows)]
#[derive(Default)]
struct Host {
    excel: Option<excel::ExcelApp>,
}

#[cfg(windows)]
impl Host {
    fn app(&mut self) -> Result<&mut excel::ExcelApp, String> {
        self.excel
            .as_mut()
            .ok_or_else(|| "no Excel instance; send Init first".to_string())
    }

    fn execute(&mut self, command: &Command) -> Result<Option<ResponseData>, String> {
        match command {
            Command::Init => {
                let excel_pid = self.init()?;
                Ok(Some(ResponseData::AppInfo { excel_pid }))
            }
            Command::OpenWorkbook { path } => {
                let workbook = self.app()?.open_workbook(path)?;
                Ok(Some(ResponseData::WorkbookHandle { workbook }))
            }
            Command::SetRangeValues {
                workbook,
                range,
                values,
            } => {
                self.app()?.set_range_values(*workbook, range, values)?;
                Ok(None)
            }
            Command::GetRangeValues { workbook, range } => {
                let values = self.app()?.get_range_values(*workbook, range)?;
                Ok(Some(ResponseData::Values { values }))
            }
            Command::SetCalculation { mode } => {
                self.app()?.set_calculation(*mode)?;
                Ok(None)
            }
            Command::Recalculate => {
                self.app()?.recalculate()?;
                Ok(None)
            }
            Command::AddMacroModule {
                workbook,
                name,
                code,
            } => {
                self.app()?.add_macro_module(*workbook, name, code)?;
                Ok(None)
            }
            Command::RunMacro { workbook, name } => {
                let error = self.app()?.run_macro(*workbook, name)?;
                Ok(Some(ResponseData::MacroOutcome { error }))
            }
            Command::CloseWorkbook { workbook } => {
                self.app()?.close_workbook(*workbook)?;
                Ok(None)
            }
            Command::Quit => {
                self.shutdown()?;
                Ok(None)
            }
        }
    }

    /// Bring up COM and Excel on first use; a repeated Init just re-reports
    /// Excel's PID.
    fn init(&mut self) -> Result<u32, String> {
        if self.excel.is_none() {
            initialize_com()?;
            log("COM initialized (single-threaded apartment)");
            let app = excel::ExcelApp::new()?;
            log("Excel.Application ready");
            self.excel = Some(app);
        }
        self.app()?.pid()
    }

    /// Close every workbook, quit Excel and release COM. A no-op when Excel
    /// was never started.
    fn shutdown(&mut self) -> Result<(), String> {
        if let Some(app) = self.excel.take() {
            app.shutdown()?;
            uninitialize_com();
        }
        Ok(())
    }
}

#[cfg(windows)]
fn initialize_com() -> Result<(), String> {
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    // Excel requires a single-threaded apartment.
    let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
    hr.ok().map_err(|e| format!("CoInitializeEx failed: {e}"))
}

#[cfg(windows)]
fn uninitialize_com() {
    unsafe { windows::Win32::System::Com::CoUninitialize() };
}
