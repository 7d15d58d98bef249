//! The Excel session: spawning the COM host under WINE and talking to it.

use std::io::{BufRead, BufReader, Write};
use std::path::{Component, Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::Mutex;

use xlbridge_protocol::{
    CalcMode, CellValue, Command as HostCommand, MacroErrorRaw, Request, Response, ResponseData,
    ResponseResult,
};

use crate::error::{DriverError, Result};
use crate::workbook::Workbook;

const HOST_EXE_NAME: &str = "xlbridge-com-host.exe";

/// Configuration for launching the Excel COM host.
#[derive(Clone)]
pub struct SessionConfig {
    /// Path to the `xlbridge-com-host.exe` Windows executable.
    /// If None, searches in common locations relative to the current binary.
    pub host_exe_path: Option<PathBuf>,

    /// Path to the WINE executable. Defaults to "wine".
    pub wine_path: PathBuf,

    /// Optional WINEPREFIX to use (for isolating the WINE environment).
    pub wine_prefix: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host_exe_path: None,
            wine_path: PathBuf::from("wine"),
            wine_prefix: None,
        }
    }
}

/// The request/reply channel to the host process.
///
/// The protocol allows one outstanding request at a time, so both pipe ends
/// and the id counter live behind a single lock.
struct HostPipe {
    tx: ChildStdin,
    rx: BufReader<ChildStdout>,
    next_id: u64,
}

impl HostPipe {
    /// Serialize and write one request line. Returns the id it was sent
    /// under.
    fn post(&mut self, command: HostCommand) -> Result<u64> {
        self.next_id += 1;
        let id = self.next_id;

        let mut line = serde_json::to_string(&Request { id, command })?;
        line.push('\n');
        self.tx
            .write_all(line.as_bytes())
            .and_then(|()| self.tx.flush())
            .map_err(|e| DriverError::SendFailed(e.to_string()))?;
        Ok(id)
    }

    /// Block until the host answers with one response line.
    fn receive(&mut self) -> Result<Response> {
        let mut line = String::new();
        let bytes = self
            .rx
            .read_line(&mut line)
            .map_err(|e| DriverError::ReadFailed(e.to_string()))?;
        if bytes == 0 {
            return Err(DriverError::NotRunning);
        }
        Ok(serde_json::from_str(&line)?)
    }
}

/// A live Excel automation session.
///
/// Owns the COM host child process and its stdio channels. All commands are
/// issued from the single thread driving the bridge; the only operation safe
/// to perform from another thread is an OS-level [`kill_pid`] on the PIDs
/// this session reports.
///
/// [`kill_pid`]: crate::process::kill_pid
pub struct ExcelSession {
    child: Mutex<Child>,
    pipe: Mutex<HostPipe>,
    host_pid: u32,
    excel_pid: u32,
}

impl ExcelSession {
    /// Launch the host process in a non-interactive configuration and
    /// initialize Excel inside it.
    pub fn launch(config: SessionConfig) -> Result<Self> {
        let exe_path = config.host_exe_path.unwrap_or_else(locate_host_exe);
        if !exe_path.exists() {
            return Err(DriverError::HostExeNotFound(
                exe_path.display().to_string(),
            ));
        }

        let (child, pipe) = spawn_host(
            &config.wine_path,
            config.wine_prefix.as_deref(),
            &exe_path,
        )?;
        let host_pid = child.id();

        let mut session = Self {
            child: Mutex::new(child),
            pipe: Mutex::new(pipe),
            host_pid,
            excel_pid: 0,
        };

        // Excel runs as a COM local server outside the host executable, so
        // the host reports Excel's own PID during initialization.
        session.excel_pid = match session.exchange(HostCommand::Init)? {
            Some(ResponseData::AppInfo { excel_pid }) => excel_pid,
            _ => return Err(DriverError::UnexpectedResponse),
        };

        tracing::info!(
            "Excel started, host PID {host_pid}, Excel PID {}.",
            session.excel_pid
        );
        Ok(session)
    }

    /// Issue one command and decode its reply.
    fn exchange(&self, command: HostCommand) -> Result<Option<ResponseData>> {
        let reply = {
            let mut pipe = self.pipe.lock().unwrap();
            let id = pipe.post(command)?;
            let reply = pipe.receive()?;
            if reply.id != id {
                return Err(DriverError::ReadFailed(format!(
                    "reply id {} does not match request id {id}",
                    reply.id
                )));
            }
            reply
        };

        match reply.result {
            ResponseResult::Ok { data } => Ok(data),
            ResponseResult::Error { message } => Err(DriverError::Host(message)),
        }
    }

    /// OS process identifier of the host process.
    pub fn pid(&self) -> u32 {
        self.host_pid
    }

    /// OS process identifier of the Excel application, as reported by Init.
    pub fn excel_pid(&self) -> u32 {
        self.excel_pid
    }

    /// Open an existing workbook. Accepts a native path, converted to a
    /// WINE path for the host.
    pub fn open_workbook(&self, path: &Path) -> Result<Workbook<'_>> {
        let handle = self.open_workbook_raw(&wine_path(path))?;
        Ok(Workbook::new(self, handle))
    }

    /// Switch the application-wide calculation mode.
    pub fn set_calculation(&self, mode: CalcMode) -> Result<()> {
        self.exchange(HostCommand::SetCalculation { mode })?;
        Ok(())
    }

    /// Force Excel to recalculate all open workbooks.
    pub fn recalculate(&self) -> Result<()> {
        self.exchange(HostCommand::Recalculate)?;
        Ok(())
    }

    /// Ask the host to quit Excel cleanly and exit.
    ///
    /// Fire-and-forget: no response is awaited, because a hung host would
    /// block forever and a forceful kill always follows this call during
    /// teardown anyway.
    pub fn quit(&self) -> Result<()> {
        self.pipe.lock().unwrap().post(HostCommand::Quit)?;
        Ok(())
    }

    // -- Handle-level operations, used by Workbook and the bridge component --

    pub fn open_workbook_raw(&self, wine_path: &str) -> Result<u64> {
        let data = self.exchange(HostCommand::OpenWorkbook {
            path: wine_path.to_string(),
        })?;
        match data {
            Some(ResponseData::WorkbookHandle { workbook }) => Ok(workbook),
            _ => Err(DriverError::UnexpectedResponse),
        }
    }

    pub fn set_range_values(
        &self,
        workbook: u64,
        range: &str,
        values: Vec<Vec<CellValue>>,
    ) -> Result<()> {
        self.exchange(HostCommand::SetRangeValues {
            workbook,
            range: range.to_string(),
            values,
        })?;
        Ok(())
    }

    pub fn get_range_values(&self, workbook: u64, range: &str) -> Result<Vec<Vec<CellValue>>> {
        let data = self.exchange(HostCommand::GetRangeValues {
            workbook,
            range: range.to_string(),
        })?;
        match data {
            Some(ResponseData::Values { values }) => Ok(values),
            _ => Err(DriverError::UnexpectedResponse),
        }
    }

    pub fn add_macro_module(&self, workbook: u64, name: &str, code: &str) -> Result<()> {
        self.exchange(HostCommand::AddMacroModule {
            workbook,
            name: name.to_string(),
            code: code.to_string(),
        })?;
        Ok(())
    }

    pub fn run_macro(&self, workbook: u64, name: &str) -> Result<MacroErrorRaw> {
        let data = self.exchange(HostCommand::RunMacro {
            workbook,
            name: name.to_string(),
        })?;
        match data {
            Some(ResponseData::MacroOutcome { error }) => Ok(error),
            _ => Err(DriverError::UnexpectedResponse),
        }
    }

    pub fn close_workbook(&self, workbook: u64) -> Result<()> {
        self.exchange(HostCommand::CloseWorkbook { workbook })?;
        Ok(())
    }
}

impl Drop for ExcelSession {
    fn drop(&mut self) {
        // Reap the child; kill first in case it is still running.
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Spawn `wine <exe>` with piped stdio and wrap the pipes into a channel.
fn spawn_host(wine: &Path, prefix: Option<&Path>, exe: &Path) -> Result<(Child, HostPipe)> {
    let mut command = std::process::Command::new(wine);
    command
        .arg(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        // stderr passes through so host diagnostics stay visible
        .stderr(Stdio::inherit());
    if let Some(prefix) = prefix {
        command.env("WINEPREFIX", prefix);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DriverError::WineNotFound)
        }
        Err(e) => return Err(DriverError::SpawnFailed(e)),
    };

    let tx = child.stdin.take().expect("piped stdin");
    let rx = BufReader::new(child.stdout.take().expect("piped stdout"));
    Ok((child, HostPipe { tx, rx, next_id: 0 }))
}

/// Address a native path the way Excel sees it inside WINE, which exposes
/// the whole native filesystem as the `Z:` drive:
/// `/home/user/model.xlsm` becomes `Z:\home\user\model.xlsm`.
pub fn wine_path(path: &Path) -> String {
    let absolute;
    let path = if path.is_absolute() {
        path
    } else {
        absolute = std::env::current_dir().unwrap_or_default().join(path);
        &absolute
    };

    let mut converted = String::from("Z:");
    for component in path.components() {
        if let Component::Normal(part) = component {
            converted.push('\\');
            converted.push_str(&part.to_string_lossy());
        }
    }
    converted
}

/// Candidate locations for the host exe: next to the current binary first,
/// then the cross-compilation target directories used during development.
fn locate_host_exe() -> PathBuf {
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(HOST_EXE_NAME));
        }
    }
    for profile in ["release", "debug"] {
        candidates.push(
            Path::new("target/x86_64-pc-windows-gnu")
                .join(profile)
                .join(HOST_EXE_NAME),
        );
    }

    candidates
        .into_iter()
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(HOST_EXE_NAME))
}
