//! In-process fake of the spreadsheet application, scripted per test.
//!
//! The fake mimics the observable behavior of the real session: operations
//! fail once the "process" has been killed, a sleeping macro blocks until
//! killed or its duration elapses, and recalculation applies configured
//! source-to-destination formulas.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use xlbridge::{wrapper_name, AppLauncher, BookHandle, BridgeError, KillHandle, Result, SheetApp};
use xlbridge_protocol::{CalcMode, CellValue, MacroErrorRaw};

/// Scripted behavior for one user macro.
#[derive(Clone)]
pub enum MacroScript {
    Ok,
    Fail { code: i64, description: String },
    AppendMarker(&'static str),
    /// Block for this long (interruptible by a kill).
    SleepMs(u64),
    /// Block only in the first launched application; later launches succeed
    /// immediately. Used to exercise recovery after a timeout.
    SleepOnceMs(u64),
}

/// Everything a test wants to observe about one application invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Open(PathBuf),
    AddModule(String),
    Calc(CalcMode),
    Recalc,
    Write(String),
    Read(String),
    RunMacro(String),
    Close,
    Quit,
}

pub struct FakeState {
    launch_no: u32,
    pid: u32,
    quit_fails: bool,
    scripts: HashMap<String, MacroScript>,
    /// wrapper identity -> user macro name
    wrappers: HashMap<String, String>,
    /// (src, dst) pairs applied on every recalculation, emulating formulas.
    formulas: Vec<(String, String)>,
    pub ranges: Mutex<HashMap<String, Vec<Vec<CellValue>>>>,
    pub modules: Mutex<Vec<(String, String)>>,
    pub markers: Mutex<Vec<String>>,
    pub events: Mutex<Vec<Event>>,
    killed: Mutex<bool>,
    killed_cv: Condvar,
}

impl FakeState {
    pub fn is_killed(&self) -> bool {
        *self.killed.lock().unwrap()
    }

    fn kill(&self) {
        let mut killed = self.killed.lock().unwrap();
        *killed = true;
        self.killed_cv.notify_all();
    }

    /// Block until killed or `dur` elapses; returns whether a kill landed.
    fn wait_killed_for(&self, dur: Duration) -> bool {
        let killed = self.killed.lock().unwrap();
        let (killed, _timeout) = self
            .killed_cv
            .wait_timeout_while(killed, dur, |killed| !*killed)
            .unwrap();
        *killed
    }

    fn guard(&self) -> Result<()> {
        if self.is_killed() {
            Err(BridgeError::other("connection to application lost"))
        } else {
            Ok(())
        }
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn markers(&self) -> Vec<String> {
        self.markers.lock().unwrap().clone()
    }
}

#[derive(Clone)]
pub struct FakeApp {
    state: Arc<FakeState>,
}

impl FakeApp {
    pub fn state(&self) -> Arc<FakeState> {
        Arc::clone(&self.state)
    }
}

impl SheetApp for FakeApp {
    fn open(&self, path: &Path) -> Result<BookHandle> {
        self.state.guard()?;
        self.state.record(Event::Open(path.to_path_buf()));
        Ok(BookHandle(1))
    }

    fn write_range(
        &self,
        _book: BookHandle,
        range: &str,
        values: Vec<Vec<CellValue>>,
    ) -> Result<()> {
        self.state.guard()?;
        self.state.record(Event::Write(range.to_string()));
        self.state
            .ranges
            .lock()
            .unwrap()
            .insert(range.to_string(), values);
        Ok(())
    }

    fn read_range(&self, _book: BookHandle, range: &str) -> Result<Vec<Vec<CellValue>>> {
        self.state.guard()?;
        self.state.record(Event::Read(range.to_string()));
        self.state
            .ranges
            .lock()
            .unwrap()
            .get(range)
            .cloned()
            .ok_or_else(|| BridgeError::other(format!("no such range: {range}")))
    }

    fn add_macro_module(&self, _book: BookHandle, name: &str, code: &str) -> Result<()> {
        self.state.guard()?;
        self.state.record(Event::AddModule(name.to_string()));
        self.state
            .modules
            .lock()
            .unwrap()
            .push((name.to_string(), code.to_string()));
        Ok(())
    }

    fn run_macro(&self, _book: BookHandle, name: &str) -> Result<MacroErrorRaw> {
        self.state.guard()?;

        let user_macro = self
            .state
            .wrappers
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::other(format!("cannot run the macro '{name}'")))?;

        // A wrapper can only run if its module was actually installed.
        let installed = self
            .state
            .modules
            .lock()
            .unwrap()
            .iter()
            .any(|(_, code)| code.contains(name));
        if !installed {
            return Err(BridgeError::other(format!(
                "cannot run the macro '{name}': wrapper not installed"
            )));
        }

        self.state.record(Event::RunMacro(user_macro.clone()));

        let script = self
            .state
            .scripts
            .get(&user_macro)
            .cloned()
            .unwrap_or(MacroScript::Ok);
        match script {
            MacroScript::Ok => Ok(MacroErrorRaw::success()),
            MacroScript::Fail { code, description } => Ok(MacroErrorRaw {
                code,
                source: "VBAProject".to_string(),
                description,
                help_file: String::new(),
                help_context: String::new(),
                last_dll_error: 0,
            }),
            MacroScript::AppendMarker(marker) => {
                self.state.markers.lock().unwrap().push(marker.to_string());
                Ok(MacroErrorRaw::success())
            }
            MacroScript::SleepMs(ms) => {
                if self.state.wait_killed_for(Duration::from_millis(ms)) {
                    Err(BridgeError::other("connection to application lost"))
                } else {
                    Ok(MacroErrorRaw::success())
                }
            }
            MacroScript::SleepOnceMs(ms) => {
                if self.state.launch_no > 1 {
                    return Ok(MacroErrorRaw::success());
                }
                if self.state.wait_killed_for(Duration::from_millis(ms)) {
                    Err(BridgeError::other("connection to application lost"))
                } else {
                    Ok(MacroErrorRaw::success())
                }
            }
        }
    }

    fn close(&self, _book: BookHandle) -> Result<()> {
        self.state.guard()?;
        self.state.record(Event::Close);
        Ok(())
    }

    fn set_calculation(&self, mode: CalcMode) -> Result<()> {
        self.state.guard()?;
        self.state.record(Event::Calc(mode));
        Ok(())
    }

    fn recalculate(&self) -> Result<()> {
        self.state.guard()?;
        self.state.record(Event::Recalc);
        let mut ranges = self.state.ranges.lock().unwrap();
        for (src, dst) in &self.state.formulas {
            if let Some(grid) = ranges.get(src).cloned() {
                ranges.insert(dst.clone(), grid);
            }
        }
        Ok(())
    }

    fn quit(&self) -> Result<()> {
        self.state.guard()?;
        self.state.record(Event::Quit);
        if self.state.quit_fails {
            Err(BridgeError::other("application is unresponsive"))
        } else {
            Ok(())
        }
    }

    fn pid(&self) -> u32 {
        self.state.pid
    }

    fn kill_handle(&self) -> KillHandle {
        let state = Arc::clone(&self.state);
        KillHandle::new(move || state.kill())
    }
}

/// Builds a fresh fake application per launch, sharing counters with the
/// test through `Arc`s so the launcher can be cloned into the component.
#[derive(Clone)]
pub struct FakeLauncher {
    pub scripts: HashMap<String, MacroScript>,
    pub initial_ranges: HashMap<String, Vec<Vec<CellValue>>>,
    pub formulas: Vec<(String, String)>,
    pub quit_fails: bool,
    pub launches: Arc<AtomicU32>,
    last_state: Arc<Mutex<Option<Arc<FakeState>>>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            initial_ranges: HashMap::new(),
            formulas: Vec::new(),
            quit_fails: false,
            launches: Arc::new(AtomicU32::new(0)),
            last_state: Arc::new(Mutex::new(None)),
        }
    }

    /// Wire a scalar range with an initial empty value.
    pub fn with_range(mut self, range: &str) -> Self {
        self.initial_ranges
            .insert(range.to_string(), vec![vec![CellValue::Null]]);
        self
    }

    /// Emulate `dst = src` recalculation semantics.
    pub fn with_formula(mut self, src: &str, dst: &str) -> Self {
        self.formulas.push((src.to_string(), dst.to_string()));
        self
    }

    pub fn with_script(mut self, name: &str, script: MacroScript) -> Self {
        self.scripts.insert(name.to_string(), script);
        self
    }

    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    /// State of the most recently launched application.
    pub fn state(&self) -> Arc<FakeState> {
        self.last_state
            .lock()
            .unwrap()
            .clone()
            .expect("no application launched yet")
    }
}

impl AppLauncher for FakeLauncher {
    type App = FakeApp;

    fn launch(&self) -> Result<FakeApp> {
        let launch_no = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        let wrappers = self
            .scripts
            .keys()
            .map(|name| (wrapper_name(name), name.clone()))
            .collect();

        let state = Arc::new(FakeState {
            launch_no,
            pid: 4000 + launch_no,
            quit_fails: self.quit_fails,
            scripts: self.scripts.clone(),
            wrappers,
            formulas: self.formulas.clone(),
            ranges: Mutex::new(self.initial_ranges.clone()),
            modules: Mutex::new(Vec::new()),
            markers: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            killed: Mutex::new(false),
            killed_cv: Condvar::new(),
        });
        *self.last_state.lock().unwrap() = Some(Arc::clone(&state));
        Ok(FakeApp { state })
    }
}
