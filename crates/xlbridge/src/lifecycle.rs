//! Application process lifecycle: lazy start, reuse, kill, restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::host::{AppLauncher, SheetApp};

/// Thread-safe handle for forcefully terminating the application process,
/// typically fired from the watchdog's timer thread.
///
/// The handle carries only the termination action, never the session's IPC
/// state, so it is safe to fire while the owning thread is still blocked on
/// an application call. It fires at most once; clones share the latch.
#[derive(Clone)]
pub struct KillHandle {
    kill: Arc<dyn Fn() + Send + Sync>,
    fired: Arc<AtomicBool>,
}

impl KillHandle {
    pub fn new(kill: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            kill: Arc::new(kill),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Terminate the application. Subsequent calls on this handle or any
    /// clone of it are no-ops.
    pub fn kill(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        (self.kill)();
    }

    /// Whether this handle has already fired.
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Owns at most one live application session and its process identifier.
///
/// A kill always clears the tracked PID before any subsequent start can
/// issue a new one, so a stale PID can never be killed twice.
pub struct AppManager<L: AppLauncher> {
    launcher: L,
    app: Option<L::App>,
    pid: Option<u32>,
}

impl<L: AppLauncher> AppManager<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            app: None,
            pid: None,
        }
    }

    /// Start the application if no live session is tracked. Idempotent.
    pub fn ensure_started(&mut self) -> Result<()> {
        if self.app.is_some() {
            return Ok(());
        }
        tracing::debug!("Starting Excel...");
        let app = self.launcher.launch()?;
        self.pid = Some(app.pid());
        tracing::info!("Excel started, PID {}.", app.pid());
        self.app = Some(app);
        Ok(())
    }

    /// The live session, if any.
    pub fn app(&self) -> Option<&L::App> {
        self.app.as_ref()
    }

    /// The tracked process identifier, if a session is live.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.app.is_some()
    }

    /// A kill handle for the live session.
    pub fn kill_handle(&self) -> Option<KillHandle> {
        self.app.as_ref().map(|app| app.kill_handle())
    }

    /// Forcefully terminate the tracked session and clear the PID.
    /// Tolerates the process already being gone.
    pub fn kill(&mut self) {
        if let Some(app) = self.app.take() {
            app.kill_handle().kill();
        }
        self.pid = None;
    }

    /// Drop a session whose process was already killed out-of-band (by the
    /// watchdog's timer thread) and clear the PID, so the next
    /// `ensure_started` transparently launches a fresh process.
    pub fn mark_killed(&mut self) {
        self.app = None;
        self.pid = None;
    }

    /// Ask the application to exit cleanly. Any error is swallowed: a
    /// graceful quit attempt must never prevent the forceful kill that
    /// follows it during teardown.
    pub fn quit_gracefully(&self) {
        if let Some(app) = &self.app {
            if let Err(e) = app.quit() {
                tracing::debug!("Graceful quit failed (ignored): {e}");
            }
        }
    }
}
