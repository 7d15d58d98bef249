//! The bridge component: orchestration, timeout classification, recovery.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::host::{AppLauncher, BookHandle, ExcelLauncher, SheetApp};
use crate::lifecycle::AppManager;
use crate::runner::{run_and_raise, MacroStage};
use crate::vars::VarMap;
use crate::{marshal, watchdog, wrapper};

/// Default wall-clock limit for one `compute` invocation. Large enough that
/// normal invocations never time out.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Configuration for an [`ExcelComponent`], fixed at construction.
#[derive(Clone)]
pub struct ExcelComponentConfig {
    /// Path to the workbook to open on every invocation.
    pub file_path: PathBuf,
    /// Input variables, written before recalculation.
    pub inputs: Vec<VarMap>,
    /// Output variables, read after recalculation.
    pub outputs: Vec<VarMap>,
    /// Macros run before inputs are written.
    pub pre_macros: Vec<String>,
    /// Macros run after recalculation, before outputs are read.
    pub main_macros: Vec<String>,
    /// Macros run after outputs are read.
    pub post_macros: Vec<String>,
    /// Wall-clock limit for one invocation. Must be strictly positive.
    pub timeout: Duration,
}

impl ExcelComponentConfig {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            pre_macros: Vec::new(),
            main_macros: Vec::new(),
            post_macros: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Treats an Excel workbook as one computation step for a host framework:
/// write inputs into named ranges, recalculate (running user macros at
/// pre/main/post stages), read outputs back.
///
/// The host framework calls [`setup`](Self::setup) once,
/// [`compute`](Self::compute) repeatedly and [`cleanup`](Self::cleanup)
/// exactly once at teardown. Every `compute` is bounded by the configured
/// timeout; on expiry the application process is killed and the next
/// invocation transparently starts a fresh one.
pub struct ExcelComponent<L: AppLauncher> {
    config: ExcelComponentConfig,
    manager: AppManager<L>,
}

impl<L: AppLauncher> std::fmt::Debug for ExcelComponent<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExcelComponent").finish_non_exhaustive()
    }
}

impl ExcelComponent<ExcelLauncher> {
    /// Component backed by real Excel sessions via the WINE COM host.
    pub fn new(config: ExcelComponentConfig) -> Result<Self> {
        Self::with_launcher(config, ExcelLauncher::default())
    }
}

impl<L: AppLauncher> ExcelComponent<L> {
    pub fn with_launcher(config: ExcelComponentConfig, launcher: L) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(BridgeError::Config(
                "timeout must be strictly positive".to_string(),
            ));
        }
        Ok(Self {
            config,
            manager: AppManager::new(launcher),
        })
    }

    /// Start the application eagerly so that the first `compute` does not
    /// pay the launch cost. Idempotent.
    pub fn setup(&mut self) -> Result<()> {
        self.manager.ensure_started()
    }

    /// Run one bounded invocation: inputs in, recalculate, outputs out.
    ///
    /// Fails with [`BridgeError::Timeout`] when the deadline is reached —
    /// always, even over whatever secondary error the killed process
    /// produced, and even over a racy late success.
    pub fn compute(
        &mut self,
        inputs: &HashMap<String, Vec<f64>>,
        outputs: &mut HashMap<String, Vec<f64>>,
    ) -> Result<()> {
        self.manager.ensure_started()?;
        let kill_handle = self
            .manager
            .kill_handle()
            .ok_or_else(|| BridgeError::other("no live application after ensure_started"))?;

        let limit = self.config.timeout;
        let (outcome, reached) = watchdog::run_bounded(
            limit,
            move || {
                tracing::info!("Excel component timed out. Killing the application.");
                kill_handle.kill();
            },
            || self.open_and_run(inputs, outputs),
        );

        if reached {
            self.manager.mark_killed();
            return Err(BridgeError::Timeout { limit });
        }
        outcome
    }

    /// Release the application: graceful quit first (errors swallowed),
    /// then an unconditional forceful kill.
    pub fn cleanup(&mut self) {
        if self.manager.is_running() {
            self.manager.quit_gracefully();
            self.manager.kill();
        }
    }

    /// The tracked application PID, if a session is live.
    pub fn app_pid(&self) -> Option<u32> {
        self.manager.pid()
    }

    fn open_and_run(
        &self,
        inputs: &HashMap<String, Vec<f64>>,
        outputs: &mut HashMap<String, Vec<f64>>,
    ) -> Result<()> {
        let app = self
            .manager
            .app()
            .ok_or_else(|| BridgeError::other("application not started"))?;

        let file_path = &self.config.file_path;
        tracing::debug!("Opening {}...", file_path.display());
        let book = app.open(file_path)?;

        let outcome = self.run_stages(app, book, inputs, outputs);

        // Closed without saving on success and failure alike. When the
        // process was killed mid-run the close fails too; the stage failure
        // wins and the watchdog classification absorbs both.
        let closed = app.close(book);
        outcome?;
        closed?;
        tracing::debug!("Closed {}.", file_path.display());
        Ok(())
    }

    fn run_stages(
        &self,
        app: &L::App,
        book: BookHandle,
        inputs: &HashMap<String, Vec<f64>>,
        outputs: &mut HashMap<String, Vec<f64>>,
    ) -> Result<()> {
        let all_macros: BTreeSet<String> = self
            .config
            .pre_macros
            .iter()
            .chain(&self.config.main_macros)
            .chain(&self.config.post_macros)
            .cloned()
            .collect();

        tracing::debug!("Wrapping macros...");
        wrapper::install_wrappers(app, book, &all_macros)?;

        for name in &self.config.pre_macros {
            run_and_raise(app, book, name, MacroStage::Pre)?;
        }

        marshal::write_inputs(app, book, &self.config.inputs, inputs)?;

        for name in &self.config.main_macros {
            run_and_raise(app, book, name, MacroStage::Main)?;
        }

        marshal::read_outputs(app, book, &self.config.outputs, outputs)?;

        for name in &self.config.post_macros {
            run_and_raise(app, book, name, MacroStage::Post)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ExcelLauncher;

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = ExcelComponentConfig::new("model.xlsx");
        config.timeout = Duration::ZERO;
        let err = ExcelComponent::with_launcher(config, ExcelLauncher::default()).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn default_timeout_is_one_hour() {
        let config = ExcelComponentConfig::new("model.xlsx");
        assert_eq!(config.timeout, Duration::from_secs(3600));
    }
}
