//! # xlbridge
//!
//! Lets a numerical optimization host treat an Excel workbook as one
//! computation step: write input values into named ranges, recalculate
//! (running user macros at pre/main/post stages), read output values back.
//!
//! The hard part is recovery: Excel has no cooperative cancellation, so a
//! hung macro would block the host forever. Every invocation runs under a
//! wall-clock watchdog that forcefully kills the application process on
//! expiry; the next invocation transparently starts a fresh one. User
//! macros run through generated VBA wrappers that capture the `Err` object
//! into a structured result, so a failing macro reports data instead of
//! stopping the automation chain.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use xlbridge::{ExcelComponent, ExcelComponentConfig, VarMap};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ExcelComponentConfig::new("model.xlsm");
//!     config.inputs = vec![VarMap::new("x", "input_cell")];
//!     config.outputs = vec![VarMap::new("y", "output_cell")];
//!     config.main_macros = vec!["SolveModel".to_string()];
//!
//!     let mut component = ExcelComponent::new(config)?;
//!     component.setup()?;
//!
//!     let inputs = HashMap::from([("x".to_string(), vec![1.5])]);
//!     let mut outputs = HashMap::new();
//!     component.compute(&inputs, &mut outputs)?;
//!     println!("y = {:?}", outputs["y"]);
//!
//!     component.cleanup();
//!     Ok(())
//! }
//! ```

pub mod component;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod marshal;
pub mod runner;
pub mod vars;
pub mod watchdog;
pub mod wrapper;

// Re-exports for convenience
pub use component::{ExcelComponent, ExcelComponentConfig, DEFAULT_TIMEOUT};
pub use error::{BridgeError, Result};
pub use host::{AppLauncher, BookHandle, ExcelLauncher, SheetApp};
pub use lifecycle::{AppManager, KillHandle};
pub use runner::{MacroError, MacroResult, MacroStage};
pub use vars::VarMap;
pub use wrapper::{wrapper_name, WRAPPER_MODULE_NAME};
