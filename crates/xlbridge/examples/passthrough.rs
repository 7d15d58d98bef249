//! Example: drive a passthrough workbook through the full bridge pipeline.
//!
//! The workbook is expected to have two named ranges, `a` (input) and `b`
//! (output), with `b` holding the formula `=a`.
//!
//! Prerequisites:
//!   - WINE installed and in PATH
//!   - Microsoft Excel installed in the WINE prefix
//!   - xlbridge-com-host.exe built:
//!     cargo build --target x86_64-pc-windows-gnu -p xlbridge-com-host --release
//!
//! Run:
//!   cargo run --example passthrough -p xlbridge -- path/to/passthrough.xlsx

use std::collections::HashMap;

use xlbridge::{ExcelComponent, ExcelComponentConfig, VarMap};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let file_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "passthrough.xlsx".to_string());

    let mut config = ExcelComponentConfig::new(file_path);
    config.inputs = vec![VarMap::new("in", "a")];
    config.outputs = vec![VarMap::new("out", "b")];

    let mut component = ExcelComponent::new(config)?;
    component.setup()?;
    println!("Excel running, PID {:?}", component.app_pid());

    for value in [1.5, -2.25, 1e6] {
        let inputs = HashMap::from([("in".to_string(), vec![value])]);
        let mut outputs = HashMap::new();
        component.compute(&inputs, &mut outputs)?;
        println!("in = {value}, out = {:?}", outputs["out"]);
    }

    component.cleanup();
    Ok(())
}
