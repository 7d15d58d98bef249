//! Value marshalling between host-framework mappings and workbook ranges.

use std::collections::HashMap;

use xlbridge_protocol::{CalcMode, CellValue};

use crate::error::{BridgeError, Result};
use crate::host::{BookHandle, SheetApp};
use crate::vars::VarMap;

/// Write every configured input into its range, then recalculate.
///
/// Calculation is switched to manual for the duration of the writes:
/// writing one variable at a time under automatic calculation would trigger
/// redundant intermediate recalculations against half-updated inputs. After
/// the last write, calculation returns to automatic and one full
/// recalculation is triggered, so every subsequent read sees a consistent
/// state.
pub fn write_inputs<A: SheetApp>(
    app: &A,
    book: BookHandle,
    vars: &[VarMap],
    values: &HashMap<String, Vec<f64>>,
) -> Result<()> {
    app.set_calculation(CalcMode::Manual)?;

    for var in vars {
        let vals = values
            .get(&var.name)
            .ok_or_else(|| BridgeError::MissingInput {
                name: var.name.clone(),
            })?;
        let grid = to_grid(var, vals)?;
        app.write_range(book, &var.range, grid)?;
        tracing::debug!("Input variable {} set to range {}.", var.name, var.range);
    }

    app.set_calculation(CalcMode::Automatic)?;
    app.recalculate()?;
    tracing::debug!("Workbook re-calculated.");
    Ok(())
}

/// Read every configured output from its range into the caller's mapping.
pub fn read_outputs<A: SheetApp>(
    app: &A,
    book: BookHandle,
    vars: &[VarMap],
    values: &mut HashMap<String, Vec<f64>>,
) -> Result<()> {
    for var in vars {
        let grid = app.read_range(book, &var.range)?;
        let vals = from_grid(var, grid)?;
        values.insert(var.name.clone(), vals);
        tracing::debug!("Output variable {} set from range {}.", var.name, var.range);
    }
    Ok(())
}

fn to_grid(var: &VarMap, vals: &[f64]) -> Result<Vec<Vec<CellValue>>> {
    let (rows, cols) = var.shape;
    if rows == 0 || cols == 0 || vals.len() != rows * cols {
        return Err(BridgeError::ShapeMismatch {
            name: var.name.clone(),
            expected: rows * cols,
            actual: vals.len(),
        });
    }

    Ok(vals
        .chunks(cols)
        .map(|row| row.iter().map(|&v| CellValue::Number(v)).collect())
        .collect())
}

/// Strict read policy: spreadsheet error values and text fail loudly at the
/// point of read; empty cells surface as NaN, booleans as 0.0/1.0.
fn from_grid(var: &VarMap, grid: Vec<Vec<CellValue>>) -> Result<Vec<f64>> {
    let (rows, cols) = var.shape;
    let actual: usize = grid.iter().map(Vec::len).sum();
    if grid.len() != rows || grid.iter().any(|row| row.len() != cols) {
        return Err(BridgeError::ShapeMismatch {
            name: var.name.clone(),
            expected: rows * cols,
            actual,
        });
    }

    let mut vals = Vec::with_capacity(rows * cols);
    for row in grid {
        for cell in row {
            match cell {
                CellValue::Number(n) => vals.push(n),
                CellValue::Null => vals.push(f64::NAN),
                CellValue::Bool(b) => vals.push(if b { 1.0 } else { 0.0 }),
                CellValue::String(s) => {
                    return Err(BridgeError::NonNumeric {
                        name: var.name.clone(),
                        range: var.range.clone(),
                        value: s,
                    })
                }
                CellValue::Error(e) => {
                    return Err(BridgeError::CellError {
                        name: var.name.clone(),
                        range: var.range.clone(),
                        code: e.code,
                    })
                }
            }
        }
    }
    Ok(vals)
}
