//! Excel-specific COM automation layer built on top of the generic IDispatch wrapper.

#![cfg(windows)]

use std::collections::HashMap;

use windows::Win32::System::Variant::VARIANT;

use xlbridge_protocol::{CalcMode, CellError, CellValue, MacroErrorRaw};

use crate::dispatch::{
    variant_bool, variant_empty, variant_f64, variant_from_variant_grid, variant_get_bool,
    variant_get_f64, variant_get_scode, variant_get_string, variant_i32, variant_is_array,
    variant_is_empty, variant_is_error, variant_str, variant_to_variant_grid, DispatchObject,
};

// Application.Calculation values
const XL_CALCULATION_AUTOMATIC: i32 = -4105;
const XL_CALCULATION_MANUAL: i32 = -4135;

// vbext_ComponentType for a standard code module
const VBEXT_CT_STD_MODULE: i32 = 1;

/// Manages an Excel.Application COM instance and its open workbooks.
pub struct ExcelApp {
    app: DispatchObject,
    workbooks_collection: DispatchObject,
    /// Map from our handle IDs to workbook dispatch objects.
    workbooks: HashMap<u64, DispatchObject>,
    next_handle: u64,
}

impl ExcelApp {
    /// Create a new Excel.Application instance via COM.
    pub fn new() -> Result<Self, String> {
        let app = DispatchObject::create_from_progid("Excel.Application")?;

        // Disable UI elements for automation
        app.set_property("Visible", variant_bool(false))?;
        app.set_property("DisplayAlerts", variant_bool(false))?;
        app.set_property("ScreenUpdating", variant_bool(false))?;

        let workbooks_collection = app.get_child("Workbooks")?;

        Ok(Self {
            app,
            workbooks_collection,
            workbooks: HashMap::new(),
            next_handle: 1,
        })
    }

    /// OS process identifier of this Excel instance, resolved through its
    /// hidden top-level window.
    pub fn pid(&self) -> Result<u32, String> {
        use windows::Win32::Foundation::HWND;
        use windows::Win32::UI::WindowsAndMessaging::GetWindowThreadProcessId;

        let hwnd_variant = self.app.get_property("Hwnd")?;
        let hwnd = variant_get_f64(&hwnd_variant)
            .ok_or_else(|| "Hwnd property is not numeric".to_string())? as isize;

        let mut pid = 0u32;
        unsafe {
            GetWindowThreadProcessId(HWND(hwnd as *mut core::ffi::c_void), Some(&mut pid));
        }
        if pid == 0 {
            return Err("GetWindowThreadProcessId returned no PID".to_string());
        }
        Ok(pid)
    }

    /// Open a workbook from a file path. Returns the handle ID.
    pub fn open_workbook(&mut self, path: &str) -> Result<u64, String> {
        let wb = self
            .workbooks_collection
            .invoke_child("Open", &[variant_str(path)])?;

        // A crash-recovery snapshot of an automation workbook is never
        // wanted; the book is always closed without saving.
        wb.set_property("EnableAutoRecover", variant_bool(false))?;

        let handle = self.next_handle;
        self.next_handle += 1;
        self.workbooks.insert(handle, wb);
        Ok(handle)
    }

    fn check_handle(&self, wb_handle: u64) -> Result<&DispatchObject, String> {
        self.workbooks
            .get(&wb_handle)
            .ok_or_else(|| format!("Unknown workbook handle: {wb_handle}"))
    }

    /// Get a Range object for a named range or A1-style reference.
    ///
    /// Resolution happens at application level against the active workbook;
    /// exactly one workbook is open at a time in this bridge.
    fn get_range(&self, wb_handle: u64, range_ref: &str) -> Result<DispatchObject, String> {
        self.check_handle(wb_handle)?;
        self.app.get_indexed("Range", &variant_str(range_ref))
    }

    /// Write a full grid of values to a range in one bulk assignment.
    pub fn set_range_values(
        &self,
        wb_handle: u64,
        range_ref: &str,
        values: &[Vec<CellValue>],
    ) -> Result<(), String> {
        let range = self.get_range(wb_handle, range_ref)?;

        // A single scalar is assigned directly; anything larger goes as one
        // 2-D SAFEARRAY so Excel sees exactly one assignment.
        if values.len() == 1 && values[0].len() == 1 {
            range.set_property("Value", cell_value_to_variant(&values[0][0]))
        } else {
            let grid: Vec<Vec<VARIANT>> = values
                .iter()
                .map(|row| row.iter().map(cell_value_to_variant).collect())
                .collect();
            range.set_property("Value", variant_from_variant_grid(grid)?)
        }
    }

    /// Read the full grid of computed values from a range.
    pub fn get_range_values(
        &self,
        wb_handle: u64,
        range_ref: &str,
    ) -> Result<Vec<Vec<CellValue>>, String> {
        let range = self.get_range(wb_handle, range_ref)?;
        let value = range.get_property("Value")?;

        if variant_is_array(&value) {
            let grid = variant_to_variant_grid(&value)?;
            Ok(grid
                .iter()
                .map(|row| row.iter().map(variant_to_cell_value).collect())
                .collect())
        } else {
            Ok(vec![vec![variant_to_cell_value(&value)]])
        }
    }

    /// Switch the application-wide calculation mode.
    pub fn set_calculation(&self, mode: CalcMode) -> Result<(), String> {
        let value = match mode {
            CalcMode::Manual => XL_CALCULATION_MANUAL,
            CalcMode::Automatic => XL_CALCULATION_AUTOMATIC,
        };
        self.app.set_property("Calculation", variant_i32(value))
    }

    /// Force a full recalculation.
    pub fn recalculate(&self) -> Result<(), String> {
        self.app.invoke_method("Calculate", &[])?;
        Ok(())
    }

    /// Add a VBA code module to a workbook's macro project.
    pub fn add_macro_module(
        &self,
        wb_handle: u64,
        name: &str,
        code: &str,
    ) -> Result<(), String> {
        self.check_handle(wb_handle)?;

        let vbe = self.app.get_child("VBE")?;
        let project = vbe.get_child("ActiveVBProject")?;
        let components = project.get_child("VBComponents")?;

        let module = components.invoke_child("Add", &[variant_i32(VBEXT_CT_STD_MODULE)])?;
        module.set_property("Name", variant_str(name))?;

        let code_module = module.get_child("CodeModule")?;
        code_module.invoke_method("AddFromString", &[variant_str(code)])?;
        Ok(())
    }

    /// Run a macro function via Application.Run and decode the six-element
    /// error array the generated wrappers return.
    pub fn run_macro(&self, wb_handle: u64, name: &str) -> Result<MacroErrorRaw, String> {
        self.check_handle(wb_handle)?;
        let result = self.app.invoke_method("Run", &[variant_str(name)])?;

        let grid = variant_to_variant_grid(&result)
            .map_err(|e| format!("macro '{name}' did not return the wrapper array: {e}"))?;
        let row = grid
            .first()
            .ok_or_else(|| format!("macro '{name}' returned an empty array"))?;
        if row.len() != 6 {
            return Err(format!(
                "macro '{name}' returned {} elements, expected 6",
                row.len()
            ));
        }

        Ok(MacroErrorRaw {
            code: variant_number_lossy(&row[0]),
            source: variant_string_lossy(&row[1]),
            description: variant_string_lossy(&row[2]),
            help_file: variant_string_lossy(&row[3]),
            help_context: variant_string_lossy(&row[4]),
            last_dll_error: variant_number_lossy(&row[5]),
        })
    }

    /// Close a workbook without saving.
    pub fn close_workbook(&mut self, wb_handle: u64) -> Result<(), String> {
        let wb = self
            .workbooks
            .remove(&wb_handle)
            .ok_or_else(|| format!("Unknown workbook handle: {wb_handle}"))?;
        wb.invoke_method("Close", &[variant_bool(false)])?;
        Ok(())
    }

    /// Shut down: close all workbooks and quit Excel.
    pub fn shutdown(mut self) -> Result<(), String> {
        let handles: Vec<u64> = self.workbooks.keys().copied().collect();
        for h in handles {
            let _ = self.close_workbook(h);
        }
        self.app.invoke_method("Quit", &[])?;
        Ok(())
    }
}

/// Convert our protocol CellValue to a COM VARIANT.
fn cell_value_to_variant(value: &CellValue) -> VARIANT {
    match value {
        CellValue::Null => variant_empty(),
        CellValue::Bool(b) => variant_bool(*b),
        CellValue::Number(n) => variant_f64(*n),
        CellValue::String(s) => variant_str(s),
        CellValue::Error(_) => variant_empty(), // Can't set error values
    }
}

/// Convert a COM VARIANT to our protocol CellValue.
fn variant_to_cell_value(variant: &VARIANT) -> CellValue {
    if variant_is_empty(variant) {
        CellValue::Null
    } else if let Some(b) = variant_get_bool(variant) {
        CellValue::Bool(b)
    } else if let Some(n) = variant_get_f64(variant) {
        CellValue::Number(n)
    } else if let Some(s) = variant_get_string(variant) {
        CellValue::String(s)
    } else if variant_is_error(variant) {
        CellValue::Error(CellError {
            code: cell_error_name(variant_get_scode(variant).unwrap_or(0)),
        })
    } else {
        CellValue::Null
    }
}

/// Map an xlErr SCODE to its worksheet display form.
fn cell_error_name(scode: i32) -> String {
    match scode as u32 & 0xFFFF {
        2000 => "#NULL!".to_string(),
        2007 => "#DIV/0!".to_string(),
        2015 => "#VALUE!".to_string(),
        2023 => "#REF!".to_string(),
        2029 => "#NAME?".to_string(),
        2036 => "#NUM!".to_string(),
        2042 => "#N/A".to_string(),
        code => format!("#ERR({code})"),
    }
}

/// Best-effort numeric read of a wrapper array element.
fn variant_number_lossy(v: &VARIANT) -> i64 {
    variant_get_f64(v).map(|n| n as i64).unwrap_or(0)
}

/// Best-effort string read of a wrapper array element; numbers (like
/// Err.HelpContext) are stringified, anything else becomes empty.
fn variant_string_lossy(v: &VARIANT) -> String {
    if let Some(s) = variant_get_string(v) {
        s
    } else if let Some(n) = variant_get_f64(v) {
        if n == n.trunc() {
            format!("{}", n as i64)
        } else {
            format!("{n}")
        }
    } else {
        String::new()
    }
}
