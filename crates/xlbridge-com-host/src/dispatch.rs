//! Safe wrapper around IDispatch for late-bound COM automation.
//!
//! Excel's COM API is primarily accessed through IDispatch (like VBScript
//! late-binding). This module provides ergonomic helpers for property
//! get/set, method invocation, and the SAFEARRAY plumbing needed for bulk
//! range transfers and wrapper-macro return values.

#![cfg(windows)]

use std::mem::ManuallyDrop;
use std::ptr;

use windows::{
    core::{BSTR, GUID, HSTRING, PCWSTR},
    Win32::{
        Foundation::{DISP_E_EXCEPTION, VARIANT_BOOL},
        Globalization::GetSystemDefaultLCID,
        System::{
            Com::{
                CLSIDFromProgID, CoCreateInstance, IDispatch, SAFEARRAY, SAFEARRAYBOUND,
                CLSCTX_LOCAL_SERVER, DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT,
                DISPPARAMS, EXCEPINFO,
            },
            Ole::{
                SafeArrayCreate, SafeArrayGetDim, SafeArrayGetElement, SafeArrayGetLBound,
                SafeArrayGetUBound, SafeArrayPutElement, DISPID_PROPERTYPUT,
            },
            Variant::{
                VARENUM, VARIANT, VT_ARRAY, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_EMPTY, VT_ERROR,
                VT_I2, VT_I4, VT_NULL, VT_R4, VT_R8, VT_VARIANT,
            },
        },
    },
};

// -- VARIANT construction helpers --
// The VARIANT struct wraps inner unions in ManuallyDrop, so we use ptr::write
// to set fields without triggering the DerefMut lint.

/// Create an empty VARIANT.
pub fn variant_empty() -> VARIANT {
    VARIANT::default()
}

/// Create a VARIANT containing a bool.
pub fn variant_bool(val: bool) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BOOL);
        ptr::write(
            &mut inner.Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
        v
    }
}

/// Create a VARIANT containing an f64.
pub fn variant_f64(val: f64) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_R8);
        ptr::write(&mut inner.Anonymous.dblVal, val);
        v
    }
}

/// Create a VARIANT containing an i32.
pub fn variant_i32(val: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_I4);
        ptr::write(&mut inner.Anonymous.lVal, val);
        v
    }
}

/// Create a VARIANT containing a BSTR string.
pub fn variant_str(val: &str) -> VARIANT {
    unsafe {
        let bstr = BSTR::from(val);
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BSTR);
        ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(bstr));
        v
    }
}

/// Get the VT type of a VARIANT.
pub fn variant_vt(v: &VARIANT) -> u16 {
    unsafe { v.Anonymous.Anonymous.vt.0 }
}

/// Extract a bool from a VARIANT.
pub fn variant_get_bool(v: &VARIANT) -> Option<bool> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BOOL {
            Some(v.Anonymous.Anonymous.Anonymous.boolVal.0 != 0)
        } else {
            None
        }
    }
}

/// Extract an f64 from a VARIANT.
pub fn variant_get_f64(v: &VARIANT) -> Option<f64> {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        let anon = &v.Anonymous.Anonymous.Anonymous;
        if vt == VT_R8 {
            Some(anon.dblVal)
        } else if vt == VT_R4 {
            Some(anon.fltVal as f64)
        } else if vt == VT_I4 {
            Some(anon.lVal as f64)
        } else if vt == VT_I2 {
            Some(anon.iVal as f64)
        } else {
            None
        }
    }
}

/// Extract a string from a VARIANT.
pub fn variant_get_string(v: &VARIANT) -> Option<String> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BSTR {
            let bstr = &v.Anonymous.Anonymous.Anonymous.bstrVal;
            Some(bstr.to_string())
        } else {
            None
        }
    }
}

/// Extract an IDispatch from a VARIANT.
pub fn variant_get_dispatch(v: &VARIANT) -> Option<IDispatch> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_DISPATCH {
            // pdispVal is ManuallyDrop<Option<IDispatch>>
            let opt_disp: &Option<IDispatch> = &v.Anonymous.Anonymous.Anonymous.pdispVal;
            opt_disp.clone()
        } else {
            None
        }
    }
}

/// Check if a VARIANT is empty or null.
pub fn variant_is_empty(v: &VARIANT) -> bool {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        vt == VT_EMPTY || vt == VT_NULL
    }
}

/// Check if a VARIANT is a VT_ERROR.
pub fn variant_is_error(v: &VARIANT) -> bool {
    unsafe { v.Anonymous.Anonymous.vt == VT_ERROR }
}

/// Extract the SCODE from a VT_ERROR VARIANT. Excel cell error values carry
/// the xlErr code in the low word (e.g. 2007 for #DIV/0!).
pub fn variant_get_scode(v: &VARIANT) -> Option<i32> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_ERROR {
            Some(v.Anonymous.Anonymous.Anonymous.scode)
        } else {
            None
        }
    }
}

// -- SAFEARRAY helpers --

const VT_VARIANT_ARRAY: VARENUM = VARENUM(VT_ARRAY.0 | VT_VARIANT.0);

/// Check if a VARIANT holds a SAFEARRAY of VARIANTs.
pub fn variant_is_array(v: &VARIANT) -> bool {
    variant_vt(v) & VT_ARRAY.0 != 0
}

/// Build a VARIANT holding a 2-D SAFEARRAY of VARIANTs (rows x cols), the
/// shape Excel expects for a bulk `Range.Value` assignment.
pub fn variant_from_variant_grid(grid: Vec<Vec<VARIANT>>) -> Result<VARIANT, String> {
    let rows = grid.len() as u32;
    let cols = grid.first().map(|r| r.len()).unwrap_or(0) as u32;

    let bounds = [
        SAFEARRAYBOUND {
            cElements: rows,
            lLbound: 1,
        },
        SAFEARRAYBOUND {
            cElements: cols,
            lLbound: 1,
        },
    ];

    unsafe {
        let psa = SafeArrayCreate(VT_VARIANT, 2, bounds.as_ptr());
        if psa.is_null() {
            return Err("SafeArrayCreate failed".to_string());
        }

        for (i, row) in grid.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                // rgIndices[0] is the rightmost dimension (columns).
                let indices = [j as i32 + 1, i as i32 + 1];
                SafeArrayPutElement(psa, indices.as_ptr(), cell as *const _ as *const _)
                    .map_err(|e| format!("SafeArrayPutElement failed: {e}"))?;
            }
        }

        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_VARIANT_ARRAY);
        ptr::write(&mut inner.Anonymous.parray, psa);
        Ok(v)
    }
}

/// Read a VARIANT holding a 1-D or 2-D SAFEARRAY of VARIANTs into a
/// row-major grid. A 1-D array becomes a single row.
pub fn variant_to_variant_grid(v: &VARIANT) -> Result<Vec<Vec<VARIANT>>, String> {
    if !variant_is_array(v) {
        return Err(format!(
            "expected a SAFEARRAY VARIANT, got VT={}",
            variant_vt(v)
        ));
    }

    unsafe {
        let psa: *mut SAFEARRAY = v.Anonymous.Anonymous.Anonymous.parray;
        if psa.is_null() {
            return Err("SAFEARRAY pointer is null".to_string());
        }

        let dims = SafeArrayGetDim(psa);
        match dims {
            1 => {
                let lo = SafeArrayGetLBound(psa, 1).map_err(|e| e.to_string())?;
                let hi = SafeArrayGetUBound(psa, 1).map_err(|e| e.to_string())?;
                let mut row = Vec::with_capacity((hi - lo + 1) as usize);
                for idx in lo..=hi {
                    row.push(safe_array_get_variant(psa, &[idx])?);
                }
                Ok(vec![row])
            }
            2 => {
                let row_lo = SafeArrayGetLBound(psa, 1).map_err(|e| e.to_string())?;
                let row_hi = SafeArrayGetUBound(psa, 1).map_err(|e| e.to_string())?;
                let col_lo = SafeArrayGetLBound(psa, 2).map_err(|e| e.to_string())?;
                let col_hi = SafeArrayGetUBound(psa, 2).map_err(|e| e.to_string())?;

                let mut grid = Vec::with_capacity((row_hi - row_lo + 1) as usize);
                for i in row_lo..=row_hi {
                    let mut row = Vec::with_capacity((col_hi - col_lo + 1) as usize);
                    for j in col_lo..=col_hi {
                        // rgIndices[0] is the rightmost dimension (columns).
                        row.push(safe_array_get_variant(psa, &[j, i])?);
                    }
                    grid.push(row);
                }
                Ok(grid)
            }
            n => Err(format!("unsupported SAFEARRAY dimension count: {n}")),
        }
    }
}

unsafe fn safe_array_get_variant(psa: *mut SAFEARRAY, indices: &[i32]) -> Result<VARIANT, String> {
    let mut out = VARIANT::default();
    SafeArrayGetElement(psa, indices.as_ptr(), &mut out as *mut _ as *mut _)
        .map_err(|e| format!("SafeArrayGetElement failed: {e}"))?;
    Ok(out)
}

// -- DispatchObject --

/// A wrapper around an IDispatch COM object providing ergonomic access.
#[derive(Clone)]
pub struct DispatchObject {
    inner: IDispatch,
}

impl DispatchObject {
    /// Create a COM object from a ProgID string (e.g., "Excel.Application").
    pub fn create_from_progid(progid: &str) -> Result<Self, String> {
        unsafe {
            let hstr = HSTRING::from(progid);
            let clsid =
                CLSIDFromProgID(&hstr).map_err(|e| format!("CLSIDFromProgID failed: {e}"))?;
            let disp: IDispatch = CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|e| format!("CoCreateInstance failed for '{progid}': {e}"))?;
            Ok(Self { inner: disp })
        }
    }

    /// Wrap an existing IDispatch pointer.
    pub fn from_idispatch(disp: IDispatch) -> Self {
        Self { inner: disp }
    }

    /// Look up the DISPID for a member name.
    fn get_dispid(&self, name: &str) -> Result<i32, String> {
        unsafe {
            let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
            let pcwstr = PCWSTR(wide.as_ptr());
            let names = [pcwstr];
            let mut dispid = 0i32;
            self.inner
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    GetSystemDefaultLCID(),
                    &mut dispid,
                )
                .map_err(|e| format!("GetIDsOfNames('{name}') failed: {e}"))?;
            Ok(dispid)
        }
    }

    /// Get a property value. Equivalent to VB's `obj.PropertyName`.
    pub fn get_property(&self, name: &str) -> Result<VARIANT, String> {
        let dispid = self.get_dispid(name)?;
        unsafe {
            let params = DISPPARAMS::default();
            let mut result = VARIANT::default();
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    DISPATCH_PROPERTYGET,
                    &params,
                    Some(&mut result),
                    Some(&mut except),
                    None,
                )
                .map_err(|e| format_invoke_error(e, &except, name))?;
            Ok(result)
        }
    }

    /// Set a property value. Equivalent to VB's `obj.PropertyName = value`.
    pub fn set_property(&self, name: &str, value: VARIANT) -> Result<(), String> {
        let dispid = self.get_dispid(name)?;
        unsafe {
            let mut args = [value];
            let mut named_args = [DISPID_PROPERTYPUT];
            let params = DISPPARAMS {
                rgvarg: args.as_mut_ptr(),
                rgdispidNamedArgs: named_args.as_mut_ptr(),
                cArgs: 1,
                cNamedArgs: 1,
            };
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    DISPATCH_PROPERTYPUT,
                    &params,
                    None,
                    Some(&mut except),
                    None,
                )
                .map_err(|e| format_invoke_error(e, &except, name))?;
            Ok(())
        }
    }

    /// Invoke a method with arguments. Arguments should be in natural order
    /// (this function reverses them as required by DISPPARAMS).
    pub fn invoke_method(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        let dispid = self.get_dispid(name)?;
        unsafe {
            // DISPPARAMS requires arguments in reverse order
            let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
            let params = DISPPARAMS {
                rgvarg: if reversed.is_empty() {
                    std::ptr::null_mut()
                } else {
                    reversed.as_mut_ptr()
                },
                rgdispidNamedArgs: std::ptr::null_mut(),
                cArgs: reversed.len() as u32,
                cNamedArgs: 0,
            };
            let mut result = VARIANT::default();
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    DISPATCH_METHOD,
                    &params,
                    Some(&mut result),
                    Some(&mut except),
                    None,
                )
                .map_err(|e| format_invoke_error(e, &except, name))?;
            Ok(result)
        }
    }

    /// Get a child object (property that returns an IDispatch).
    pub fn get_child(&self, name: &str) -> Result<DispatchObject, String> {
        let variant = self.get_property(name)?;
        extract_dispatch(&variant, name)
    }

    /// Invoke a method and extract the returned IDispatch object.
    pub fn invoke_child(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        let variant = self.invoke_method(name, args)?;
        extract_dispatch(&variant, name)
    }

    /// Get a property that's indexed (e.g., `Range("a")` or `Worksheets(1)`).
    pub fn get_indexed(&self, name: &str, index: &VARIANT) -> Result<DispatchObject, String> {
        let dispid = self.get_dispid(name)?;
        unsafe {
            let mut args = [index.clone()];
            let params = DISPPARAMS {
                rgvarg: args.as_mut_ptr(),
                rgdispidNamedArgs: std::ptr::null_mut(),
                cArgs: 1,
                cNamedArgs: 0,
            };
            let mut result = VARIANT::default();
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    DISPATCH_PROPERTYGET,
                    &params,
                    Some(&mut result),
                    Some(&mut except),
                    None,
                )
                .map_err(|e| format_invoke_error(e, &except, name))?;
            extract_dispatch(&result, name)
        }
    }
}

/// Extract an IDispatch from a VARIANT, with a descriptive error.
fn extract_dispatch(variant: &VARIANT, context: &str) -> Result<DispatchObject, String> {
    if let Some(disp) = variant_get_dispatch(variant) {
        Ok(DispatchObject::from_idispatch(disp))
    } else if variant_is_empty(variant) {
        Err(format!("'{context}' returned empty/null"))
    } else {
        let vt = variant_vt(variant);
        Err(format!(
            "'{context}' returned non-object VARIANT (VT={vt}), expected VT_DISPATCH"
        ))
    }
}

/// Format an Invoke error, including EXCEPINFO details if available.
fn format_invoke_error(err: windows::core::Error, except: &EXCEPINFO, member_name: &str) -> String {
    let code = err.code().0 as u32;
    if code == DISP_E_EXCEPTION.0 as u32 {
        let desc = if !except.bstrDescription.is_empty() {
            except.bstrDescription.to_string()
        } else {
            String::from("(no description)")
        };
        let source = if !except.bstrSource.is_empty() {
            except.bstrSource.to_string()
        } else {
            String::from("(no source)")
        };
        format!("COM exception in '{member_name}': {desc} (source: {source})")
    } else {
        format!("Invoke('{member_name}') failed: {err}")
    }
}
