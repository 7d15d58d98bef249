//! VBA wrapper generation and injection.
//!
//! User macros stop the whole automation chain when they raise: the error
//! surfaces as a modal state inside Excel, invisible to the caller. The fix
//! has to live inside Excel's own scripting dialect — each user macro gets a
//! generated wrapper `Function` that invokes it under `On Error Resume Next`
//! and returns the `Err` object's fields as a plain array, so a failing
//! macro becomes data instead of a hang.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::host::{BookHandle, SheetApp};

/// Name of the injected VBA module. Fixed, so re-opening the same workbook
/// never accumulates modules across invocations.
pub const WRAPPER_MODULE_NAME: &str = "xlb_wrapped_macros";

const MODULE_HEADER: &str = "Option Private Module\nOption Explicit";

/// Deterministic, collision-resistant wrapper identity for a macro name.
///
/// Identical macro name gives an identical wrapper name within and across
/// invocations, which makes repeated installation idempotent and lets a
/// stuck run be debugged by inspecting the module inside Excel.
pub fn wrapper_name(macro_name: &str) -> String {
    let digest = Sha256::digest(macro_name.as_bytes());
    let mut name = String::with_capacity(8 + digest.len() * 2);
    name.push_str("wrapped_");
    for byte in digest {
        let _ = write!(name, "{byte:02x}");
    }
    name
}

fn wrapper_source(macro_name: &str) -> String {
    let wrapped = wrapper_name(macro_name);
    format!(
        "Function {wrapped}()\n\
         \x20   On Error Resume Next\n\
         \x20   {macro_name}\n\
         \x20   {wrapped} = Array(Err.Number, Err.Source, Err.Description, Err.HelpFile, Err.HelpContext, Err.LastDllError)\n\
         End Function"
    )
}

/// Full source of the wrapper module for a set of macro names.
///
/// Names are emitted in sorted order, so the same set always produces
/// byte-identical code.
pub fn module_source(macros: &BTreeSet<String>) -> String {
    let mut code = String::from(MODULE_HEADER);
    for name in macros {
        code.push_str("\n\n");
        code.push_str(&wrapper_source(name));
    }
    code
}

/// Install wrapper functions for every distinct macro name into the open
/// workbook. A no-op on an empty set: the document is never touched.
pub fn install_wrappers<A: SheetApp>(
    app: &A,
    book: BookHandle,
    macros: &BTreeSet<String>,
) -> Result<()> {
    if macros.is_empty() {
        return Ok(());
    }
    app.add_macro_module(book, WRAPPER_MODULE_NAME, &module_source(macros))
}
