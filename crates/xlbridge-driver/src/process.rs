//! OS-level process termination.
//!
//! Termination is the only stop mechanism for a hung Excel: there is no
//! cooperative cancellation primitive in the COM call chain, so the kill
//! path must be safe to invoke from any thread and at any time, including
//! against a process that already exited.

/// Forcefully terminate the process with the given identifier.
///
/// A process that is already gone is treated as success: the caller may
/// issue the same kill twice (watchdog expiry followed by teardown) without
/// either call failing.
pub fn kill_pid(pid: u32) {
    #[cfg(unix)]
    unsafe {
        // ESRCH (already exited) is fine; ignore the return value.
        libc::kill(pid as i32, libc::SIGKILL);
    }

    #[cfg(windows)]
    unsafe {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{
            OpenProcess, TerminateProcess, PROCESS_TERMINATE,
        };

        if let Ok(handle) = OpenProcess(PROCESS_TERMINATE, false, pid) {
            let _ = TerminateProcess(handle, 1);
            let _ = CloseHandle(handle);
        }
    }
}
