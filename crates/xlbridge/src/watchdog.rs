//! Wall-clock watchdog for one bounded unit of work.
//!
//! The external application call is blocking and non-preemptible, so the
//! watchdog never tries to interrupt the body directly. It runs the body on
//! the calling thread, parks a timer thread on a cancellable wait, and on
//! expiry records the fact and fires the caller-supplied recovery action
//! (killing the application), which makes the blocked body fail on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Run `body` on the calling thread under a wall-clock deadline.
///
/// Returns the body's outcome and whether the deadline was reached. On
/// expiry, `reached` is recorded before `on_expiry` runs on the timer
/// thread, deliberately racing with the still-executing body. The flag is
/// read only after the timer thread is joined, so the cross-thread write is
/// ordered before the read.
///
/// The deadline-reached flag may be true even when the body completed
/// successfully in the window between expiry and recovery; callers are
/// expected to let the timeout win over such racy successes.
pub fn run_bounded<R>(
    limit: Duration,
    on_expiry: impl FnOnce() + Send + 'static,
    body: impl FnOnce() -> R,
) -> (R, bool) {
    let reached = Arc::new(AtomicBool::new(false));
    let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

    let flag = Arc::clone(&reached);
    let timer = thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(limit) {
            flag.store(true, Ordering::SeqCst);
            on_expiry();
        }
    });

    let outcome = body();

    // Cancel the timer (a no-op if it already fired) and join it so any
    // expiry-side work has finished before the flag is read.
    let _ = cancel_tx.send(());
    let _ = timer.join();

    let reached = reached.load(Ordering::SeqCst);
    (outcome, reached)
}
