//! Process-wide interrupt flag.
//!
//! Ctrl-C / SIGTERM sets the flag; the classifier checks it between files and
//! stops scheduling new work while in-flight tasks run to completion.
//! Relaxed atomics suffice for a one-way stop flag.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Request a cooperative shutdown (idempotent, signal-safe).
#[inline]
pub fn request() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

#[inline]
pub fn is_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Clear the flag. Used by tests and by embedders running several passes.
#[inline]
pub fn reset() {
    SHUTDOWN.store(false, Ordering::Relaxed);
}

/// Install the Ctrl-C handler: set the flag, then run `on_interrupt`.
/// Can only be installed once per process.
pub fn install_handler<F>(on_interrupt: F) -> Result<()>
where
    F: Fn() + Send + 'static,
{
    ctrlc::set_handler(move || {
        request();
        on_interrupt();
    })
    .context("install interrupt handler")
}
