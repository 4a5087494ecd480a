//! Ctrl+C handling for long waits.
//!
//! The handler raises a flag and wakes waiters. Blocking steps of a login
//! (the browser redirect, the silent SSO round trip) run through
//! [`until_interrupted`] so a Ctrl+C cancels them with [`InterruptedError`].
//! A second Ctrl+C exits immediately.

use std::future::Future;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Exit status used when the user interrupts.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

static REQUESTED: AtomicBool = AtomicBool::new(false);
static WAKE: OnceLock<Notify> = OnceLock::new();
static BEFORE_EXIT: OnceLock<Box<dyn Fn() + Send + Sync>> = OnceLock::new();

/// A wait was cancelled by Ctrl+C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptedError;

impl std::fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Interrupted")
    }
}

impl std::error::Error for InterruptedError {}

fn wake() -> &'static Notify {
    WAKE.get_or_init(Notify::new)
}

/// Installs the process-wide Ctrl+C handler.
///
/// # Errors
/// Returns an error if a handler is already installed.
pub fn init() -> anyhow::Result<()> {
    ctrlc::set_handler(trigger_ctrl_c)?;
    Ok(())
}

/// Records a Ctrl+C. The second one runs the exit hook and leaves.
pub fn trigger_ctrl_c() {
    if REQUESTED.swap(true, Ordering::SeqCst) {
        if let Some(hook) = BEFORE_EXIT.get() {
            hook();
        }
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
    wake().notify_waiters();
}

pub fn is_interrupted() -> bool {
    REQUESTED.load(Ordering::SeqCst)
}

/// Clears a handled interrupt so the next wait starts fresh.
pub fn reset() {
    REQUESTED.store(false, Ordering::SeqCst);
}

/// Resolves once Ctrl+C has been pressed.
pub async fn wait_for_interrupt() {
    loop {
        // register before checking the flag so a wakeup cannot slip between
        let notified = wake().notified();
        if is_interrupted() {
            return;
        }
        notified.await;
    }
}

/// Runs `fut` unless Ctrl+C arrives first.
///
/// # Errors
/// Returns [`InterruptedError`] when interrupted.
pub async fn until_interrupted<F: Future>(fut: F) -> Result<F::Output, InterruptedError> {
    tokio::select! {
        output = fut => Ok(output),
        () = wait_for_interrupt() => Err(InterruptedError),
    }
}

/// Registers the hook run before a forced exit (terminal restore).
pub fn set_restore_hook<F>(hook: F)
where
    F: Fn() + Send + Sync + 'static,
{
    let _ = BEFORE_EXIT.set(Box::new(hook));
}
