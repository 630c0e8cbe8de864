//! Abort and skip signals.
//!
//! Interrupts arrive asynchronously but are represented as plain atomic
//! flags the scheduler polls at loop iterations and before writes; nothing
//! ever interrupts a codec call mid-flight.
//!
//! When the progress display is on and inputs are being played one after
//! another, the first interrupt skips the current input; a second interrupt
//! within one second aborts the whole run. In every other configuration an
//! interrupt aborts immediately.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How close together two interrupts must land to mean "abort".
const ABORT_WINDOW: Duration = Duration::from_secs(1);

/// Shared abort/skip state for one run.
#[derive(Debug, Default)]
pub struct Signals {
    abort: AtomicBool,
    skip: AtomicBool,
    allow_skip: AtomicBool,
    last_interrupt: Mutex<Option<Instant>>,
}

impl Signals {
    /// Create a signal context with skipping disabled.
    pub fn new() -> Self {
        Signals::default()
    }

    /// Enable or disable skip-on-interrupt (progress display on, serial
    /// combining).
    pub fn set_allow_skip(&self, allow: bool) {
        self.allow_skip.store(allow, Ordering::Relaxed);
    }

    /// Record an interrupt. Safe to call from a signal-handler thread.
    pub fn interrupt(&self) {
        let now = Instant::now();
        let mut last = self.last_interrupt.lock().unwrap_or_else(|e| e.into_inner());
        let spaced_out = last.is_none_or(|t| now.duration_since(t) >= ABORT_WINDOW);
        *last = Some(now);
        if self.allow_skip.load(Ordering::Relaxed) && spaced_out {
            self.skip.store(true, Ordering::SeqCst);
        } else {
            self.abort.store(true, Ordering::SeqCst);
        }
    }

    /// Request a full abort directly.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// True once an abort has been requested.
    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// True while a skip of the current input is pending.
    pub fn skip_requested(&self) -> bool {
        self.skip.load(Ordering::SeqCst)
    }

    /// Acknowledge a pending skip.
    pub fn clear_skip(&self) {
        self.skip.store(false, Ordering::SeqCst);
    }
}
