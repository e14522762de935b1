//! Tick watchdog.
//!
//! A decrementing counter fed by external actors (communication layer,
//! CLI) and decremented once per control tick by the scaffold. Reaching
//! zero is reported to the caller, which latches
//! `WATCHDOG_TIMER_EXPIRED` and aborts the running task.

use std::sync::atomic::{AtomicU32, Ordering};

/// Watchdog counters. Atomic so `feed` may be called from any thread
/// while the control thread decrements.
#[derive(Debug)]
pub struct Watchdog {
    /// Ticks loaded on every feed; 0 means disabled.
    reset_value: AtomicU32,
    /// Ticks remaining until expiry.
    current_value: AtomicU32,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            reset_value: AtomicU32::new(0),
            current_value: AtomicU32::new(0),
        }
    }

    /// Reload the counter to its full value.
    pub fn feed(&self) {
        self.current_value
            .store(self.reset_value.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Decrement once. Returns false exactly when the watchdog has
    /// expired; the counter never underflows.
    pub fn check(&self) -> bool {
        if self.reset_value.load(Ordering::Relaxed) == 0 {
            return true;
        }
        self.current_value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                if v > 0 {
                    Some(v - 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Derive the reset value from a timeout in seconds at the given
    /// tick rate, then feed to avoid an instant expiry on
    /// reconfiguration. Non-positive timeouts disable the watchdog;
    /// overflowing products clamp to `u32::MAX`.
    pub fn update_settings(&self, timeout_s: f32, current_meas_hz: u32) {
        let reset = if !(timeout_s > 0.0) {
            0
        } else {
            let ticks = timeout_s as f64 * current_meas_hz as f64;
            if ticks >= u32::MAX as f64 {
                u32::MAX
            } else {
                ticks as u32
            }
        };
        self.reset_value.store(reset, Ordering::Relaxed);
        self.feed();
    }

    /// True when a zero reset value disables the watchdog.
    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.reset_value.load(Ordering::Relaxed) == 0
    }

    #[inline]
    pub fn reset_value(&self) -> u32 {
        self.reset_value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn current_value(&self) -> u32 {
        self.current_value.load(Ordering::Relaxed)
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
