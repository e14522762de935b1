//! Cross-thread observable state of one axis.
//!
//! Everything written by the control thread and read by external actors
//! (or vice versa) lives here as an atomic word. Sub-components hold an
//! `Arc<AxisShared>` as their non-owning back-reference to the axis;
//! external actors hold one through [`crate::AxisHandle`].

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use foc_common::axis::error::AxisError;
use foc_common::axis::state::{AxisState, LockinState};
use tracing::warn;

use crate::watchdog::Watchdog;

/// An `f32` stored in an atomic u32 bit pattern.
///
/// Needed for values written from interrupt context (the STEP edge
/// callback increments the position setpoint) while the control thread
/// reads and writes them every tick.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }

    /// Atomic read-modify-write addition.
    pub fn fetch_add(&self, delta: f32) -> f32 {
        let prev = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f32::from_bits(bits) + delta).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        f32::from_bits(prev)
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// One-shot wake-up raised by the current-measurement interrupt.
///
/// Set-only semantics: raising an already-raised signal coalesces into a
/// single wake-up, and the flag auto-clears when a waiter consumes it.
#[derive(Debug, Default)]
pub struct MeasSignal {
    raised: Mutex<bool>,
    cv: Condvar,
}

impl MeasSignal {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.raised.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Raise the signal. Safe from any thread; never blocks on a waiter.
    pub fn raise(&self) {
        let mut raised = self.lock();
        *raised = true;
        self.cv.notify_one();
    }

    /// Block until the signal is raised or `timeout` elapses.
    ///
    /// Consumes the signal on success.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut raised = self.lock();
        while !*raised {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _res) = self
                .cv
                .wait_timeout(raised, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            raised = guard;
        }
        *raised = false;
        true
    }
}

/// Atomically published state of one axis.
#[derive(Debug)]
pub struct AxisShared {
    /// Axis number, for log attribution only.
    pub id: u8,

    /// Sticky error register (`AxisError` bits).
    error: AtomicU32,
    /// Currently executing state. Written only by the control thread.
    current_state: AtomicU32,
    /// Single-slot request mailbox; `Undefined` means empty.
    requested_state: AtomicU32,
    /// Lock-in spin phase, for telemetry.
    lockin_state: AtomicU32,
    /// True from just after the control thread starts until it exits.
    /// The measurement interrupt must not signal while false.
    thread_ready: AtomicBool,
    /// Cooperative process-teardown request.
    shutdown: AtomicBool,
    /// Step/dir edge callbacks are live only while true.
    pub step_dir_active: AtomicBool,

    /// Controller position setpoint [counts]. Written by the control
    /// thread and by the STEP edge callback.
    pub pos_setpoint: AtomicF32,
    /// Controller velocity setpoint, published for the sibling axis and
    /// telemetry.
    pub vel_setpoint: AtomicF32,
    /// Motor electrical phase setpoint, published for the phase-locked
    /// sibling.
    pub phase_setpoint: AtomicF32,
    /// Last commanded current magnitude, for telemetry.
    pub current_command: AtomicF32,
    /// Motor pole pairs, published for the phase-locked sibling.
    pub pole_pairs: AtomicU32,

    /// Completed control ticks since thread start.
    pub loop_counter: AtomicU64,
    /// Control tick rate [Hz], for watchdog reconfiguration.
    pub current_meas_hz: AtomicU32,

    /// Tick watchdog; fed by external actors, checked by the scaffold.
    pub watchdog: Watchdog,
    /// Current-measurement wake-up.
    pub meas_signal: MeasSignal,
}

impl AxisShared {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            error: AtomicU32::new(0),
            current_state: AtomicU32::new(AxisState::Undefined as u32),
            requested_state: AtomicU32::new(AxisState::Undefined as u32),
            lockin_state: AtomicU32::new(LockinState::Inactive as u32),
            thread_ready: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            step_dir_active: AtomicBool::new(false),
            pos_setpoint: AtomicF32::default(),
            vel_setpoint: AtomicF32::default(),
            phase_setpoint: AtomicF32::default(),
            current_command: AtomicF32::default(),
            pole_pairs: AtomicU32::new(1),
            loop_counter: AtomicU64::new(0),
            current_meas_hz: AtomicU32::new(foc_common::consts::DEFAULT_CURRENT_MEAS_HZ),
            watchdog: Watchdog::new(),
            meas_signal: MeasSignal::default(),
        }
    }

    // ── Error register ──

    /// Latch error bits (sticky OR). Logs each newly set bit once.
    pub fn latch_error(&self, e: AxisError) {
        let prev = self.error.fetch_or(e.bits(), Ordering::SeqCst);
        let new_bits = e.bits() & !prev;
        if new_bits != 0 {
            warn!(
                axis = self.id,
                error = ?AxisError::from_bits_truncate(new_bits),
                "axis error latched"
            );
        }
    }

    #[inline]
    pub fn error(&self) -> AxisError {
        AxisError::from_bits_truncate(self.error.load(Ordering::SeqCst))
    }

    /// True when no error is latched.
    #[inline]
    pub fn check_for_errors(&self) -> bool {
        self.error.load(Ordering::SeqCst) == 0
    }

    /// Clear specific error bits.
    pub fn clear_error_bits(&self, e: AxisError) {
        self.error.fetch_and(!e.bits(), Ordering::SeqCst);
    }

    /// Clear the whole register (operator action).
    pub fn clear_errors(&self) {
        self.error.store(0, Ordering::SeqCst);
    }

    // ── State publication ──

    #[inline]
    pub fn current_state(&self) -> AxisState {
        AxisState::from_u8(self.current_state.load(Ordering::SeqCst) as u8)
            .unwrap_or(AxisState::Undefined)
    }

    /// Publish the executing state. Control thread only.
    pub(crate) fn set_current_state(&self, state: AxisState) {
        self.current_state.store(state as u32, Ordering::SeqCst);
    }

    #[inline]
    pub fn lockin_state(&self) -> LockinState {
        LockinState::from_u8(self.lockin_state.load(Ordering::SeqCst) as u8)
            .unwrap_or(LockinState::Inactive)
    }

    pub(crate) fn set_lockin_state(&self, state: LockinState) {
        self.lockin_state.store(state as u32, Ordering::SeqCst);
    }

    // ── Request mailbox ──

    /// Deposit a state request. Overwrites any pending request.
    pub fn request_state(&self, state: AxisState) {
        self.requested_state.store(state as u32, Ordering::SeqCst);
    }

    /// True when a request is pending. Does not consume it.
    #[inline]
    pub fn request_pending(&self) -> bool {
        self.requested_state.load(Ordering::SeqCst) != AxisState::Undefined as u32
    }

    /// Atomically take and clear the pending request, if any.
    ///
    /// The read-and-clear is a single `swap`, so a request deposited
    /// concurrently is either taken now or stays for the next poll.
    pub(crate) fn take_request(&self) -> Option<AxisState> {
        let raw = self
            .requested_state
            .swap(AxisState::Undefined as u32, Ordering::SeqCst);
        match AxisState::from_u8(raw as u8) {
            Some(AxisState::Undefined) | None => None,
            Some(state) => Some(state),
        }
    }

    // ── Thread identity / teardown ──

    #[inline]
    pub fn thread_ready(&self) -> bool {
        self.thread_ready.load(Ordering::SeqCst)
    }

    pub(crate) fn set_thread_ready(&self, ready: bool) {
        self.thread_ready.store(ready, Ordering::SeqCst);
    }

    /// Ask the control thread to exit after finishing the current task.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Unblock a scaffold stuck waiting for a dead measurement source.
        self.meas_signal.raise();
    }

    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    // ── Interrupt entry ──

    /// Current-measurement interrupt entry point.
    ///
    /// Only wakes the control thread while its identity flag is valid.
    pub fn signal_current_meas(&self) {
        if self.thread_ready() {
            self.meas_signal.raise();
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
