//! Control-loop scaffold and per-tick fault checks.
//!
//! The scaffold is the sole point at which the control thread blocks.
//! Within a tick the order is fixed: wait → pre-tick estimator updates →
//! tick body → post-tick checks → watchdog → request poll. Tick bodies
//! must not block; they run between two current-measurement interrupts.

use std::sync::atomic::Ordering;

use foc_common::axis::error::AxisError;
use foc_common::axis::state::AxisState;

use crate::axis::Axis;
use crate::components::safety_critical_disarm_motor_pwm;

impl Axis {
    /// Run tick bodies until one of the termination conditions fires:
    ///
    /// - the signal wait times out (fatal outside `Idle`: disarm PWM and
    ///   latch `CURRENT_MEASUREMENT_TIMEOUT`; in `Idle` the miss is
    ///   tolerated and only the request poll runs),
    /// - a pre-tick estimator update latches an error,
    /// - the tick body returns false,
    /// - post-tick checks find any latched error,
    /// - the watchdog expires,
    /// - an external state request or shutdown is pending.
    ///
    /// Errors are left in the register; callers consult
    /// [`Axis::check_for_errors`] for the task verdict.
    pub(crate) fn run_control_loop<F>(&mut self, mut tick: F)
    where
        F: FnMut(&mut Axis) -> bool,
    {
        loop {
            if !self.shared.meas_signal.wait(self.meas_timeout) {
                if self.shared.current_state() != AxisState::Idle {
                    // The interrupt source is dead; float the phases.
                    safety_critical_disarm_motor_pwm(&mut self.motor);
                    self.shared
                        .latch_error(AxisError::CURRENT_MEASUREMENT_TIMEOUT);
                    break;
                }
                // Idle tolerates missed ticks; fall through to the poll.
            } else {
                self.shared.loop_counter.fetch_add(1, Ordering::Relaxed);

                let encoder_ok = self.encoder.update();
                let estimator_ok = self.sensorless_estimator.update();
                if !encoder_ok || !estimator_ok {
                    break;
                }

                if !tick(self) {
                    break;
                }

                if !self.do_checks() {
                    break;
                }

                if !self.shared.watchdog.check() {
                    self.shared.latch_error(AxisError::WATCHDOG_TIMER_EXPIRED);
                    break;
                }
            }

            if self.shared.request_pending() || self.shared.shutdown_requested() {
                break;
            }
        }
    }

    /// Axis-level checks plus sub-component self checks. Runs every tick
    /// regardless of state. Returns true when no error is latched.
    ///
    /// The bus-voltage comparisons are written negated so a NaN reading
    /// fails both bounds.
    pub(crate) fn do_checks(&mut self) -> bool {
        if self.bus.brake_resistor_enabled.load(Ordering::SeqCst)
            && !self.bus.brake_resistor_armed.load(Ordering::SeqCst)
        {
            self.shared.latch_error(AxisError::BRAKE_RESISTOR_DISARMED);
        }
        if self.shared.current_state() != AxisState::Idle && !self.motor.is_armed() {
            // The motor got disarmed by something other than the idle loop.
            self.shared.latch_error(AxisError::MOTOR_DISARMED);
        }

        let vbus = self.bus.vbus_voltage.load();
        if !(vbus >= self.bus.undervoltage_trip_level) {
            self.shared.latch_error(AxisError::DC_BUS_UNDER_VOLTAGE);
        }
        if !(vbus <= self.bus.overvoltage_trip_level) {
            self.shared.latch_error(AxisError::DC_BUS_OVER_VOLTAGE);
        }

        self.motor.do_checks();
        self.encoder.do_checks();

        self.shared.check_for_errors()
    }
}

// ─── Realtime thread setup ──────────────────────────────────────────

/// Stack bytes the tick path may touch between two measurement
/// interrupts: the scaffold, one tick body and the sub-component
/// updates, with headroom. Faulted in up front so no tick ever takes a
/// page fault.
#[cfg(feature = "rt")]
const TICK_STACK_BUDGET: usize = 64 * 1024;

#[cfg(feature = "rt")]
const PAGE_SIZE: usize = 4096;

/// Error during realtime thread setup.
#[derive(Debug, thiserror::Error)]
#[error("rt setup failed: {0}")]
pub struct RtSetupError(String);

/// Prepare the calling control thread for hard-deadline ticking: pin all
/// memory, fault in the tick path's stack budget, optionally pin to a
/// core and raise to SCHED_FIFO. A page fault or a migration mid-tick
/// can cost more than a whole tick period, which the scaffold would then
/// report as a missed measurement.
#[cfg(feature = "rt")]
pub fn rt_setup(cpu_core: Option<usize>, rt_priority: Option<i32>) -> Result<(), RtSetupError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::sys::mman::{mlockall, MlockallFlags};
    use nix::unistd::Pid;
    use tracing::debug;

    // Current pages plus everything allocated later (the cogging map is
    // allocated after this point, at thread start).
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RtSetupError(format!("locking pages: {e}")))?;

    // One volatile write per page of the tick stack budget.
    let mut stack = [0u8; TICK_STACK_BUDGET];
    let mut offset = 0;
    while offset < stack.len() {
        unsafe { core::ptr::write_volatile(&mut stack[offset], 1) };
        offset += PAGE_SIZE;
    }
    core::hint::black_box(&stack);

    if let Some(cpu) = cpu_core {
        let mut cpuset = CpuSet::new();
        cpuset
            .set(cpu)
            .map_err(|e| RtSetupError(format!("cpu core {cpu} out of range: {e}")))?;
        sched_setaffinity(Pid::from_raw(0), &cpuset)
            .map_err(|e| RtSetupError(format!("pinning to cpu core {cpu}: {e}")))?;
        debug!(cpu, "control thread pinned");
    }

    if let Some(priority) = rt_priority {
        let param = libc::sched_param {
            sched_priority: priority,
        };
        if unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } != 0 {
            return Err(RtSetupError(format!(
                "SCHED_FIFO priority {priority}: {}",
                std::io::Error::last_os_error()
            )));
        }
        debug!(priority, "control thread elevated to SCHED_FIFO");
    }

    Ok(())
}

/// Simulation mode: the control thread runs at normal priority and the
/// tick deadline is best-effort.
#[cfg(not(feature = "rt"))]
pub fn rt_setup(_cpu_core: Option<usize>, _rt_priority: Option<i32>) -> Result<(), RtSetupError> {
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rt_setup_without_feature_is_noop() {
        #[cfg(not(feature = "rt"))]
        {
            rt_setup(Some(0), Some(80)).unwrap();
            rt_setup(None, None).unwrap();
        }
    }
}
