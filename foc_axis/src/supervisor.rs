//! Top-level state machine: request expansion, dispatch, task chain.
//!
//! The control thread loops forever: load the task chain when a request
//! is pending, dispatch the front state, then advance the chain on
//! success or abort to idle on failure. All dispatch precondition
//! failures route through one invalid-state branch.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use foc_common::axis::config::AxisConfig;
use foc_common::axis::error::AxisError;
use foc_common::axis::state::AxisState;
use foc_common::consts::TASK_CHAIN_CAPACITY;
use tracing::{debug, info, warn};

use crate::axis::Axis;
use crate::components::{safety_critical_disarm_motor_pwm, Encoder, Motor};
use crate::shared::AxisShared;

/// Expand an external request into the ordered task chain.
///
/// Composite requests unfold into their configured steps; anything else
/// becomes `{request, Idle}`. `use_index` gates the index search inside
/// the composite sequences.
pub fn expand_request(
    request: AxisState,
    config: &AxisConfig,
    use_index: bool,
) -> heapless::Vec<AxisState, TASK_CHAIN_CAPACITY> {
    let mut chain: heapless::Vec<AxisState, TASK_CHAIN_CAPACITY> = heapless::Vec::new();
    match request {
        AxisState::StartupSequence => {
            if config.startup_motor_calibration {
                let _ = chain.push(AxisState::MotorCalibration);
            }
            if config.startup_encoder_index_search && use_index {
                let _ = chain.push(AxisState::EncoderIndexSearch);
            }
            if config.startup_encoder_offset_calibration {
                let _ = chain.push(AxisState::EncoderOffsetCalibration);
            }
            if config.startup_closed_loop_control {
                let _ = chain.push(AxisState::ClosedLoopControl);
            } else if config.startup_sensorless_control {
                let _ = chain.push(AxisState::SensorlessControl);
            }
            let _ = chain.push(AxisState::Idle);
        }
        AxisState::FullCalibrationSequence => {
            let _ = chain.push(AxisState::MotorCalibration);
            if use_index {
                let _ = chain.push(AxisState::EncoderIndexSearch);
            }
            let _ = chain.push(AxisState::EncoderOffsetCalibration);
            let _ = chain.push(AxisState::Idle);
        }
        AxisState::Undefined => {}
        other => {
            let _ = chain.push(other);
            let _ = chain.push(AxisState::Idle);
        }
    }
    chain
}

/// Resets the thread-identity flag when the control thread exits, so the
/// measurement interrupt stops signalling a dead thread.
struct ThreadReadyGuard(Arc<AxisShared>);

impl Drop for ThreadReadyGuard {
    fn drop(&mut self) {
        self.0.set_thread_ready(false);
    }
}

impl Axis {
    /// Shared invalid-state branch for every dispatch guard.
    fn invalid_state(&mut self) -> bool {
        self.shared.latch_error(AxisError::INVALID_STATE);
        false
    }

    /// Dispatch one task-chain state. Returns the task verdict.
    fn dispatch(&mut self, state: AxisState) -> bool {
        if state.requires_direction() && self.motor.config.direction == 0 {
            return self.invalid_state();
        }

        match state {
            AxisState::PwmTest => Motor::run_pwm_test(self),

            AxisState::MotorCalibration => Motor::run_calibration(self),

            AxisState::EncoderIndexSearch => {
                // A unidirectional search additionally needs a known direction.
                if self.encoder.config.idx_search_unidirectional
                    && self.motor.config.direction == 0
                {
                    self.invalid_state()
                } else {
                    Encoder::run_index_search(self)
                }
            }

            AxisState::EncoderDirFind => Encoder::run_direction_find(self),

            AxisState::EncoderOffsetCalibration => Encoder::run_offset_calibration(self),

            AxisState::LockinSpin => self.run_lockin_spin(self.config.lockin.clone()),

            AxisState::SensorlessControl => {
                let mut status = self.run_lockin_spin(self.config.lockin.clone());
                if status {
                    // Seed the setpoint with the spin-up target so the
                    // hand-over is smooth.
                    self.controller.set_vel_setpoint(self.config.lockin.vel);
                    status = self.run_sensorless_control_loop();
                }
                status
            }

            AxisState::ClosedLoopControl => {
                if !self.encoder.is_ready() {
                    self.invalid_state()
                } else {
                    self.run_closed_loop_control_loop()
                }
            }

            AxisState::OpenLoopControl => self.run_open_loop_control_loop(),

            AxisState::Idle => {
                self.run_idle_loop();
                // Done idling: try to arm for whatever comes next.
                // Arming failure keeps the axis in idle.
                self.motor.arm()
            }

            AxisState::Undefined
            | AxisState::StartupSequence
            | AxisState::FullCalibrationSequence => self.invalid_state(),
        }
    }

    /// The control thread body: bootstrap, then the dispatch loop.
    pub fn run_state_machine_loop(mut self) {
        let _ready_guard = ThreadReadyGuard(self.shared.clone());

        if let Err(e) = crate::cycle::rt_setup(self.config.cpu_core, self.config.rt_priority) {
            warn!(axis = self.shared.id, error = %e, "rt setup failed, continuing unelevated");
        }

        // Wait until the spawner has published the thread identity;
        // before that the measurement interrupt will not signal us.
        while !self.shared.thread_ready() {
            if self.shared.shutdown_requested() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }

        // One-time allocation; the map is never resized, even if the
        // encoder CPR changes at runtime.
        let cpr = self.encoder.config.cpr as usize;
        self.controller.alloc_cogging_map(cpr);

        self.motor.arm();
        info!(axis = self.shared.id, "axis control thread running");

        loop {
            if self.shared.shutdown_requested() {
                break;
            }

            // Load the task chain if a request is pending.
            if let Some(request) = self.shared.take_request() {
                let chain = expand_request(request, &self.config, self.encoder.config.use_index);
                self.task_chain.load(&chain);
                self.shared.clear_error_bits(AxisError::INVALID_STATE);
                info!(
                    axis = self.shared.id,
                    ?request,
                    chain = ?self.task_chain.as_vec(),
                    "state request accepted"
                );
            }

            let state = self.task_chain.current();
            if state != self.shared.current_state() {
                info!(
                    axis = self.shared.id,
                    from = ?self.shared.current_state(),
                    to = ?state,
                    "state transition"
                );
            }
            self.shared.set_current_state(state);

            let status = self.dispatch(state);
            debug!(axis = self.shared.id, ?state, status, "task finished");

            if status {
                self.task_chain.advance();
            } else {
                self.task_chain.abort_to_idle();
            }
        }

        safety_critical_disarm_motor_pwm(&mut self.motor);
        info!(axis = self.shared.id, "axis control thread exiting");
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use AxisState::*;

    #[test]
    fn startup_with_all_flags_off_is_just_idle() {
        let config = AxisConfig::default();
        let chain = expand_request(StartupSequence, &config, false);
        assert_eq!(chain.as_slice(), &[Idle]);
    }

    #[test]
    fn startup_full_expansion() {
        let config = AxisConfig {
            startup_motor_calibration: true,
            startup_encoder_index_search: true,
            startup_encoder_offset_calibration: true,
            startup_closed_loop_control: true,
            ..Default::default()
        };
        let chain = expand_request(StartupSequence, &config, true);
        assert_eq!(
            chain.as_slice(),
            &[
                MotorCalibration,
                EncoderIndexSearch,
                EncoderOffsetCalibration,
                ClosedLoopControl,
                Idle
            ]
        );
    }

    #[test]
    fn startup_index_search_gated_on_use_index() {
        let config = AxisConfig {
            startup_encoder_index_search: true,
            ..Default::default()
        };
        let chain = expand_request(StartupSequence, &config, false);
        assert_eq!(chain.as_slice(), &[Idle]);
    }

    #[test]
    fn closed_loop_wins_over_sensorless() {
        let config = AxisConfig {
            startup_closed_loop_control: true,
            startup_sensorless_control: true,
            ..Default::default()
        };
        let chain = expand_request(StartupSequence, &config, false);
        assert_eq!(chain.as_slice(), &[ClosedLoopControl, Idle]);
    }

    #[test]
    fn startup_sensorless_only() {
        let config = AxisConfig {
            startup_sensorless_control: true,
            ..Default::default()
        };
        let chain = expand_request(StartupSequence, &config, false);
        assert_eq!(chain.as_slice(), &[SensorlessControl, Idle]);
    }

    #[test]
    fn full_calibration_expansion() {
        let config = AxisConfig::default();
        let with_index = expand_request(FullCalibrationSequence, &config, true);
        assert_eq!(
            with_index.as_slice(),
            &[
                MotorCalibration,
                EncoderIndexSearch,
                EncoderOffsetCalibration,
                Idle
            ]
        );

        let without_index = expand_request(FullCalibrationSequence, &config, false);
        assert_eq!(
            without_index.as_slice(),
            &[MotorCalibration, EncoderOffsetCalibration, Idle]
        );
    }

    #[test]
    fn plain_request_expands_to_state_then_idle() {
        let config = AxisConfig::default();
        let chain = expand_request(ClosedLoopControl, &config, false);
        assert_eq!(chain.as_slice(), &[ClosedLoopControl, Idle]);

        let chain = expand_request(Idle, &config, false);
        assert_eq!(chain.as_slice(), &[Idle, Idle]);
    }

    #[test]
    fn undefined_request_expands_empty() {
        let config = AxisConfig::default();
        let chain = expand_request(Undefined, &config, false);
        assert!(chain.is_empty());
    }
}
