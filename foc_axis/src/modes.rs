//! Control-mode loop runners: closed-loop, sensorless, open-loop, idle.

use std::f32::consts::TAU;
use std::sync::atomic::Ordering;

use foc_common::axis::error::AxisError;
use foc_common::axis::state::AxisState;
use foc_common::math::wrap_pm_pi;

use crate::axis::Axis;
use crate::components::safety_critical_disarm_motor_pwm;

impl Axis {
    /// Encoder-fed closed-loop control.
    pub(crate) fn run_closed_loop_control_loop(&mut self) -> bool {
        // Prime the setpoint with the current position so engagement is
        // transient-free.
        let pos = self.encoder.pos_estimate();
        self.controller.set_pos_setpoint(pos);
        self.set_step_dir_active(self.config.enable_step_dir);

        self.run_control_loop(|axis| {
            let pos = axis.encoder.pos_estimate();
            let vel = axis.encoder.vel_estimate();
            let Some(current_setpoint) = axis.controller.update(pos, vel, &mut axis.trap) else {
                axis.shared.latch_error(AxisError::CONTROLLER_FAILED);
                return false;
            };
            let cpr = axis.encoder.config.cpr as f32;
            let pole_pairs = axis.motor.config.pole_pairs as f32;
            let phase_vel = TAU * vel / cpr * pole_pairs;
            axis.motor
                .update(current_setpoint, axis.encoder.phase(), phase_vel)
        });

        self.set_step_dir_active(false);
        self.check_for_errors()
    }

    /// Estimator-fed control without an encoder. Position control modes
    /// are rejected: there is no absolute reference.
    pub(crate) fn run_sensorless_control_loop(&mut self) -> bool {
        self.run_control_loop(|axis| {
            if axis.controller.config.control_mode.is_position_based() {
                axis.shared
                    .latch_error(AxisError::POS_CTRL_DURING_SENSORLESS);
                return false;
            }
            let pll_pos = axis.sensorless_estimator.pll_pos();
            let vel_estimate = axis.sensorless_estimator.vel_estimate();
            let Some(current_setpoint) =
                axis.controller.update(pll_pos, vel_estimate, &mut axis.trap)
            else {
                axis.shared.latch_error(AxisError::CONTROLLER_FAILED);
                return false;
            };
            axis.motor.update(
                current_setpoint,
                axis.sensorless_estimator.phase(),
                vel_estimate,
            )
        });
        self.check_for_errors()
    }

    /// Setpoint-driven open-loop control. With `phase_locked` set, the
    /// phase setpoint is copied from the sibling axis instead of being
    /// integrated locally.
    pub(crate) fn run_open_loop_control_loop(&mut self) -> bool {
        self.set_step_dir_active(self.config.enable_step_dir);

        self.run_control_loop(|axis| {
            let (next_phase, phase_vel);
            if !axis.motor.config.phase_locked {
                let pole_pairs = axis.motor.config.pole_pairs as f32;
                phase_vel = TAU * axis.controller.vel_setpoint() * pole_pairs;
                next_phase = wrap_pm_pi(axis.motor.phase_setpoint() + phase_vel * axis.dt);
            } else {
                let Some(sibling) = axis.sibling.as_ref() else {
                    axis.shared.latch_error(AxisError::INVALID_STATE);
                    return false;
                };
                if sibling.current_state() != AxisState::OpenLoopControl {
                    axis.shared.latch_error(AxisError::INVALID_STATE);
                    return false;
                }
                let sibling_pole_pairs = sibling.pole_pairs.load(Ordering::Relaxed) as f32;
                phase_vel = TAU * sibling.vel_setpoint.load() * sibling_pole_pairs;
                next_phase = sibling.phase_setpoint.load();
            }
            axis.motor.set_phase_setpoint(next_phase);
            axis.motor
                .update(axis.controller.current_setpoint(), next_phase, phase_vel)
        });

        self.set_step_dir_active(false);
        self.check_for_errors()
    }

    /// Disarmed wait. The only state that tolerates missed measurement
    /// ticks; leaves only on an external request (or shutdown).
    pub(crate) fn run_idle_loop(&mut self) -> bool {
        safety_critical_disarm_motor_pwm(&mut self.motor);
        while !self.shared.request_pending() && !self.shared.shutdown_requested() {
            // Trivial ticks: estimators, checks and the request poll
            // still run in the scaffold.
            self.run_control_loop(|_| true);
        }
        self.check_for_errors()
    }
}
