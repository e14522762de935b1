//! Open-loop lock-in spin.
//!
//! Three sequential phases driven by the control-loop scaffold: ramp the
//! current into the rotor, accelerate the commanded field, then hold a
//! constant velocity until an exit condition fires. Also used (with
//! overridden exit conditions) by the encoder index search and as the
//! spin-up for sensorless control.

use foc_common::axis::config::LockinConfig;
use foc_common::axis::state::LockinState;
use foc_common::math::wrap_pm_pi;
use tracing::debug;

use crate::axis::Axis;

/// Exit-condition evaluation shared by the spin phases.
///
/// `vel_override` forces the velocity criterion during the acceleration
/// phase so the spin always advances to constant velocity.
fn spin_done(
    config: &LockinConfig,
    vel: f32,
    distance: f32,
    index_found: bool,
    vel_override: bool,
) -> bool {
    let mut done = false;
    if config.finish_on_vel || vel_override {
        done = done || vel.abs() >= config.vel.abs();
    }
    if config.finish_on_distance {
        done = done || distance.abs() >= config.finish_distance.abs();
    }
    if config.finish_on_enc_idx {
        done = done || index_found;
    }
    done
}

impl Axis {
    /// Run the full lock-in spin with the given parameters.
    ///
    /// Returns true when the spin finished (or was pre-empted by an
    /// external request) with no errors latched.
    pub(crate) fn run_lockin_spin(&mut self, config: LockinConfig) -> bool {
        // Phase 1: spiral up the current for a soft rotor lock-in.
        self.shared.set_lockin_state(LockinState::Ramp);
        let mut x = 0.0f32;
        self.run_control_loop(|axis| {
            let phase = wrap_pm_pi(config.ramp_distance * x);
            let current = config.current * x;
            x += axis.dt / config.ramp_time;
            if !axis.motor.update(current, phase, 0.0) {
                return false;
            }
            x < 1.0
        });

        if !self.check_for_errors() {
            self.shared.set_lockin_state(LockinState::Inactive);
            return false;
        }

        let mut distance = config.ramp_distance;
        let mut phase = wrap_pm_pi(distance);
        let mut vel = config.ramp_distance / config.ramp_time;

        // Phase 2: accelerate. The velocity criterion is forced so this
        // phase always terminates.
        self.shared.set_lockin_state(LockinState::Accelerate);
        self.run_control_loop(|axis| {
            vel += config.accel * axis.dt;
            distance += vel * axis.dt;
            phase = wrap_pm_pi(phase + vel * axis.dt);
            if !axis.motor.update(config.current, phase, vel) {
                return false;
            }
            !spin_done(&config, vel, distance, axis.encoder.index_found(), true)
        });

        if !self.encoder.index_found() {
            self.encoder.set_idx_subscribe(true);
        }

        // Phase 3: constant velocity, unless an exit condition already
        // holds. Snap to the configured velocity to drop the integration
        // error accumulated during acceleration.
        if self.check_for_errors()
            && !spin_done(&config, vel, distance, self.encoder.index_found(), false)
        {
            self.shared.set_lockin_state(LockinState::ConstVel);
            vel = config.vel;
            debug!(axis = self.shared.id, vel, "lock-in constant velocity");
            self.run_control_loop(|axis| {
                distance += vel * axis.dt;
                phase = wrap_pm_pi(phase + vel * axis.dt);
                if !axis.motor.update(config.current, phase, vel) {
                    return false;
                }
                !spin_done(&config, vel, distance, axis.encoder.index_found(), false)
            });
        }

        self.shared.set_lockin_state(LockinState::Inactive);
        self.check_for_errors()
    }
}
