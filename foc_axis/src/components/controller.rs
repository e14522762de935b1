//! Position/velocity controller with anticogging support.
//!
//! The position setpoint lives in the shared block because the STEP edge
//! callback increments it from interrupt context; everything else is
//! owned by the control thread.

use std::sync::Arc;

use foc_common::axis::config::ControllerConfig;
use foc_common::axis::error::{AxisError, ControllerError};
use foc_common::axis::state::ControlMode;
use foc_common::config::{ConfigError, Validate};
use tracing::debug;

use crate::components::trajectory::TrapezoidalTrajectory;
use crate::shared::AxisShared;

/// Anticogging state: a per-encoder-count feed-forward map.
#[derive(Debug, Default)]
pub struct Anticogging {
    /// Allocated once at control-thread start; `None` disables the
    /// feature (including after a failed allocation).
    pub cogging_map: Option<Vec<f32>>,
}

pub struct Controller {
    pub config: ControllerConfig,
    shared: Arc<AxisShared>,
    error: ControllerError,
    vel_setpoint: f32,
    current_setpoint: f32,
    vel_integrator_current: f32,
    pub anticogging: Anticogging,
    dt: f32,
}

impl Controller {
    pub fn new(config: ControllerConfig, shared: Arc<AxisShared>, dt: f32) -> Self {
        Self {
            config,
            shared,
            error: ControllerError::empty(),
            vel_setpoint: 0.0,
            current_setpoint: 0.0,
            vel_integrator_current: 0.0,
            anticogging: Anticogging::default(),
            dt,
        }
    }

    pub fn init(&mut self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    // ── Setpoints ──

    #[inline]
    pub fn pos_setpoint(&self) -> f32 {
        self.shared.pos_setpoint.load()
    }

    pub fn set_pos_setpoint(&mut self, pos: f32) {
        self.shared.pos_setpoint.store(pos);
    }

    #[inline]
    pub fn vel_setpoint(&self) -> f32 {
        self.vel_setpoint
    }

    pub fn set_vel_setpoint(&mut self, vel: f32) {
        self.vel_setpoint = vel;
        self.shared.vel_setpoint.store(vel);
    }

    #[inline]
    pub fn current_setpoint(&self) -> f32 {
        self.current_setpoint
    }

    pub fn set_current_setpoint(&mut self, current: f32) {
        self.current_setpoint = current;
    }

    #[inline]
    pub fn error(&self) -> ControllerError {
        self.error
    }

    fn set_error(&mut self, e: ControllerError) {
        self.error.insert(e);
        self.shared.latch_error(AxisError::CONTROLLER_FAILED);
    }

    /// Allocate the cogging map for `cpr` encoder counts. Allocation
    /// failure silently disables anticogging. The map is never resized
    /// afterwards, even if `cpr` changes at runtime.
    pub fn alloc_cogging_map(&mut self, cpr: usize) {
        let mut map: Vec<f32> = Vec::new();
        if map.try_reserve_exact(cpr).is_ok() {
            map.resize(cpr, 0.0);
            self.anticogging.cogging_map = Some(map);
        } else {
            debug!(axis = self.shared.id, cpr, "cogging map allocation failed");
            self.anticogging.cogging_map = None;
        }
    }

    fn anticogging_current(&self, pos_estimate: f32) -> f32 {
        if !self.config.anticogging_enabled {
            return 0.0;
        }
        match &self.anticogging.cogging_map {
            Some(map) if !map.is_empty() => {
                let len = map.len() as f32;
                let idx = pos_estimate.rem_euclid(len) as usize % map.len();
                map[idx]
            }
            _ => 0.0,
        }
    }

    /// One control update. Returns the current command for the motor, or
    /// `None` on internal failure.
    pub fn update(
        &mut self,
        pos_estimate: f32,
        vel_estimate: f32,
        trap: &mut TrapezoidalTrajectory,
    ) -> Option<f32> {
        if vel_estimate.abs() > self.config.vel_limit * self.config.vel_limit_tolerance {
            self.set_error(ControllerError::OVERSPEED);
            return None;
        }

        let mut vel_des = self.vel_setpoint;
        match self.config.control_mode {
            ControlMode::VoltageControl | ControlMode::CurrentControl => {
                // Torque passthrough: the cascade is bypassed.
                if !self.current_setpoint.is_finite() {
                    self.set_error(ControllerError::INVALID_SETPOINT);
                    return None;
                }
                return Some(self.current_setpoint + self.anticogging_current(pos_estimate));
            }
            ControlMode::VelocityControl => {}
            ControlMode::PositionControl => {
                vel_des += self.config.pos_gain * (self.pos_setpoint() - pos_estimate);
            }
            ControlMode::TrajectoryControl => {
                let goal = self.pos_setpoint();
                // Re-plan when the goal moves or no profile is active.
                if trap.goal().map_or(!trap.active(), |g| g != goal) && goal != pos_estimate {
                    trap.plan(goal, pos_estimate);
                }
                let s = trap.step(self.dt);
                let (traj_pos, traj_vel) = if s.done { (goal, 0.0) } else { (s.pos, s.vel) };
                vel_des += traj_vel + self.config.pos_gain * (traj_pos - pos_estimate);
            }
        }

        vel_des = vel_des.clamp(-self.config.vel_limit, self.config.vel_limit);
        let vel_err = vel_des - vel_estimate;
        let mut current =
            self.config.vel_gain * vel_err + self.vel_integrator_current;
        self.vel_integrator_current += self.config.vel_integrator_gain * self.dt * vel_err;
        current += self.anticogging_current(pos_estimate);

        if !current.is_finite() {
            self.set_error(ControllerError::INVALID_SETPOINT);
            return None;
        }
        Some(current)
    }

    /// Zero the integrating state (entering a new control session).
    pub fn reset(&mut self) {
        self.vel_integrator_current = 0.0;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use foc_common::axis::config::TrapConfig;

    fn test_controller(config: ControllerConfig) -> (Controller, TrapezoidalTrajectory) {
        let shared = Arc::new(AxisShared::new(0));
        let mut ctrl = Controller::new(config, shared, 1.0 / 8000.0);
        ctrl.init().unwrap();
        (ctrl, TrapezoidalTrajectory::new(TrapConfig::default()))
    }

    #[test]
    fn position_error_produces_current() {
        let (mut ctrl, mut trap) = test_controller(ControllerConfig::default());
        ctrl.set_pos_setpoint(100.0);
        let current = ctrl.update(0.0, 0.0, &mut trap).unwrap();
        assert!(current > 0.0, "positive position error → positive current");

        ctrl.set_pos_setpoint(-100.0);
        ctrl.reset();
        let current = ctrl.update(0.0, 0.0, &mut trap).unwrap();
        assert!(current < 0.0);
    }

    #[test]
    fn velocity_mode_ignores_position() {
        let (mut ctrl, mut trap) = test_controller(ControllerConfig {
            control_mode: ControlMode::VelocityControl,
            ..Default::default()
        });
        ctrl.set_pos_setpoint(1.0e6);
        ctrl.set_vel_setpoint(100.0);
        let at_setpoint = ctrl.update(0.0, 100.0, &mut trap).unwrap();
        assert!(at_setpoint.abs() < 1e-3);
    }

    #[test]
    fn current_mode_is_passthrough() {
        let (mut ctrl, mut trap) = test_controller(ControllerConfig {
            control_mode: ControlMode::CurrentControl,
            ..Default::default()
        });
        ctrl.set_current_setpoint(3.5);
        assert_eq!(ctrl.update(0.0, 0.0, &mut trap), Some(3.5));
    }

    #[test]
    fn overspeed_fails_update() {
        let (mut ctrl, mut trap) = test_controller(ControllerConfig {
            vel_limit: 100.0,
            vel_limit_tolerance: 1.2,
            ..Default::default()
        });
        assert!(ctrl.update(0.0, 500.0, &mut trap).is_none());
        assert!(ctrl.error().contains(ControllerError::OVERSPEED));
    }

    #[test]
    fn trajectory_mode_tracks_profile() {
        let (mut ctrl, mut trap) = test_controller(ControllerConfig {
            control_mode: ControlMode::TrajectoryControl,
            ..Default::default()
        });
        ctrl.set_pos_setpoint(1000.0);
        let first = ctrl.update(0.0, 0.0, &mut trap).unwrap();
        assert!(trap.active());
        assert!(first.is_finite());
    }

    #[test]
    fn anticogging_adds_map_entry() {
        let (mut ctrl, mut trap) = test_controller(ControllerConfig {
            control_mode: ControlMode::CurrentControl,
            anticogging_enabled: true,
            ..Default::default()
        });
        ctrl.alloc_cogging_map(16);
        if let Some(map) = ctrl.anticogging.cogging_map.as_mut() {
            map[3] = 0.5;
        }
        ctrl.set_current_setpoint(1.0);
        assert_eq!(ctrl.update(3.2, 0.0, &mut trap), Some(1.5));
        // Off-map positions wrap modulo the map length.
        assert_eq!(ctrl.update(19.2, 0.0, &mut trap), Some(1.5));
    }

    #[test]
    fn cogging_map_allocated_lazily() {
        let (mut ctrl, _) = test_controller(ControllerConfig::default());
        assert!(ctrl.anticogging.cogging_map.is_none());
        ctrl.alloc_cogging_map(8192);
        assert_eq!(ctrl.anticogging.cogging_map.as_ref().unwrap().len(), 8192);
    }
}
