//! Trapezoidal trajectory planner.
//!
//! Plans rest-to-rest moves under velocity and acceleration limits and
//! is sampled once per tick by the controller's trajectory mode.

use foc_common::axis::config::TrapConfig;
use foc_common::config::{ConfigError, Validate};

/// One sampled point of an active profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajStep {
    /// Position setpoint [counts].
    pub pos: f32,
    /// Velocity feed-forward [counts/s].
    pub vel: f32,
    /// True once the profile has been fully traversed.
    pub done: bool,
}

#[derive(Debug, Clone, Copy)]
struct Profile {
    start_pos: f32,
    goal: f32,
    sign: f32,
    accel: f32,
    decel: f32,
    cruise_vel: f32,
    t_accel: f32,
    t_cruise: f32,
    t_decel: f32,
}

impl Profile {
    fn total_time(&self) -> f32 {
        self.t_accel + self.t_cruise + self.t_decel
    }
}

pub struct TrapezoidalTrajectory {
    pub config: TrapConfig,
    profile: Option<Profile>,
    t: f32,
}

impl TrapezoidalTrajectory {
    pub fn new(config: TrapConfig) -> Self {
        Self {
            config,
            profile: None,
            t: 0.0,
        }
    }

    pub fn init(&mut self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    /// True while a planned profile is being traversed.
    #[inline]
    pub fn active(&self) -> bool {
        self.profile.is_some()
    }

    /// Goal of the active profile, if any.
    pub fn goal(&self) -> Option<f32> {
        self.profile.map(|p| p.goal)
    }

    /// Plan a rest-to-rest move from `start_pos` to `goal`.
    pub fn plan(&mut self, goal: f32, start_pos: f32) {
        let distance = goal - start_pos;
        if distance == 0.0 {
            self.profile = None;
            return;
        }
        let sign = distance.signum();
        let d = distance.abs();
        let accel = self.config.accel_limit;
        let decel = self.config.decel_limit;

        // Peak velocity of the triangular profile for this distance.
        let v_peak = (2.0 * d * accel * decel / (accel + decel)).sqrt();
        let cruise_vel = v_peak.min(self.config.vel_limit);

        let t_accel = cruise_vel / accel;
        let t_decel = cruise_vel / decel;
        let d_ramps = 0.5 * cruise_vel * (t_accel + t_decel);
        let t_cruise = ((d - d_ramps) / cruise_vel).max(0.0);

        self.profile = Some(Profile {
            start_pos,
            goal,
            sign,
            accel,
            decel,
            cruise_vel,
            t_accel,
            t_cruise,
            t_decel,
        });
        self.t = 0.0;
    }

    /// Advance the profile by one tick and sample it.
    pub fn step(&mut self, dt: f32) -> TrajStep {
        let Some(p) = self.profile else {
            return TrajStep {
                pos: 0.0,
                vel: 0.0,
                done: true,
            };
        };
        self.t += dt;
        let t = self.t;

        if t >= p.total_time() {
            self.profile = None;
            return TrajStep {
                pos: p.goal,
                vel: 0.0,
                done: true,
            };
        }

        let (dist, vel) = if t < p.t_accel {
            (0.5 * p.accel * t * t, p.accel * t)
        } else if t < p.t_accel + p.t_cruise {
            let tc = t - p.t_accel;
            (
                0.5 * p.cruise_vel * p.t_accel + p.cruise_vel * tc,
                p.cruise_vel,
            )
        } else {
            let td = t - p.t_accel - p.t_cruise;
            let d_before =
                0.5 * p.cruise_vel * p.t_accel + p.cruise_vel * p.t_cruise;
            (
                d_before + p.cruise_vel * td - 0.5 * p.decel * td * td,
                p.cruise_vel - p.decel * td,
            )
        };

        TrajStep {
            pos: p.start_pos + p.sign * dist,
            vel: p.sign * vel,
            done: false,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
