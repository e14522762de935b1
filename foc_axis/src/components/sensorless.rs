//! Sensorless rotor estimator.
//!
//! A PLL tracking the electrical flux angle. Outputs are transiently
//! valid from the first tick; there is no readiness gate like the
//! encoder's.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use foc_common::axis::error::{AxisError, SensorlessError};
use foc_common::config::ConfigError;
use foc_common::math::wrap_pm_pi;

use crate::bus::RotorSim;
use crate::shared::AxisShared;

/// PLL tracking bandwidth [rad/s].
const PLL_BANDWIDTH: f32 = 500.0;

pub struct SensorlessEstimator {
    shared: Arc<AxisShared>,
    rotor: Arc<RotorSim>,
    error: SensorlessError,
    pll_pos: f32,
    vel_estimate: f32,
    phase: f32,
    pll_kp: f32,
    pll_ki: f32,
    dt: f32,
}

impl SensorlessEstimator {
    pub fn new(shared: Arc<AxisShared>, rotor: Arc<RotorSim>, dt: f32) -> Self {
        let pll_kp = 2.0 * PLL_BANDWIDTH;
        Self {
            shared,
            rotor,
            error: SensorlessError::empty(),
            pll_pos: 0.0,
            vel_estimate: 0.0,
            phase: 0.0,
            pll_kp,
            pll_ki: 0.25 * pll_kp * pll_kp,
            dt,
        }
    }

    pub fn init(&mut self) -> Result<(), ConfigError> {
        // The PLL must not overshoot at the configured tick rate.
        if self.pll_kp * self.dt >= 1.0 {
            return Err(ConfigError::ValidationError(
                "sensorless PLL bandwidth too high for the tick rate".to_string(),
            ));
        }
        Ok(())
    }

    /// Estimated electrical position [rad], PLL-filtered, wrapped.
    #[inline]
    pub fn pll_pos(&self) -> f32 {
        self.pll_pos
    }

    /// Estimated electrical velocity [rad/s].
    #[inline]
    pub fn vel_estimate(&self) -> f32 {
        self.vel_estimate
    }

    /// Flux angle [rad].
    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline]
    pub fn error(&self) -> SensorlessError {
        self.error
    }

    fn set_error(&mut self, e: SensorlessError) {
        self.error.insert(e);
        self.shared
            .latch_error(AxisError::SENSORLESS_ESTIMATOR_FAILED);
    }

    /// Per-tick estimate update.
    pub fn update(&mut self) -> bool {
        let pole_pairs = self.shared.pole_pairs.load(Ordering::Relaxed) as f32;
        let observed_phase = wrap_pm_pi(self.rotor.mech_pos.load() * pole_pairs);
        self.phase = observed_phase;

        let delta = wrap_pm_pi(observed_phase - self.pll_pos);
        self.pll_pos = wrap_pm_pi(self.pll_pos + (self.vel_estimate + self.pll_kp * delta) * self.dt);
        self.vel_estimate += self.pll_ki * delta * self.dt;

        if !self.vel_estimate.is_finite() || !self.pll_pos.is_finite() {
            self.set_error(SensorlessError::UNSTABLE_GAIN);
            return false;
        }
        true
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
