//! Axis and sub-component configuration records.
//!
//! All records are serde-loaded from TOML with per-field defaults, so a
//! partial file is always valid. Configuration is immutable during a
//! control tick and may be changed between ticks by external threads.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::axis::state::ControlMode;
use crate::config::{ConfigError, Validate};
use crate::consts::DEFAULT_CURRENT_MEAS_HZ;

// ─── Lock-in ────────────────────────────────────────────────────────

/// Open-loop lock-in spin parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockinConfig {
    /// Current magnitude at the end of the ramp [A].
    pub current: f32,
    /// Duration of the current ramp [s].
    pub ramp_time: f32,
    /// Electrical distance swept during the ramp [rad].
    pub ramp_distance: f32,
    /// Acceleration during the spin-up phase [rad/s²].
    pub accel: f32,
    /// Target electrical velocity [rad/s].
    pub vel: f32,
    /// Exit the constant-velocity phase once `|vel| >= |lockin.vel|`.
    pub finish_on_vel: bool,
    /// Exit once `|distance| >= |finish_distance|`.
    pub finish_on_distance: bool,
    /// Exit once the encoder index pulse has been observed.
    pub finish_on_enc_idx: bool,
    /// Electrical distance for the distance exit condition [rad].
    pub finish_distance: f32,
}

impl Default for LockinConfig {
    fn default() -> Self {
        Self {
            current: 10.0,
            ramp_time: 0.4,
            ramp_distance: PI,
            accel: 20.0,
            vel: 40.0,
            finish_on_vel: false,
            finish_on_distance: false,
            finish_on_enc_idx: false,
            finish_distance: 100.0 * 2.0 * PI,
        }
    }
}

impl Validate for LockinConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ramp_time > 0.0) {
            return Err(ConfigError::ValidationError(
                "lockin.ramp_time must be positive".to_string(),
            ));
        }
        for (name, v) in [
            ("lockin.current", self.current),
            ("lockin.ramp_distance", self.ramp_distance),
            ("lockin.accel", self.accel),
            ("lockin.vel", self.vel),
            ("lockin.finish_distance", self.finish_distance),
        ] {
            if !v.is_finite() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be finite"
                )));
            }
        }
        Ok(())
    }
}

// ─── Axis ───────────────────────────────────────────────────────────

/// Supervisor-level axis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    /// Run motor calibration during the startup sequence.
    pub startup_motor_calibration: bool,
    /// Run the encoder index search during startup (needs `use_index`).
    pub startup_encoder_index_search: bool,
    /// Run encoder offset calibration during startup.
    pub startup_encoder_offset_calibration: bool,
    /// Enter closed-loop control at the end of startup.
    pub startup_closed_loop_control: bool,
    /// Enter sensorless control at the end of startup
    /// (ignored when closed-loop startup is also set).
    pub startup_sensorless_control: bool,

    /// Enable the step/dir GPIO interface in the control states.
    pub enable_step_dir: bool,
    /// Encoder counts added to the position setpoint per STEP edge.
    pub counts_per_step: f32,
    /// GPIO number bound to STEP.
    pub step_gpio_num: u32,
    /// GPIO number bound to DIR.
    pub dir_gpio_num: u32,

    /// Watchdog timeout [s]; non-positive disables the watchdog.
    pub watchdog_timeout: f32,

    /// Current-measurement interrupt rate [Hz].
    pub current_meas_hz: u32,
    /// Signal-wait timeout [ms].
    pub current_meas_timeout_ms: u64,

    /// SCHED_FIFO priority for the control thread (effective only with
    /// the `rt` feature).
    pub rt_priority: Option<i32>,
    /// CPU core the control thread is pinned to (`rt` feature only).
    pub cpu_core: Option<usize>,

    /// Lock-in spin parameters.
    pub lockin: LockinConfig,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            startup_motor_calibration: false,
            startup_encoder_index_search: false,
            startup_encoder_offset_calibration: false,
            startup_closed_loop_control: false,
            startup_sensorless_control: false,
            enable_step_dir: false,
            counts_per_step: 2.0,
            step_gpio_num: 1,
            dir_gpio_num: 2,
            watchdog_timeout: 0.0,
            current_meas_hz: DEFAULT_CURRENT_MEAS_HZ,
            current_meas_timeout_ms: crate::consts::DEFAULT_CURRENT_MEAS_TIMEOUT_MS,
            rt_priority: None,
            cpu_core: None,
            lockin: LockinConfig::default(),
        }
    }
}

impl Validate for AxisConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.current_meas_hz == 0 {
            return Err(ConfigError::ValidationError(
                "current_meas_hz must be positive".to_string(),
            ));
        }
        if !self.counts_per_step.is_finite() {
            return Err(ConfigError::ValidationError(
                "counts_per_step must be finite".to_string(),
            ));
        }
        if self.watchdog_timeout.is_nan() {
            return Err(ConfigError::ValidationError(
                "watchdog_timeout must not be NaN".to_string(),
            ));
        }
        if self.enable_step_dir && self.step_gpio_num == self.dir_gpio_num {
            return Err(ConfigError::ValidationError(
                "step_gpio_num and dir_gpio_num must differ".to_string(),
            ));
        }
        self.lockin.validate()
    }
}

impl AxisConfig {
    /// Control tick period [s].
    #[inline]
    pub fn current_meas_period(&self) -> f32 {
        1.0 / self.current_meas_hz as f32
    }
}

// ─── Motor ──────────────────────────────────────────────────────────

/// Motor driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Rotation direction relative to the encoder: +1, -1, or 0 when not
    /// yet determined. Motion-producing states refuse to run at 0.
    pub direction: i32,
    /// Electrical-to-mechanical velocity multiplier.
    pub pole_pairs: u32,
    /// Copy the electrical phase setpoint from the sibling axis while in
    /// open-loop control.
    pub phase_locked: bool,
    /// Commanded-current limit [A].
    pub current_lim: f32,
    /// Excitation current used by calibration routines [A].
    pub calibration_current: f32,
    /// Phase resistance [Ω]; measured by motor calibration.
    pub phase_resistance: f32,
    /// Phase inductance [H]; measured by motor calibration.
    pub phase_inductance: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            direction: 0,
            pole_pairs: 7,
            phase_locked: false,
            current_lim: 10.0,
            calibration_current: 10.0,
            phase_resistance: 0.04,
            phase_inductance: 1.6e-5,
        }
    }
}

impl Validate for MotorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.pole_pairs == 0 {
            return Err(ConfigError::ValidationError(
                "motor.pole_pairs must be positive".to_string(),
            ));
        }
        if !(self.current_lim > 0.0) {
            return Err(ConfigError::ValidationError(
                "motor.current_lim must be positive".to_string(),
            ));
        }
        if !(self.direction == 0 || self.direction == 1 || self.direction == -1) {
            return Err(ConfigError::ValidationError(
                "motor.direction must be -1, 0 or 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Encoder ────────────────────────────────────────────────────────

/// Encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Counts per mechanical revolution.
    pub cpr: u32,
    /// The encoder has an index pulse worth searching for.
    pub use_index: bool,
    /// The index search must spin in the configured direction only.
    pub idx_search_unidirectional: bool,
    /// Electrical distance swept by the offset-calibration scan [rad].
    pub calib_scan_distance: f32,
    /// Scan angular velocity during offset calibration [rad/s].
    pub calib_scan_omega: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            cpr: 8192,
            use_index: false,
            idx_search_unidirectional: false,
            calib_scan_distance: 16.0 * PI,
            calib_scan_omega: 4.0 * PI,
        }
    }
}

impl Validate for EncoderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cpr == 0 {
            return Err(ConfigError::ValidationError(
                "encoder.cpr must be positive".to_string(),
            ));
        }
        if !(self.calib_scan_omega > 0.0) || !(self.calib_scan_distance > 0.0) {
            return Err(ConfigError::ValidationError(
                "encoder calibration scan parameters must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Controller ─────────────────────────────────────────────────────

/// Position/velocity controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Operating mode.
    pub control_mode: ControlMode,
    /// Position loop gain [(counts/s) / count].
    pub pos_gain: f32,
    /// Velocity loop gain [A / (counts/s)].
    pub vel_gain: f32,
    /// Velocity integrator gain [A / (counts/s) / s].
    pub vel_integrator_gain: f32,
    /// Velocity limit [counts/s].
    pub vel_limit: f32,
    /// Overspeed trip factor relative to `vel_limit`.
    pub vel_limit_tolerance: f32,
    /// Apply the cogging map when one is allocated.
    pub anticogging_enabled: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            control_mode: ControlMode::PositionControl,
            pos_gain: 20.0,
            vel_gain: 5.0e-4,
            vel_integrator_gain: 1.0e-3,
            vel_limit: 20_000.0,
            vel_limit_tolerance: 1.2,
            anticogging_enabled: false,
        }
    }
}

impl Validate for ControllerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.vel_limit > 0.0) {
            return Err(ConfigError::ValidationError(
                "controller.vel_limit must be positive".to_string(),
            ));
        }
        if !(self.vel_limit_tolerance >= 1.0) {
            return Err(ConfigError::ValidationError(
                "controller.vel_limit_tolerance must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Trajectory ─────────────────────────────────────────────────────

/// Trapezoidal trajectory planner limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapConfig {
    /// Cruise velocity limit [counts/s].
    pub vel_limit: f32,
    /// Acceleration limit [counts/s²].
    pub accel_limit: f32,
    /// Deceleration limit [counts/s²].
    pub decel_limit: f32,
}

impl Default for TrapConfig {
    fn default() -> Self {
        Self {
            vel_limit: 8_000.0,
            accel_limit: 2_000.0,
            decel_limit: 2_000.0,
        }
    }
}

impl Validate for TrapConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.vel_limit > 0.0) || !(self.accel_limit > 0.0) || !(self.decel_limit > 0.0) {
            return Err(ConfigError::ValidationError(
                "trap limits must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── DC bus ─────────────────────────────────────────────────────────

/// DC bus / board-level configuration shared by all axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Undervoltage trip level [V].
    pub dc_bus_undervoltage_trip_level: f32,
    /// Overvoltage trip level [V].
    pub dc_bus_overvoltage_trip_level: f32,
    /// A brake resistor is fitted and must be armed during operation.
    pub brake_resistor_enabled: bool,
    /// Nominal bus voltage used by the simulated supply [V].
    pub nominal_voltage: f32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dc_bus_undervoltage_trip_level: 8.0,
            dc_bus_overvoltage_trip_level: 56.0,
            brake_resistor_enabled: false,
            nominal_voltage: 24.0,
        }
    }
}

impl Validate for BusConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dc_bus_undervoltage_trip_level < self.dc_bus_overvoltage_trip_level) {
            return Err(ConfigError::ValidationError(
                "bus undervoltage trip must be below overvoltage trip".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Per-axis bundle ────────────────────────────────────────────────

/// Everything needed to build one axis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisUnitConfig {
    pub axis: AxisConfig,
    pub motor: MotorConfig,
    pub encoder: EncoderConfig,
    pub controller: ControllerConfig,
    pub trap: TrapConfig,
}

impl Validate for AxisUnitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.axis.validate()?;
        self.motor.validate()?;
        self.encoder.validate()?;
        self.controller.validate()?;
        self.trap.validate()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AxisUnitConfig::default().validate().unwrap();
        BusConfig::default().validate().unwrap();
    }

    #[test]
    fn startup_flags_default_off() {
        let cfg = AxisConfig::default();
        assert!(!cfg.startup_motor_calibration);
        assert!(!cfg.startup_encoder_index_search);
        assert!(!cfg.startup_encoder_offset_calibration);
        assert!(!cfg.startup_closed_loop_control);
        assert!(!cfg.startup_sensorless_control);
    }

    #[test]
    fn watchdog_default_disabled() {
        assert_eq!(AxisConfig::default().watchdog_timeout, 0.0);
    }

    #[test]
    fn zero_meas_rate_rejected() {
        let cfg = AxisConfig {
            current_meas_hz: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn clashing_step_dir_pins_rejected_when_enabled() {
        let cfg = AxisConfig {
            enable_step_dir: true,
            step_gpio_num: 3,
            dir_gpio_num: 3,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        // Same pins are fine while the interface is disabled.
        let cfg = AxisConfig {
            step_gpio_num: 3,
            dir_gpio_num: 3,
            ..Default::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn lockin_rejects_zero_ramp_time() {
        let cfg = LockinConfig {
            ramp_time: 0.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn motor_direction_range() {
        for d in [-1, 0, 1] {
            let cfg = MotorConfig {
                direction: d,
                ..Default::default()
            };
            cfg.validate().unwrap();
        }
        let cfg = MotorConfig {
            direction: 2,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bus_trip_ordering() {
        let cfg = BusConfig {
            dc_bus_undervoltage_trip_level: 60.0,
            dc_bus_overvoltage_trip_level: 56.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn current_meas_period() {
        let cfg = AxisConfig {
            current_meas_hz: 8000,
            ..Default::default()
        };
        assert!((cfg.current_meas_period() - 1.25e-4).abs() < 1e-9);
    }
}
