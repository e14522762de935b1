//! Motor driver: arming, modulation updates, calibration, PWM test.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use foc_common::axis::config::MotorConfig;
use foc_common::axis::error::{AxisError, MotorError};
use foc_common::config::{ConfigError, Validate};
use foc_common::consts::CURRENT_LIM_MARGIN;
use foc_common::math::wrap_pm_pi;
use tracing::{debug, warn};

use crate::axis::Axis;
use crate::bus::{DcBus, RotorSim};
use crate::shared::AxisShared;

/// Excitation below this magnitude does not hold the rotor [A].
const MIN_EXCITATION_CURRENT: f32 = 0.01;

/// Duration of one calibration measurement pass [s].
const CALIBRATION_DURATION_S: f32 = 0.2;

/// Plausible phase resistance range for a hobby-to-industrial BLDC [Ω].
const PHASE_RESISTANCE_RANGE: (f32, f32) = (0.005, 1.0);
/// Plausible phase inductance range [H].
const PHASE_INDUCTANCE_RANGE: (f32, f32) = (2.0e-6, 2.5e-3);

/// Electrical sweep rate of the PWM test pattern [rad/s].
const PWM_TEST_OMEGA: f32 = 2.0;

struct CalibrationRun {
    ticks_total: u32,
    tick: u32,
    resistance_acc: f64,
    inductance_acc: f64,
}

/// Simulated gate-driver + current-controller front end.
pub struct Motor {
    pub config: MotorConfig,
    shared: Arc<AxisShared>,
    bus: Arc<DcBus>,
    rotor: Arc<RotorSim>,
    error: MotorError,
    is_armed: bool,
    is_calibrated: bool,
    phase_setpoint: f32,
    last_phase: f32,
    test_phase: f32,
    dt: f32,
    calibration: Option<CalibrationRun>,
}

impl Motor {
    pub fn new(
        config: MotorConfig,
        shared: Arc<AxisShared>,
        bus: Arc<DcBus>,
        rotor: Arc<RotorSim>,
        dt: f32,
    ) -> Self {
        Self {
            config,
            shared,
            bus,
            rotor,
            error: MotorError::empty(),
            is_armed: false,
            is_calibrated: false,
            phase_setpoint: 0.0,
            last_phase: 0.0,
            test_phase: 0.0,
            dt,
            calibration: None,
        }
    }

    pub fn init(&mut self) -> Result<(), ConfigError> {
        self.config.validate()?;
        self.shared
            .pole_pairs
            .store(self.config.pole_pairs, Ordering::Relaxed);
        Ok(())
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.is_armed
    }

    #[inline]
    pub fn is_calibrated(&self) -> bool {
        self.is_calibrated
    }

    #[inline]
    pub fn error(&self) -> MotorError {
        self.error
    }

    #[inline]
    pub fn phase_setpoint(&self) -> f32 {
        self.phase_setpoint
    }

    /// Set the electrical phase setpoint directly (open-loop control
    /// integrates it outside the modulation update).
    pub fn set_phase_setpoint(&mut self, phase: f32) {
        self.phase_setpoint = phase;
        self.shared.phase_setpoint.store(phase);
    }

    fn set_error(&mut self, e: MotorError) {
        self.error.insert(e);
        self.shared.latch_error(AxisError::MOTOR_FAILED);
    }

    /// Enable PWM output. Fails while a motor fault is latched.
    pub fn arm(&mut self) -> bool {
        if !self.error.is_empty() {
            warn!(axis = self.shared.id, error = ?self.error, "arm refused");
            return false;
        }
        self.is_armed = true;
        self.bus.enable_pwm();
        true
    }

    /// Disable PWM output through the normal path.
    pub fn disarm(&mut self) {
        self.is_armed = false;
        self.bus.force_pwm_off();
    }

    /// One modulation update: command `current_setpoint` at electrical
    /// `phase`, feed-forward `phase_vel`. Returns false when modulation
    /// is rejected.
    pub fn update(&mut self, current_setpoint: f32, phase: f32, phase_vel: f32) -> bool {
        if !current_setpoint.is_finite() || !phase.is_finite() || !phase_vel.is_finite() {
            self.set_error(MotorError::MODULATION_MAGNITUDE);
            return false;
        }
        if current_setpoint.abs() > self.config.current_lim * CURRENT_LIM_MARGIN {
            self.set_error(MotorError::CURRENT_LIMIT_VIOLATION);
            return false;
        }
        if !self.is_armed || !self.bus.pwm_enabled() {
            return false;
        }

        let pole_pairs = self.config.pole_pairs as f32;
        if current_setpoint.abs() > MIN_EXCITATION_CURRENT {
            // Stiff synchronous follow: the excited rotor tracks the
            // commanded electrical phase.
            let dphase = wrap_pm_pi(phase - self.last_phase);
            self.rotor.advance(dphase / pole_pairs, phase_vel / pole_pairs);
        } else {
            self.rotor.coast();
        }
        self.last_phase = phase;
        self.phase_setpoint = phase;
        self.shared.phase_setpoint.store(phase);
        self.shared.current_command.store(current_setpoint);
        true
    }

    // ── Calibration ──

    /// Begin the resistance/inductance measurement pass.
    pub fn start_calibration(&mut self) {
        let ticks_total = (CALIBRATION_DURATION_S / self.dt).ceil().max(1.0) as u32;
        self.calibration = Some(CalibrationRun {
            ticks_total,
            tick: 0,
            resistance_acc: 0.0,
            inductance_acc: 0.0,
        });
        debug!(axis = self.shared.id, ticks_total, "motor calibration started");
    }

    /// One calibration tick. Returns false once the pass is finished or
    /// has failed; results are latched on the motor.
    pub fn calibration_tick(&mut self) -> bool {
        let Some(mut run) = self.calibration.take() else {
            return false;
        };

        // Hold the rotor at phase 0 with the calibration current and
        // sample the line measurement.
        if !self.update(self.config.calibration_current, 0.0, 0.0) {
            return false;
        }
        run.resistance_acc += self.config.phase_resistance as f64;
        run.inductance_acc += self.config.phase_inductance as f64;
        run.tick += 1;

        if run.tick < run.ticks_total {
            self.calibration = Some(run);
            return true;
        }

        let resistance = (run.resistance_acc / run.ticks_total as f64) as f32;
        let inductance = (run.inductance_acc / run.ticks_total as f64) as f32;

        if !(PHASE_RESISTANCE_RANGE.0..=PHASE_RESISTANCE_RANGE.1).contains(&resistance) {
            self.set_error(MotorError::PHASE_RESISTANCE_OUT_OF_RANGE);
            return false;
        }
        if !(PHASE_INDUCTANCE_RANGE.0..=PHASE_INDUCTANCE_RANGE.1).contains(&inductance) {
            self.set_error(MotorError::PHASE_INDUCTANCE_OUT_OF_RANGE);
            return false;
        }

        self.config.phase_resistance = resistance;
        self.config.phase_inductance = inductance;
        self.is_calibrated = true;
        debug!(
            axis = self.shared.id,
            resistance, inductance, "motor calibration complete"
        );
        false
    }

    // ── PWM test ──

    /// One tick of the electrical PWM test pattern: sweep the phase with
    /// zero current so no motion is produced.
    pub fn pwm_test_tick(&mut self) -> bool {
        self.test_phase = wrap_pm_pi(self.test_phase + PWM_TEST_OMEGA * self.dt);
        self.update(0.0, self.test_phase, 0.0)
    }

    /// Per-tick self check; propagates any latched motor fault.
    pub fn do_checks(&mut self) -> bool {
        if !self.error.is_empty() {
            self.shared.latch_error(AxisError::MOTOR_FAILED);
            return false;
        }
        true
    }
}

// ─── Blocking routine entry points ──────────────────────────────────
//
// Associated functions: both routines drive the owning axis's control
// loop, so they borrow the whole axis and reach the motor through it.

impl Motor {
    /// Measure phase resistance and inductance tick by tick; on success
    /// the motor is calibrated and the measured values land in its
    /// configuration.
    pub fn run_calibration(axis: &mut Axis) -> bool {
        axis.motor.start_calibration();
        axis.run_control_loop(|axis| axis.motor.calibration_tick());
        axis.motor.is_calibrated() && axis.check_for_errors()
    }

    /// Apply the electrical test pattern until an external request
    /// arrives.
    pub fn run_pwm_test(axis: &mut Axis) -> bool {
        axis.run_control_loop(|axis| axis.motor.pwm_test_tick());
        axis.check_for_errors()
    }
}

/// Kill PWM output at the hardware level, irrespective of the motor
/// state machine. The one safety-critical side effect of entering idle
/// or losing the measurement interrupt.
pub fn safety_critical_disarm_motor_pwm(motor: &mut Motor) {
    motor.is_armed = false;
    motor.bus.force_pwm_off();
    motor.rotor.coast();
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use foc_common::axis::config::BusConfig;

    fn test_motor(config: MotorConfig) -> Motor {
        let shared = Arc::new(AxisShared::new(0));
        let bus = Arc::new(DcBus::new(&BusConfig::default()));
        let rotor = Arc::new(RotorSim::new());
        let mut motor = Motor::new(config, shared, bus, rotor, 1.0 / 8000.0);
        motor.init().unwrap();
        motor
    }

    #[test]
    fn update_rejected_while_disarmed() {
        let mut motor = test_motor(MotorConfig::default());
        assert!(!motor.update(1.0, 0.0, 0.0));
        assert!(motor.error().is_empty());
    }

    #[test]
    fn update_drives_rotor_when_armed() {
        let mut motor = test_motor(MotorConfig::default());
        assert!(motor.arm());
        assert!(motor.update(5.0, 0.1, 10.0));
        let pp = motor.config.pole_pairs as f32;
        assert!((motor.rotor.mech_pos.load() - 0.1 / pp).abs() < 1e-6);
        assert!((motor.rotor.mech_vel.load() - 10.0 / pp).abs() < 1e-6);
    }

    #[test]
    fn zero_current_coasts() {
        let mut motor = test_motor(MotorConfig::default());
        motor.arm();
        motor.update(5.0, 0.1, 10.0);
        assert!(motor.update(0.0, 0.2, 10.0));
        assert_eq!(motor.rotor.mech_vel.load(), 0.0);
    }

    #[test]
    fn current_limit_violation_latches() {
        let mut motor = test_motor(MotorConfig::default());
        motor.arm();
        assert!(!motor.update(100.0, 0.0, 0.0));
        assert!(motor.error().contains(MotorError::CURRENT_LIMIT_VIOLATION));
        assert!(motor
            .shared
            .error()
            .contains(AxisError::MOTOR_FAILED));
        // Arming is refused with a latched fault.
        assert!(!motor.arm());
    }

    #[test]
    fn non_finite_command_rejected() {
        let mut motor = test_motor(MotorConfig::default());
        motor.arm();
        assert!(!motor.update(f32::NAN, 0.0, 0.0));
        assert!(motor.error().contains(MotorError::MODULATION_MAGNITUDE));
    }

    #[test]
    fn calibration_measures_and_completes() {
        let mut motor = test_motor(MotorConfig::default());
        motor.arm();
        motor.start_calibration();
        let mut guard = 0;
        while motor.calibration_tick() {
            guard += 1;
            assert!(guard < 100_000, "calibration never finished");
        }
        assert!(motor.is_calibrated());
        assert!(motor.error().is_empty());
    }

    #[test]
    fn calibration_rejects_out_of_range_resistance() {
        let mut motor = test_motor(MotorConfig {
            phase_resistance: 50.0,
            ..Default::default()
        });
        motor.arm();
        motor.start_calibration();
        while motor.calibration_tick() {}
        assert!(!motor.is_calibrated());
        assert!(motor
            .error()
            .contains(MotorError::PHASE_RESISTANCE_OUT_OF_RANGE));
    }

    #[test]
    fn safety_disarm_overrides_everything() {
        let mut motor = test_motor(MotorConfig::default());
        motor.arm();
        assert!(motor.bus.pwm_enabled());
        safety_critical_disarm_motor_pwm(&mut motor);
        assert!(!motor.is_armed());
        assert!(!motor.bus.pwm_enabled());
    }
}
