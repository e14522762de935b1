//! Encoder decoder with offset-calibration and direction-find routines.
//!
//! Estimates come from the shared rotor model. The calibration routines
//! are tick-driven state machines: the supervisor forwards their
//! excitation commands to the motor from inside the control-loop
//! scaffold, one command per measurement tick.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use foc_common::axis::config::EncoderConfig;
use foc_common::axis::error::{AxisError, EncoderError};
use foc_common::config::{ConfigError, Validate};
use foc_common::math::wrap_pm_pi;
use tracing::{debug, info};

use crate::axis::Axis;
use crate::bus::RotorSim;
use crate::shared::AxisShared;

/// Minimum rotor travel for a successful direction find, as a fraction
/// of one mechanical revolution.
const DIR_FIND_MIN_TRAVEL_FRAC: f32 = 1.0 / 32.0;

pub struct Encoder {
    pub config: EncoderConfig,
    shared: Arc<AxisShared>,
    rotor: Arc<RotorSim>,
    error: EncoderError,
    pos_estimate: f32,
    vel_estimate: f32,
    phase: f32,
    phase_offset: f32,
    index_found: bool,
    is_ready: bool,
    idx_subscribed: bool,
    last_mech_pos: f32,
    have_last: bool,
}

impl Encoder {
    pub fn new(config: EncoderConfig, shared: Arc<AxisShared>, rotor: Arc<RotorSim>) -> Self {
        Self {
            config,
            shared,
            rotor,
            error: EncoderError::empty(),
            pos_estimate: 0.0,
            vel_estimate: 0.0,
            phase: 0.0,
            phase_offset: 0.0,
            index_found: false,
            is_ready: false,
            idx_subscribed: false,
            last_mech_pos: 0.0,
            have_last: false,
        }
    }

    pub fn init(&mut self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    #[inline]
    pub fn pos_estimate(&self) -> f32 {
        self.pos_estimate
    }

    #[inline]
    pub fn vel_estimate(&self) -> f32 {
        self.vel_estimate
    }

    /// Electrical phase, valid once `is_ready`.
    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    #[inline]
    pub fn index_found(&self) -> bool {
        self.index_found
    }

    /// Arm or disarm index-pulse detection.
    pub fn set_idx_subscribe(&mut self, subscribe: bool) {
        self.idx_subscribed = subscribe;
    }

    fn set_error(&mut self, e: EncoderError) {
        self.error.insert(e);
        self.shared.latch_error(AxisError::ENCODER_FAILED);
    }

    #[inline]
    pub fn error(&self) -> EncoderError {
        self.error
    }

    /// Raw electrical phase with no offset applied. Used by the offset
    /// calibration routine.
    fn raw_elec_phase(&self) -> f32 {
        let pole_pairs = self.shared.pole_pairs.load(Ordering::Relaxed) as f32;
        wrap_pm_pi(self.rotor.mech_pos.load() * pole_pairs)
    }

    /// Per-tick estimate update. Must be safe to call every tick.
    pub fn update(&mut self) -> bool {
        let mech_pos = self.rotor.mech_pos.load();
        let cpr = self.config.cpr as f32;

        self.pos_estimate = mech_pos / TAU * cpr;
        self.vel_estimate = self.rotor.mech_vel.load() / TAU * cpr;

        if self.idx_subscribed && self.have_last {
            // The index pulse sits at every mechanical revolution boundary.
            let crossed =
                (self.last_mech_pos / TAU).floor() != (mech_pos / TAU).floor();
            if crossed {
                self.index_found = true;
                self.idx_subscribed = false;
                debug!(axis = self.shared.id, "encoder index found");
            }
        }
        self.last_mech_pos = mech_pos;
        self.have_last = true;

        let pole_pairs = self.shared.pole_pairs.load(Ordering::Relaxed) as f32;
        self.phase = wrap_pm_pi(mech_pos * pole_pairs - self.phase_offset);

        if !self.error.is_empty() {
            self.shared.latch_error(AxisError::ENCODER_FAILED);
            return false;
        }
        true
    }

    /// Per-tick self check; propagates any latched encoder fault.
    pub fn do_checks(&mut self) -> bool {
        if !self.error.is_empty() {
            self.shared.latch_error(AxisError::ENCODER_FAILED);
            return false;
        }
        true
    }

    fn apply_offset_calibration(&mut self, offset: f32) {
        self.phase_offset = offset;
        self.is_ready = true;
        debug!(axis = self.shared.id, offset, "encoder offset calibrated");
    }
}

// ─── Offset calibration routine ─────────────────────────────────────

/// One tick of a calibration routine: either an excitation command for
/// the motor, or completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalTick {
    /// Command the motor with this current at this electrical phase.
    Excite { current: f32, phase: f32 },
    /// The routine has finished; consult its result.
    Finished,
}

/// Sweeps the electrical phase forward and back over
/// `calib_scan_distance` and averages the offset between the commanded
/// phase and the encoder's raw phase.
pub struct OffsetCalibration {
    ticks_total: u32,
    tick: u32,
    scan_omega: f32,
    excitation_current: f32,
    phase: f32,
    err_acc: f64,
    samples: u32,
    succeeded: bool,
    dt: f32,
}

impl OffsetCalibration {
    pub fn new(config: &EncoderConfig, excitation_current: f32, dt: f32) -> Self {
        let duration = config.calib_scan_distance / config.calib_scan_omega;
        Self {
            ticks_total: (duration / dt).ceil().max(1.0) as u32,
            tick: 0,
            scan_omega: config.calib_scan_omega,
            excitation_current,
            phase: 0.0,
            err_acc: 0.0,
            samples: 0,
            succeeded: false,
            dt,
        }
    }

    pub fn tick(&mut self, encoder: &mut Encoder) -> CalTick {
        if self.tick >= self.ticks_total {
            if self.samples == 0 {
                encoder.set_error(EncoderError::NO_RESPONSE);
            } else {
                let offset = wrap_pm_pi((self.err_acc / self.samples as f64) as f32);
                encoder.apply_offset_calibration(offset);
                self.succeeded = true;
            }
            return CalTick::Finished;
        }

        // Forward for the first half of the scan, back for the second.
        let dir = if self.tick * 2 < self.ticks_total {
            1.0
        } else {
            -1.0
        };
        self.phase = wrap_pm_pi(self.phase + dir * self.scan_omega * self.dt);
        self.err_acc += wrap_pm_pi(encoder.raw_elec_phase() - self.phase) as f64;
        self.samples += 1;
        self.tick += 1;

        CalTick::Excite {
            current: self.excitation_current,
            phase: self.phase,
        }
    }

    #[inline]
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }
}

// ─── Direction find routine ─────────────────────────────────────────

/// Sweeps the electrical phase in the positive direction and reports
/// which way the rotor moved, or fails when it did not move.
pub struct DirectionFind {
    ticks_total: u32,
    tick: u32,
    scan_omega: f32,
    excitation_current: f32,
    phase: f32,
    start_pos: Option<f32>,
    result: Option<i32>,
    dt: f32,
}

impl DirectionFind {
    pub fn new(config: &EncoderConfig, excitation_current: f32, dt: f32) -> Self {
        let duration = config.calib_scan_distance / config.calib_scan_omega;
        Self {
            ticks_total: (duration / dt).ceil().max(1.0) as u32,
            tick: 0,
            scan_omega: config.calib_scan_omega,
            excitation_current,
            phase: 0.0,
            start_pos: None,
            result: None,
            dt,
        }
    }

    pub fn tick(&mut self, encoder: &mut Encoder) -> CalTick {
        if self.start_pos.is_none() {
            self.start_pos = Some(encoder.pos_estimate());
        }
        if self.tick >= self.ticks_total {
            let moved = encoder.pos_estimate() - self.start_pos.unwrap_or(0.0);
            let min_travel = encoder.config.cpr as f32 * DIR_FIND_MIN_TRAVEL_FRAC;
            if moved >= min_travel {
                self.result = Some(1);
            } else if moved <= -min_travel {
                self.result = Some(-1);
            } else {
                encoder.set_error(EncoderError::NO_RESPONSE);
            }
            return CalTick::Finished;
        }

        self.phase = wrap_pm_pi(self.phase + self.scan_omega * self.dt);
        self.tick += 1;
        CalTick::Excite {
            current: self.excitation_current,
            phase: self.phase,
        }
    }

    /// Measured direction, once finished successfully.
    #[inline]
    pub fn result(&self) -> Option<i32> {
        self.result
    }
}

// ─── Blocking routine entry points ──────────────────────────────────
//
// Associated functions rather than methods: each routine drives the
// owning axis's control loop and motor, so it borrows the whole axis
// and reaches the encoder through it.

impl Encoder {
    /// Spin the rotor open loop until the index pulse is observed.
    ///
    /// Runs the axis's lock-in spin with the exit conditions overridden
    /// to "index found" only; an external state request still pre-empts.
    pub fn run_index_search(axis: &mut Axis) -> bool {
        axis.encoder.set_idx_subscribe(true);
        let mut config = axis.config.lockin.clone();
        config.finish_on_vel = false;
        config.finish_on_distance = false;
        config.finish_on_enc_idx = true;
        let spun = axis.run_lockin_spin(config);
        spun && axis.encoder.index_found()
    }

    /// Determine which way the motor turns relative to the encoder and
    /// store the result in the motor configuration.
    pub fn run_direction_find(axis: &mut Axis) -> bool {
        let mut find = DirectionFind::new(
            &axis.encoder.config,
            axis.motor.config.calibration_current,
            axis.dt,
        );
        axis.run_control_loop(|axis| match find.tick(&mut axis.encoder) {
            CalTick::Excite { current, phase } => axis.motor.update(current, phase, 0.0),
            CalTick::Finished => false,
        });
        match find.result() {
            Some(direction) if axis.check_for_errors() => {
                axis.motor.config.direction = direction;
                info!(axis = axis.shared.id, direction, "encoder direction found");
                true
            }
            _ => false,
        }
    }

    /// Measure the encoder-to-electrical-phase offset; on success the
    /// encoder becomes ready for closed-loop use.
    pub fn run_offset_calibration(axis: &mut Axis) -> bool {
        let mut cal = OffsetCalibration::new(
            &axis.encoder.config,
            axis.motor.config.calibration_current,
            axis.dt,
        );
        axis.run_control_loop(|axis| match cal.tick(&mut axis.encoder) {
            CalTick::Excite { current, phase } => axis.motor.update(current, phase, 0.0),
            CalTick::Finished => false,
        });
        cal.succeeded() && axis.check_for_errors()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_encoder() -> Encoder {
        let shared = Arc::new(AxisShared::new(0));
        shared.pole_pairs.store(7, Ordering::Relaxed);
        let rotor = Arc::new(RotorSim::new());
        let mut enc = Encoder::new(EncoderConfig::default(), shared, rotor);
        enc.init().unwrap();
        enc
    }

    #[test]
    fn estimates_track_rotor() {
        let mut enc = test_encoder();
        enc.rotor.mech_pos.store(TAU / 2.0);
        enc.rotor.mech_vel.store(TAU);
        assert!(enc.update());
        assert!((enc.pos_estimate() - 4096.0).abs() < 0.5);
        assert!((enc.vel_estimate() - 8192.0).abs() < 0.5);
    }

    #[test]
    fn index_detected_only_while_subscribed() {
        let mut enc = test_encoder();
        enc.update();
        enc.rotor.mech_pos.store(TAU * 1.5);
        enc.update();
        assert!(!enc.index_found(), "not subscribed, no index");

        enc.set_idx_subscribe(true);
        enc.rotor.mech_pos.store(TAU * 2.5);
        enc.update();
        assert!(enc.index_found());
    }

    #[test]
    fn offset_calibration_converges() {
        let mut enc = test_encoder();
        // Rotor parked away from electrical zero.
        enc.rotor.mech_pos.store(0.03);
        enc.update();

        let mut cal = OffsetCalibration::new(&enc.config, 10.0, 1.0 / 8000.0);
        loop {
            match cal.tick(&mut enc) {
                CalTick::Excite { current, phase } => {
                    // Ideal rotor: tracks the commanded phase exactly.
                    assert!(current > 0.0);
                    let pp = 7.0;
                    enc.rotor.mech_pos.store(phase / pp);
                    enc.update();
                }
                CalTick::Finished => break,
            }
        }
        assert!(cal.succeeded());
        assert!(enc.is_ready());
        // With a perfectly tracking rotor the residual offset is small.
        enc.update();
        assert!(enc.phase().abs() < 0.3, "phase = {}", enc.phase());
    }

    #[test]
    fn direction_find_positive() {
        let mut enc = test_encoder();
        enc.update();
        let mut find = DirectionFind::new(&enc.config, 10.0, 1.0 / 8000.0);
        // Emulate the rotor tracking the swept phase: accumulate the
        // wrapped phase deltas into the unbounded mechanical position.
        let mut prev_phase = 0.0f32;
        loop {
            match find.tick(&mut enc) {
                CalTick::Excite { phase, .. } => {
                    let dmech = wrap_pm_pi(phase - prev_phase) / 7.0;
                    prev_phase = phase;
                    enc.rotor.advance(dmech, 0.0);
                    enc.update();
                }
                CalTick::Finished => break,
            }
        }
        assert_eq!(find.result(), Some(1));
        assert!(enc.error().is_empty());
    }

    #[test]
    fn direction_find_fails_without_movement() {
        let mut enc = test_encoder();
        enc.update();
        let mut find = DirectionFind::new(&enc.config, 10.0, 1.0 / 8000.0);
        loop {
            match find.tick(&mut enc) {
                CalTick::Excite { .. } => {
                    enc.update(); // rotor never moves
                }
                CalTick::Finished => break,
            }
        }
        assert_eq!(find.result(), None);
        assert!(enc.error().contains(EncoderError::NO_RESPONSE));
    }
}
