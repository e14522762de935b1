//! DC bus, brake resistor and simulated rotor.
//!
//! The bus is the board-level hardware shared by both axes: the measured
//! bus voltage, the brake resistor arming state and the hardware PWM
//! output gate. The rotor model is a stiff synchronous follower — while
//! excitation current is applied, the rotor tracks the commanded
//! electrical phase. That is the behaviour lock-in, calibration and
//! index search rely on; torque-driven dynamics are not modelled.

use std::sync::atomic::{AtomicBool, Ordering};

use foc_common::axis::config::BusConfig;

use crate::shared::AtomicF32;

/// Board-level power state shared by all axes.
#[derive(Debug)]
pub struct DcBus {
    /// Last measured bus voltage [V]. Written by the supply/ADC side.
    pub vbus_voltage: AtomicF32,
    /// Hardware-level PWM output gate. Cleared by the safety disarm path.
    pwm_enabled: AtomicBool,
    /// A brake resistor is fitted (configuration).
    pub brake_resistor_enabled: AtomicBool,
    /// The brake resistor chopper is armed.
    pub brake_resistor_armed: AtomicBool,
    /// Undervoltage trip level [V].
    pub undervoltage_trip_level: f32,
    /// Overvoltage trip level [V].
    pub overvoltage_trip_level: f32,
}

impl DcBus {
    pub fn new(config: &BusConfig) -> Self {
        Self {
            vbus_voltage: AtomicF32::new(config.nominal_voltage),
            pwm_enabled: AtomicBool::new(false),
            brake_resistor_enabled: AtomicBool::new(config.brake_resistor_enabled),
            // A fitted brake resistor starts armed; faults disarm it.
            brake_resistor_armed: AtomicBool::new(config.brake_resistor_enabled),
            undervoltage_trip_level: config.dc_bus_undervoltage_trip_level,
            overvoltage_trip_level: config.dc_bus_overvoltage_trip_level,
        }
    }

    #[inline]
    pub fn pwm_enabled(&self) -> bool {
        self.pwm_enabled.load(Ordering::SeqCst)
    }

    /// Enable PWM output. Called by the motor arm path.
    pub(crate) fn enable_pwm(&self) {
        self.pwm_enabled.store(true, Ordering::SeqCst);
    }

    /// Kill PWM output at the hardware level, regardless of what any
    /// higher layer believes the motor state to be.
    pub fn force_pwm_off(&self) {
        self.pwm_enabled.store(false, Ordering::SeqCst);
    }
}

/// Simulated rotor shared by the motor (driver) and the encoder /
/// sensorless estimator (observers).
#[derive(Debug, Default)]
pub struct RotorSim {
    /// Mechanical position [rad], unbounded.
    pub mech_pos: AtomicF32,
    /// Mechanical velocity [rad/s].
    pub mech_vel: AtomicF32,
}

impl RotorSim {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the rotor by a mechanical position delta at the given
    /// mechanical velocity. Called from the motor's modulation update.
    pub(crate) fn advance(&self, dpos: f32, vel: f32) {
        self.mech_pos.fetch_add(dpos);
        self.mech_vel.store(vel);
    }

    /// Drop to standstill (excitation removed).
    pub(crate) fn coast(&self) {
        self.mech_vel.store(0.0);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
