//! Supervisor state enums.
//!
//! All enums use `#[repr(u8)]` so they can be published through atomic
//! words and read by external observers without locking.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Top-level axis supervisor state.
///
/// `Undefined` doubles as the empty value of the request mailbox and the
/// terminator of the task chain. `StartupSequence` and
/// `FullCalibrationSequence` are composite requests — they are expanded
/// into a task chain and never dispatched themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AxisState {
    /// No state / empty request slot / chain terminator.
    Undefined = 0,
    /// Disarmed wait; the only state tolerant of missed measurement ticks.
    Idle = 1,
    /// Composite: configured calibration steps, then configured control mode.
    StartupSequence = 2,
    /// Composite: every calibration step, then idle.
    FullCalibrationSequence = 3,
    /// Measure motor phase resistance and inductance.
    MotorCalibration = 4,
    /// Spin until the encoder index pulse is observed.
    EncoderIndexSearch = 5,
    /// Determine the motor direction relative to the encoder.
    EncoderDirFind = 6,
    /// Measure the encoder-to-electrical phase offset.
    EncoderOffsetCalibration = 7,
    /// Open-loop rotor lock-in spin.
    LockinSpin = 8,
    /// Estimator-fed control without an encoder.
    SensorlessControl = 9,
    /// Encoder-fed closed-loop control.
    ClosedLoopControl = 10,
    /// Setpoint-driven open-loop control.
    OpenLoopControl = 11,
    /// Electrical PWM test pattern, no motion intended.
    PwmTest = 12,
}

impl AxisState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Undefined),
            1 => Some(Self::Idle),
            2 => Some(Self::StartupSequence),
            3 => Some(Self::FullCalibrationSequence),
            4 => Some(Self::MotorCalibration),
            5 => Some(Self::EncoderIndexSearch),
            6 => Some(Self::EncoderDirFind),
            7 => Some(Self::EncoderOffsetCalibration),
            8 => Some(Self::LockinSpin),
            9 => Some(Self::SensorlessControl),
            10 => Some(Self::ClosedLoopControl),
            11 => Some(Self::OpenLoopControl),
            12 => Some(Self::PwmTest),
            _ => None,
        }
    }

    /// States that refuse to run while `motor.config.direction == 0`.
    ///
    /// Index search is direction-guarded separately (only when the search
    /// is configured unidirectional).
    #[inline]
    pub const fn requires_direction(&self) -> bool {
        matches!(
            self,
            Self::LockinSpin
                | Self::SensorlessControl
                | Self::ClosedLoopControl
                | Self::OpenLoopControl
        )
    }

    /// States during which the step/dir input may be active.
    #[inline]
    pub const fn allows_step_dir(&self) -> bool {
        matches!(self, Self::ClosedLoopControl | Self::OpenLoopControl)
    }
}

impl Default for AxisState {
    fn default() -> Self {
        Self::Undefined
    }
}

impl FromStr for AxisState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "undefined" => Ok(Self::Undefined),
            "idle" => Ok(Self::Idle),
            "startup_sequence" => Ok(Self::StartupSequence),
            "full_calibration_sequence" => Ok(Self::FullCalibrationSequence),
            "motor_calibration" => Ok(Self::MotorCalibration),
            "encoder_index_search" => Ok(Self::EncoderIndexSearch),
            "encoder_dir_find" => Ok(Self::EncoderDirFind),
            "encoder_offset_calibration" => Ok(Self::EncoderOffsetCalibration),
            "lockin_spin" => Ok(Self::LockinSpin),
            "sensorless_control" => Ok(Self::SensorlessControl),
            "closed_loop_control" => Ok(Self::ClosedLoopControl),
            "open_loop_control" => Ok(Self::OpenLoopControl),
            "pwm_test" => Ok(Self::PwmTest),
            other => Err(format!("unknown axis state: {other}")),
        }
    }
}

/// Phase of the open-loop lock-in spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LockinState {
    /// Not spinning.
    Inactive = 0,
    /// Current ramp, rotor being pulled into lock.
    Ramp = 1,
    /// Velocity ramp at constant current.
    Accelerate = 2,
    /// Constant-velocity cruise until an exit condition fires.
    ConstVel = 3,
}

impl LockinState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Inactive),
            1 => Some(Self::Ramp),
            2 => Some(Self::Accelerate),
            3 => Some(Self::ConstVel),
            _ => None,
        }
    }
}

impl Default for LockinState {
    fn default() -> Self {
        Self::Inactive
    }
}

/// Controller operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ControlMode {
    /// Direct voltage command.
    VoltageControl = 0,
    /// Direct current (torque) command.
    CurrentControl = 1,
    /// Velocity loop.
    VelocityControl = 2,
    /// Position loop over the velocity loop.
    PositionControl = 3,
    /// Position loop fed by the trapezoidal planner.
    TrajectoryControl = 4,
}

impl ControlMode {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::VoltageControl),
            1 => Some(Self::CurrentControl),
            2 => Some(Self::VelocityControl),
            3 => Some(Self::PositionControl),
            4 => Some(Self::TrajectoryControl),
            _ => None,
        }
    }

    /// True for modes that close a position loop.
    ///
    /// These are rejected during sensorless control — there is no
    /// absolute position reference without an encoder.
    #[inline]
    pub const fn is_position_based(&self) -> bool {
        matches!(self, Self::PositionControl | Self::TrajectoryControl)
    }
}

impl Default for ControlMode {
    fn default() -> Self {
        Self::PositionControl
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
