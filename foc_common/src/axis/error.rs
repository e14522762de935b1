//! Error bitflag registers for the axis and its sub-components.
//!
//! All registers use the `bitflags` crate. Axis errors are sticky: they
//! are latched with `|=` and cleared only by an explicit operator action.
//! The single exception is `INVALID_STATE`, which the supervisor clears
//! automatically whenever it accepts a new state request.

use bitflags::bitflags;

bitflags! {
    /// Axis-level error register, published through an atomic u32.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AxisError: u32 {
        /// A dispatch precondition was violated (zero direction, encoder
        /// not ready, wrong sibling state). Auto-cleared on the next
        /// accepted request.
        const INVALID_STATE               = 0x0001;
        /// DC bus voltage below the undervoltage trip level.
        const DC_BUS_UNDER_VOLTAGE        = 0x0002;
        /// DC bus voltage above the overvoltage trip level.
        const DC_BUS_OVER_VOLTAGE         = 0x0004;
        /// The current-measurement signal wait timed out outside idle.
        const CURRENT_MEASUREMENT_TIMEOUT = 0x0008;
        /// Brake resistor configured but not armed.
        const BRAKE_RESISTOR_DISARMED     = 0x0010;
        /// Motor found unarmed outside the idle loop.
        const MOTOR_DISARMED              = 0x0020;
        /// Motor sub-component reported a fault.
        const MOTOR_FAILED                = 0x0040;
        /// Sensorless estimator sub-component reported a fault.
        const SENSORLESS_ESTIMATOR_FAILED = 0x0080;
        /// Encoder sub-component reported a fault.
        const ENCODER_FAILED              = 0x0100;
        /// Controller update failed.
        const CONTROLLER_FAILED           = 0x0200;
        /// Position control mode requested while sensorless.
        const POS_CTRL_DURING_SENSORLESS  = 0x0400;
        /// Watchdog counter reached zero.
        const WATCHDOG_TIMER_EXPIRED      = 0x0800;
    }
}

impl Default for AxisError {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Motor driver error register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MotorError: u16 {
        /// Measured phase resistance outside the plausible range.
        const PHASE_RESISTANCE_OUT_OF_RANGE = 0x0001;
        /// Measured phase inductance outside the plausible range.
        const PHASE_INDUCTANCE_OUT_OF_RANGE = 0x0002;
        /// Non-finite modulation command.
        const MODULATION_MAGNITUDE          = 0x0004;
        /// Commanded current exceeded the limit margin.
        const CURRENT_LIMIT_VIOLATION       = 0x0008;
        /// Gate driver fault line asserted.
        const DRV_FAULT                     = 0x0010;
    }
}

impl Default for MotorError {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Encoder error register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EncoderError: u8 {
        /// Configured CPR outside the supported range.
        const CPR_OUT_OF_RANGE    = 0x01;
        /// Encoder did not respond during calibration.
        const NO_RESPONSE         = 0x02;
        /// An operation required the index pulse before it was found.
        const INDEX_NOT_FOUND_YET = 0x04;
    }
}

impl Default for EncoderError {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Sensorless estimator error register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SensorlessError: u8 {
        /// PLL gains produced an unstable estimate.
        const UNSTABLE_GAIN               = 0x01;
        /// Current measurement unavailable or non-finite.
        const UNKNOWN_CURRENT_MEASUREMENT = 0x02;
    }
}

impl Default for SensorlessError {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Controller error register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControllerError: u8 {
        /// Measured velocity exceeded `vel_limit × vel_limit_tolerance`.
        const OVERSPEED        = 0x01;
        /// Setpoint arithmetic produced a non-finite value.
        const INVALID_SETPOINT = 0x02;
    }
}

impl Default for ControllerError {
    fn default() -> Self {
        Self::empty()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
