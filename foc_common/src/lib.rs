//! # FOC Common
//!
//! Shared vocabulary for the FOC axis supervisor: state enums, error
//! registers, configuration records and system constants. Everything here
//! is plain data — the realtime machinery lives in `foc_axis`.

pub mod axis;
pub mod config;
pub mod consts;
pub mod math;

pub mod prelude {
    //! Convenience re-exports for downstream crates.
    pub use crate::axis::config::{
        AxisConfig, AxisUnitConfig, BusConfig, ControllerConfig, EncoderConfig, LockinConfig,
        MotorConfig, TrapConfig,
    };
    pub use crate::axis::error::AxisError;
    pub use crate::axis::state::{AxisState, ControlMode, LockinState};
    pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig, Validate};
}
