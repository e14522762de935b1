//! Axis sub-components.
//!
//! Simulation-grade motor driver, encoder, sensorless estimator,
//! position/velocity controller and trapezoidal trajectory planner.
//! Each component owns its error register and propagates faults into the
//! axis error register through its `AxisShared` back-reference, so the
//! supervisor sees exactly the interface a hardware implementation would
//! present.

pub mod controller;
pub mod encoder;
pub mod motor;
pub mod sensorless;
pub mod trajectory;

pub use controller::Controller;
pub use encoder::Encoder;
pub use motor::{safety_critical_disarm_motor_pwm, Motor};
pub use sensorless::SensorlessEstimator;
pub use trajectory::TrapezoidalTrajectory;
