//! # FOC Axis Supervisor
//!
//! Realtime supervisor for one physical motor axis of a field-oriented
//! brushless-motor controller. A cooperative control thread sequences
//! calibration, lock-in and control tasks, synchronized to the hardware
//! current-measurement interrupt through a one-shot signal.
//!
//! ## Architecture
//!
//! - **`Axis`** owns the sub-components (motor, encoder, sensorless
//!   estimator, controller, trajectory planner) by value and runs the
//!   state machine on its own control thread.
//! - **`AxisShared`** is the non-owning observable block: every value
//!   crossing a thread boundary (error register, states, the request
//!   mailbox, published setpoints, the measurement signal) is an atomic
//!   word inside it.
//! - The **control-loop scaffold** enforces the per-tick order:
//!   wait → estimator updates → tick body → fault checks → watchdog →
//!   request poll. The tick body never blocks.
//!
//! Hardware is simulated: the DC bus, rotor and GPIO drivers live behind
//! the same interfaces a real board would provide, so the supervisor and
//! its tests exercise the exact production control flow.

pub mod axis;
pub mod bus;
pub mod components;
pub mod cycle;
pub mod gpio;
pub mod lockin;
pub mod modes;
pub mod shared;
pub mod step_dir;
pub mod supervisor;
pub mod task_chain;
pub mod watchdog;

pub use axis::{Axis, AxisHandle, InitError};
pub use shared::AxisShared;
