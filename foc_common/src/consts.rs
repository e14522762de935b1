//! System-wide constants.

use static_assertions::const_assert;

/// Default current-measurement interrupt rate [Hz].
pub const DEFAULT_CURRENT_MEAS_HZ: u32 = 8_000;

/// Default timeout for one current-measurement signal wait [ms].
///
/// Exceeding this outside `AxisState::Idle` is fatal to the running task.
pub const DEFAULT_CURRENT_MEAS_TIMEOUT_MS: u64 = 10;

/// Capacity of the supervisor task chain (pending states, current included).
pub const TASK_CHAIN_CAPACITY: usize = 10;

// The chain must hold the longest startup expansion plus slack.
const_assert!(TASK_CHAIN_CAPACITY >= 10);

/// Fraction above `current_lim` at which the motor trips
/// `CURRENT_LIMIT_VIOLATION` instead of clamping.
pub const CURRENT_LIM_MARGIN: f32 = 1.25;
