//! Bounded task chain.
//!
//! The ordered queue of states the supervisor will execute. The front is
//! the currently executing state; an empty chain reads as `Undefined`.
//! On task success the front is dequeued; on failure the whole chain is
//! replaced by a single `Idle`.

use foc_common::axis::state::AxisState;
use foc_common::consts::TASK_CHAIN_CAPACITY;
use heapless::Deque;

#[derive(Debug, Default)]
pub struct TaskChain {
    chain: Deque<AxisState, TASK_CHAIN_CAPACITY>,
}

impl TaskChain {
    pub fn new() -> Self {
        Self {
            chain: Deque::new(),
        }
    }

    /// The currently executing state.
    #[inline]
    pub fn current(&self) -> AxisState {
        self.chain.front().copied().unwrap_or(AxisState::Undefined)
    }

    /// Number of queued states, the current one included.
    #[inline]
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Replace the chain with a freshly expanded request.
    ///
    /// States beyond the capacity are dropped; an `Undefined` entry
    /// terminates the chain early.
    pub fn load(&mut self, states: &[AxisState]) {
        self.chain.clear();
        for &state in states {
            if state == AxisState::Undefined {
                break;
            }
            if self.chain.push_back(state).is_err() {
                break;
            }
        }
    }

    /// The running task succeeded: everything shifts forward by one.
    pub fn advance(&mut self) {
        self.chain.pop_front();
    }

    /// The running task failed: discard the remainder and idle.
    pub fn abort_to_idle(&mut self) {
        self.chain.clear();
        // Capacity is static and non-zero, the push cannot fail.
        let _ = self.chain.push_back(AxisState::Idle);
    }

    /// Snapshot of the queued states, front first.
    pub fn as_vec(&self) -> Vec<AxisState> {
        self.chain.iter().copied().collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use AxisState::*;

    #[test]
    fn empty_chain_reads_undefined() {
        let chain = TaskChain::new();
        assert_eq!(chain.current(), Undefined);
        assert!(chain.is_empty());
    }

    #[test]
    fn shift_law_on_success() {
        let mut chain = TaskChain::new();
        chain.load(&[MotorCalibration, EncoderOffsetCalibration, ClosedLoopControl, Idle]);
        let before = chain.as_vec();

        chain.advance();
        let after = chain.as_vec();

        assert_eq!(after.len(), before.len() - 1);
        for (i, s) in after.iter().enumerate() {
            assert_eq!(*s, before[i + 1]);
        }
        assert_eq!(chain.current(), EncoderOffsetCalibration);
    }

    #[test]
    fn abort_law_on_failure() {
        let mut chain = TaskChain::new();
        chain.load(&[MotorCalibration, EncoderOffsetCalibration, ClosedLoopControl, Idle]);
        chain.abort_to_idle();
        assert_eq!(chain.current(), Idle);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn undefined_terminates_load() {
        let mut chain = TaskChain::new();
        chain.load(&[MotorCalibration, Undefined, ClosedLoopControl]);
        assert_eq!(chain.as_vec(), vec![MotorCalibration]);
    }

    #[test]
    fn load_replaces_previous_chain() {
        let mut chain = TaskChain::new();
        chain.load(&[MotorCalibration, Idle]);
        chain.load(&[ClosedLoopControl, Idle]);
        assert_eq!(chain.as_vec(), vec![ClosedLoopControl, Idle]);
    }

    #[test]
    fn overlong_load_is_truncated() {
        let mut chain = TaskChain::new();
        let states = [Idle; TASK_CHAIN_CAPACITY + 5];
        chain.load(&states);
        assert_eq!(chain.len(), TASK_CHAIN_CAPACITY);
    }

    #[test]
    fn advancing_past_end_reads_undefined() {
        let mut chain = TaskChain::new();
        chain.load(&[Idle]);
        chain.advance();
        assert_eq!(chain.current(), Undefined);
        chain.advance();
        assert_eq!(chain.current(), Undefined);
    }
}
