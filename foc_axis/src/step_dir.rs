//! Step/direction input interface.
//!
//! Binds two GPIOs. Each rising STEP edge adds `±counts_per_step` to the
//! controller position setpoint, signed by the DIR level. The edge
//! callback runs in interrupt context, so it touches only atomics, and
//! deactivation clears the live flag before tearing the pins down so an
//! in-flight callback degrades to a no-op.

use std::sync::Arc;

use tracing::debug;

use crate::gpio::{GpioBank, PinMode, Pull, SimGpio};
use crate::shared::AxisShared;

pub struct StepDirInput {
    step_gpio: Option<Arc<SimGpio>>,
    dir_gpio: Option<Arc<SimGpio>>,
    counts_per_step: f32,
}

impl StepDirInput {
    pub fn new() -> Self {
        Self {
            step_gpio: None,
            dir_gpio: None,
            counts_per_step: 0.0,
        }
    }

    /// Resolve the configured pin numbers against the board's bank.
    /// Out-of-range numbers leave the pin unbound.
    pub fn decode_pins(
        &mut self,
        bank: &GpioBank,
        step_gpio_num: u32,
        dir_gpio_num: u32,
        counts_per_step: f32,
    ) {
        if let Some(step) = self.step_gpio.take() {
            step.deinit();
        }
        if let Some(dir) = self.dir_gpio.take() {
            dir.deinit();
        }
        self.step_gpio = bank.get(step_gpio_num);
        self.dir_gpio = bank.get(dir_gpio_num);
        self.counts_per_step = counts_per_step;
    }

    /// Activate or deactivate the interface.
    ///
    /// Activation configures DIR as a pull-disabled input and STEP as a
    /// pull-down input with a rising-edge subscription. Deactivation
    /// clears `step_dir_active` first, then deinitialises both pins.
    pub fn set_active(&mut self, active: bool, shared: &Arc<AxisShared>) {
        if active {
            if let Some(dir) = &self.dir_gpio {
                dir.init(PinMode::Input(Pull::None));
            }
            if let Some(step) = &self.step_gpio {
                step.init(PinMode::Input(Pull::Down));
                let shared = shared.clone();
                let dir = self.dir_gpio.clone();
                let counts_per_step = self.counts_per_step;
                step.subscribe(true, false, move || {
                    step_cb(&shared, dir.as_deref(), counts_per_step);
                });
            }
            shared
                .step_dir_active
                .store(true, std::sync::atomic::Ordering::SeqCst);
            debug!(axis = shared.id, "step/dir input active");
        } else {
            // Flag first: an in-flight edge callback must become a no-op
            // before the pins go away.
            shared
                .step_dir_active
                .store(false, std::sync::atomic::Ordering::SeqCst);
            if let Some(step) = &self.step_gpio {
                step.deinit();
            }
            if let Some(dir) = &self.dir_gpio {
                dir.deinit();
            }
        }
    }
}

impl Default for StepDirInput {
    fn default() -> Self {
        Self::new()
    }
}

/// STEP rising-edge callback. Interrupt context: atomics only.
fn step_cb(shared: &Arc<AxisShared>, dir_gpio: Option<&SimGpio>, counts_per_step: f32) {
    if !shared
        .step_dir_active
        .load(std::sync::atomic::Ordering::SeqCst)
    {
        return;
    }
    let dir = match dir_gpio {
        Some(pin) if pin.read() => 1.0,
        Some(_) => -1.0,
        None => return,
    };
    shared.pos_setpoint.fetch_add(dir * counts_per_step);
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rig() -> (StepDirInput, Arc<AxisShared>, GpioBank) {
        let shared = Arc::new(AxisShared::new(0));
        let bank = GpioBank::new(8);
        let mut input = StepDirInput::new();
        input.decode_pins(&bank, 1, 2, 2.0);
        (input, shared, bank)
    }

    #[test]
    fn step_edges_move_setpoint() {
        let (mut input, shared, bank) = rig();
        input.set_active(true, &shared);

        let step = bank.get(1).unwrap();
        let dir = bank.get(2).unwrap();

        dir.drive(true);
        step.drive(true);
        step.drive(false);
        step.drive(true);
        assert_eq!(shared.pos_setpoint.load(), 4.0);

        dir.drive(false);
        step.drive(false);
        step.drive(true);
        assert_eq!(shared.pos_setpoint.load(), 2.0);
    }

    #[test]
    fn inactive_input_ignores_edges() {
        let (mut input, shared, bank) = rig();
        input.set_active(true, &shared);
        input.set_active(false, &shared);

        let step = bank.get(1).unwrap();
        step.drive(true);
        assert_eq!(shared.pos_setpoint.load(), 0.0);
        assert!(!shared
            .step_dir_active
            .load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn unbound_pins_are_tolerated() {
        let shared = Arc::new(AxisShared::new(0));
        let bank = GpioBank::new(2);
        let mut input = StepDirInput::new();
        // Pin numbers beyond the bank resolve to nothing.
        input.decode_pins(&bank, 40, 41, 2.0);
        input.set_active(true, &shared);
        input.set_active(false, &shared);
    }

    #[test]
    fn falling_step_edges_do_nothing() {
        let (mut input, shared, bank) = rig();
        input.set_active(true, &shared);
        let step = bank.get(1).unwrap();
        step.drive(true);
        let after_rise = shared.pos_setpoint.load();
        step.drive(false);
        assert_eq!(shared.pos_setpoint.load(), after_rise);
    }
}
