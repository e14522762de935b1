//! Axis construction, wiring and external handle.
//!
//! The axis owns its sub-components by value for the program's lifetime.
//! The back-reference every sub-component needs is the shared observable
//! block, handed out as a plain `Arc<AxisShared>` clone — a relation,
//! never ownership of the axis itself.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use foc_common::axis::config::AxisUnitConfig;
use foc_common::axis::error::AxisError;
use foc_common::axis::state::{AxisState, LockinState};
use foc_common::config::{ConfigError, Validate};
use thiserror::Error;
use tracing::info;

use crate::bus::{DcBus, RotorSim};
use crate::components::{
    Controller, Encoder, Motor, SensorlessEstimator, TrapezoidalTrajectory,
};
use crate::gpio::GpioBank;
use crate::shared::AxisShared;
use crate::step_dir::StepDirInput;
use crate::task_chain::TaskChain;

/// Axis initialisation failure.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("{component} init failed: {source}")]
    Component {
        component: &'static str,
        source: ConfigError,
    },
    #[error("control thread spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
}

fn component_err(component: &'static str) -> impl FnOnce(ConfigError) -> InitError {
    move |source| InitError::Component { component, source }
}

/// One independently controlled motor axis.
pub struct Axis {
    pub config: foc_common::axis::config::AxisConfig,
    pub(crate) shared: Arc<AxisShared>,
    pub(crate) bus: Arc<DcBus>,
    pub(crate) gpio: Arc<GpioBank>,

    pub motor: Motor,
    pub encoder: Encoder,
    pub sensorless_estimator: SensorlessEstimator,
    pub controller: Controller,
    pub trap: TrapezoidalTrajectory,

    pub(crate) step_dir: StepDirInput,
    pub(crate) task_chain: TaskChain,
    /// Shared block of the paired axis, for open-loop phase lock.
    pub(crate) sibling: Option<Arc<AxisShared>>,

    /// Control tick period [s].
    pub(crate) dt: f32,
    pub(crate) meas_timeout: Duration,
}

impl Axis {
    pub fn new(id: u8, config: AxisUnitConfig, bus: Arc<DcBus>, gpio: Arc<GpioBank>) -> Self {
        let shared = Arc::new(AxisShared::new(id));
        let rotor = Arc::new(RotorSim::new());
        let dt = config.axis.current_meas_period();

        let motor = Motor::new(
            config.motor,
            shared.clone(),
            bus.clone(),
            rotor.clone(),
            dt,
        );
        let encoder = Encoder::new(config.encoder, shared.clone(), rotor.clone());
        let sensorless_estimator = SensorlessEstimator::new(shared.clone(), rotor, dt);
        let controller = Controller::new(config.controller, shared.clone(), dt);
        let trap = TrapezoidalTrajectory::new(config.trap);

        let meas_timeout = Duration::from_millis(config.axis.current_meas_timeout_ms);
        shared
            .current_meas_hz
            .store(config.axis.current_meas_hz, std::sync::atomic::Ordering::Relaxed);
        // Boot behaviour: the first thing the supervisor runs is the
        // startup sequence (a no-op chain when all startup flags are off).
        shared.request_state(AxisState::StartupSequence);

        Self {
            config: config.axis,
            shared,
            bus,
            gpio,
            motor,
            encoder,
            sensorless_estimator,
            controller,
            trap,
            step_dir: StepDirInput::new(),
            task_chain: TaskChain::new(),
            sibling: None,
            dt,
            meas_timeout,
        }
    }

    /// Set up all sub-components and derived settings. Call once before
    /// starting the control thread.
    pub fn init(&mut self) -> Result<(), InitError> {
        self.config.validate().map_err(component_err("axis"))?;
        self.motor.init().map_err(component_err("motor"))?;
        self.encoder.init().map_err(component_err("encoder"))?;
        self.sensorless_estimator
            .init()
            .map_err(component_err("sensorless_estimator"))?;
        self.controller.init().map_err(component_err("controller"))?;
        self.trap.init().map_err(component_err("trap"))?;

        self.decode_step_dir_pins();
        self.update_watchdog_settings();
        Ok(())
    }

    /// Resolve the configured step/dir pin numbers against the board.
    pub fn decode_step_dir_pins(&mut self) {
        self.step_dir.decode_pins(
            &self.gpio,
            self.config.step_gpio_num,
            self.config.dir_gpio_num,
            self.config.counts_per_step,
        );
    }

    /// Derive the watchdog reset value from the configured timeout.
    pub fn update_watchdog_settings(&self) {
        self.shared
            .watchdog
            .update_settings(self.config.watchdog_timeout, self.config.current_meas_hz);
    }

    /// Pair this axis with its sibling for open-loop phase lock.
    pub fn set_sibling(&mut self, sibling: Arc<AxisShared>) {
        self.sibling = Some(sibling);
    }

    /// External handle to this axis's observable state.
    pub fn handle(&self) -> AxisHandle {
        AxisHandle {
            shared: self.shared.clone(),
        }
    }

    /// (De)activate the step/dir input.
    pub(crate) fn set_step_dir_active(&mut self, active: bool) {
        let shared = self.shared.clone();
        self.step_dir.set_active(active, &shared);
    }

    /// True while no axis error is latched.
    #[inline]
    pub(crate) fn check_for_errors(&self) -> bool {
        self.shared.check_for_errors()
    }

    /// Start the control thread. Consumes the axis: from here on it is
    /// owned by its thread and observed through the returned handle.
    pub fn start_thread(self) -> Result<(AxisHandle, thread::JoinHandle<()>), InitError> {
        let handle = self.handle();
        let shared = self.shared.clone();
        let join = thread::Builder::new()
            .name(format!("axis{}-control", shared.id))
            .spawn(move || self.run_state_machine_loop())?;
        // The measurement interrupt may signal only from this point on.
        shared.set_thread_ready(true);
        info!(axis = shared.id, "axis control thread started");
        Ok((handle, join))
    }
}

/// Cloneable external view of one axis: the surface the communication
/// layer, CLI and ISRs use.
#[derive(Clone)]
pub struct AxisHandle {
    shared: Arc<AxisShared>,
}

impl AxisHandle {
    /// Deposit a state request. Consumed by the control thread within at
    /// most one tick period plus the next state's entry cost.
    pub fn request_state(&self, state: AxisState) {
        self.shared.request_state(state);
    }

    #[inline]
    pub fn current_state(&self) -> AxisState {
        self.shared.current_state()
    }

    #[inline]
    pub fn error(&self) -> AxisError {
        self.shared.error()
    }

    /// Clear the whole error register (operator action).
    pub fn clear_errors(&self) {
        self.shared.clear_errors();
    }

    #[inline]
    pub fn lockin_state(&self) -> LockinState {
        self.shared.lockin_state()
    }

    /// Reload the watchdog counter.
    pub fn feed_watchdog(&self) {
        self.shared.watchdog.feed();
    }

    /// Reconfigure the watchdog timeout [s]. Non-positive disables it.
    /// Feeds immediately, so reconfiguration cannot cause an instant
    /// expiry.
    pub fn set_watchdog_timeout(&self, timeout_s: f32) {
        let hz = self
            .shared
            .current_meas_hz
            .load(std::sync::atomic::Ordering::Relaxed);
        self.shared.watchdog.update_settings(timeout_s, hz);
    }

    /// Current-measurement interrupt entry point.
    #[inline]
    pub fn signal_current_meas(&self) {
        self.shared.signal_current_meas();
    }

    /// Ask the control thread to exit; used for clean teardown.
    pub fn request_shutdown(&self) {
        self.shared.request_shutdown();
    }

    /// Completed control ticks since thread start.
    pub fn loop_count(&self) -> u64 {
        self.shared
            .loop_counter
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Position setpoint telemetry [counts].
    pub fn pos_setpoint(&self) -> f32 {
        self.shared.pos_setpoint.load()
    }

    /// Last commanded current magnitude [A].
    pub fn current_command(&self) -> f32 {
        self.shared.current_command.load()
    }

    /// True while the step/dir edge callback is live.
    pub fn step_dir_active(&self) -> bool {
        self.shared
            .step_dir_active
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// The underlying shared block, for pairing and tests.
    pub fn shared(&self) -> Arc<AxisShared> {
        self.shared.clone()
    }
}
