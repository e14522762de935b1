//! # FOC Axis Supervisor demo binary
//!
//! Loads a TOML configuration, wires the configured axes to a simulated
//! current-measurement ticker, optionally issues a state request, and
//! reports telemetry until the run time elapses.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::Deserialize;
use tracing::{error, info};

use foc_axis::axis::{Axis, AxisHandle};
use foc_axis::bus::DcBus;
use foc_axis::gpio::GpioBank;
use foc_common::axis::config::{AxisUnitConfig, BusConfig};
use foc_common::axis::state::AxisState;
use foc_common::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig, Validate};

/// Number of pins on the simulated board.
const GPIO_COUNT: u32 = 16;

#[derive(Parser, Debug)]
#[command(name = "foc_axis", about = "FOC axis supervisor (simulated hardware)")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/foc.toml")]
    config: PathBuf,

    /// State request issued to axis 0 after startup
    /// (e.g. `startup_sequence`, `lockin_spin`, `closed_loop_control`).
    #[arg(long)]
    request: Option<AxisState>,

    /// How long to run before shutting down [s].
    #[arg(long, default_value_t = 5.0)]
    run_for: f64,
}

#[derive(Debug, Deserialize)]
struct SupervisorConfig {
    shared: SharedConfig,
    #[serde(default)]
    bus: BusConfig,
    #[serde(default)]
    axes: Vec<AxisUnitConfig>,
}

impl Validate for SupervisorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.bus.validate()?;
        if self.axes.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [[axes]] entry is required".to_string(),
            ));
        }
        for axis in &self.axes {
            axis.validate()?;
        }
        Ok(())
    }
}

fn tracing_level(level: LogLevel) -> tracing::Level {
    match level {
        LogLevel::Trace => tracing::Level::TRACE,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Error => tracing::Level::ERROR,
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match SupervisorConfig::load_validated(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: loading {}: {e}", cli.config.display());
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(tracing_level(config.shared.log_level))
        .with_target(false)
        .init();

    info!(
        service = %config.shared.service_name,
        axes = config.axes.len(),
        "starting axis supervisor"
    );

    let bus = Arc::new(DcBus::new(&config.bus));
    let gpio = Arc::new(GpioBank::new(GPIO_COUNT));
    let meas_hz = config.axes[0].axis.current_meas_hz;

    // Build and wire the axes; pair the first two for phase lock.
    let mut axes: Vec<Axis> = config
        .axes
        .into_iter()
        .enumerate()
        .map(|(id, unit)| Axis::new(id as u8, unit, bus.clone(), gpio.clone()))
        .collect();
    if axes.len() >= 2 {
        let shared0 = axes[0].handle().shared();
        let shared1 = axes[1].handle().shared();
        axes[0].set_sibling(shared1);
        axes[1].set_sibling(shared0);
    }

    let mut handles: Vec<AxisHandle> = Vec::new();
    let mut joins = Vec::new();
    for mut axis in axes {
        if let Err(e) = axis.init() {
            error!(error = %e, "axis init failed");
            process::exit(1);
        }
        match axis.start_thread() {
            Ok((handle, join)) => {
                handles.push(handle);
                joins.push(join);
            }
            Err(e) => {
                error!(error = %e, "axis thread start failed");
                process::exit(1);
            }
        }
    }

    // Simulated current-measurement interrupt.
    let ticker_stop = Arc::new(AtomicBool::new(false));
    let ticker = {
        let handles = handles.clone();
        let stop = ticker_stop.clone();
        let period = Duration::from_secs_f64(1.0 / meas_hz as f64);
        thread::Builder::new()
            .name("current-meas-ticker".to_string())
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    for handle in &handles {
                        handle.signal_current_meas();
                    }
                    thread::sleep(period);
                }
            })
            .expect("spawn ticker thread")
    };

    if let Some(request) = cli.request {
        info!(?request, "issuing state request to axis 0");
        handles[0].request_state(request);
    }

    // Telemetry until the run time elapses.
    let deadline = Instant::now() + Duration::from_secs_f64(cli.run_for.max(0.0));
    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        thread::sleep(Duration::from_millis(500).min(remaining));
        for (id, handle) in handles.iter().enumerate() {
            info!(
                axis = id,
                state = ?handle.current_state(),
                lockin = ?handle.lockin_state(),
                error = ?handle.error(),
                ticks = handle.loop_count(),
                "telemetry"
            );
        }
    }

    info!("shutting down");
    for handle in &handles {
        handle.request_shutdown();
    }
    for join in joins {
        let _ = join.join();
    }
    ticker_stop.store(true, Ordering::Relaxed);
    let _ = ticker.join();
    info!("done");
}
