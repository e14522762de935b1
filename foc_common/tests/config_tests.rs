//! Configuration loading integration tests.
//!
//! Round-trips TOML files through `ConfigLoader` and checks defaulting
//! and validation behaviour against files on disk.

use foc_common::axis::config::{AxisUnitConfig, BusConfig};
use foc_common::axis::state::ControlMode;
use foc_common::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig, Validate};
use serde::Deserialize;
use std::io::Write;
use tempfile::NamedTempFile;

#[derive(Debug, Deserialize)]
struct TestSupervisorConfig {
    shared: SharedConfig,
    #[serde(default)]
    bus: BusConfig,
    #[serde(default)]
    axes: Vec<AxisUnitConfig>,
}

fn write_temp(content: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("create temp file");
    f.write_all(content.as_bytes()).expect("write temp file");
    f
}

#[test]
fn full_config_loads() {
    let f = write_temp(
        r#"
[shared]
log_level = "debug"
service_name = "foc-test"

[bus]
dc_bus_undervoltage_trip_level = 10.0
dc_bus_overvoltage_trip_level = 50.0
brake_resistor_enabled = true

[[axes]]
[axes.axis]
startup_motor_calibration = true
startup_closed_loop_control = true
watchdog_timeout = 0.5
counts_per_step = 4.0

[axes.axis.lockin]
current = 8.0
vel = 50.0
finish_on_vel = true

[axes.motor]
direction = 1
pole_pairs = 11

[axes.encoder]
cpr = 4096
use_index = true

[axes.controller]
control_mode = "velocity_control"
"#,
    );

    let cfg = TestSupervisorConfig::load(f.path()).expect("load config");
    assert_eq!(cfg.shared.log_level, LogLevel::Debug);
    assert_eq!(cfg.shared.service_name, "foc-test");
    assert!(cfg.bus.brake_resistor_enabled);
    assert_eq!(cfg.axes.len(), 1);

    let unit = &cfg.axes[0];
    assert!(unit.axis.startup_motor_calibration);
    assert!(unit.axis.startup_closed_loop_control);
    assert_eq!(unit.axis.watchdog_timeout, 0.5);
    assert_eq!(unit.axis.counts_per_step, 4.0);
    assert_eq!(unit.axis.lockin.current, 8.0);
    assert!(unit.axis.lockin.finish_on_vel);
    assert_eq!(unit.motor.direction, 1);
    assert_eq!(unit.motor.pole_pairs, 11);
    assert_eq!(unit.encoder.cpr, 4096);
    assert!(unit.encoder.use_index);
    assert_eq!(unit.controller.control_mode, ControlMode::VelocityControl);

    unit.validate().expect("validate");
    cfg.bus.validate().expect("bus validate");
}

#[test]
fn minimal_config_uses_defaults() {
    let f = write_temp(
        r#"
[shared]
service_name = "foc-minimal"

[[axes]]
"#,
    );

    let cfg = TestSupervisorConfig::load(f.path()).expect("load config");
    assert_eq!(cfg.shared.log_level, LogLevel::Info);

    let unit = &cfg.axes[0];
    assert_eq!(unit.motor.direction, 0);
    assert_eq!(unit.encoder.cpr, 8192);
    assert_eq!(unit.axis.current_meas_hz, 8000);
    assert_eq!(unit.controller.control_mode, ControlMode::PositionControl);
    unit.validate().expect("defaults validate");
}

#[test]
fn malformed_toml_is_parse_error() {
    let f = write_temp("this is not toml = [");
    let err = TestSupervisorConfig::load(f.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn unknown_control_mode_is_parse_error() {
    let f = write_temp(
        r#"
[shared]
service_name = "foc-bad-mode"

[[axes]]
[axes.controller]
control_mode = "warp_drive"
"#,
    );
    let err = TestSupervisorConfig::load(f.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}
