//! Configuration loading and validation.
//!
//! Every configurable record in the controller follows the same
//! two-step contract: deserialize from TOML ([`ConfigLoader`], blanket
//! over anything deserializable), then check semantic invariants
//! ([`Validate`]). Both steps report through [`ConfigError`], so a
//! supervisor binary can load a whole axis tree with one
//! [`ConfigLoader::load_validated`] call.
//!
//! ```rust,no_run
//! use foc_common::config::{ConfigError, ConfigLoader, SharedConfig, Validate};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct ControllerFile {
//!     shared: SharedConfig,
//! }
//!
//! impl Validate for ControllerFile {
//!     fn validate(&self) -> Result<(), ConfigError> {
//!         self.shared.validate()
//!     }
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ControllerFile::load_validated(Path::new("config/foc.toml"))?;
//!     println!("service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The file exists but is not valid TOML for the target record.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// The record deserialized but violates a semantic invariant.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Semantic validation of a configuration record.
///
/// Deserialization only proves the TOML had the right shape; this trait
/// carries the invariants the control code relies on (positive tick
/// rates, trip-level ordering, finite gains). Implementations compose:
/// a parent record validates itself and then each child.
pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Logging verbosity, spelled lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Deployment-level fields every controller instance carries.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "foc-axis-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance identifier, used to tell controllers apart in logs and
    /// telemetry.
    pub service_name: String,
}

impl Validate for SharedConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loading of a configuration record from a TOML file.
///
/// Blanket-implemented for every deserializable type; records that also
/// implement [`Validate`] get the combined [`Self::load_validated`].
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Read and parse the file at `path`.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Read, parse, then check semantic invariants in one step.
    fn load_validated(path: &Path) -> Result<Self, ConfigError>
    where
        Self: Validate,
    {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
