//! Configuration for the stage driver, loaded with Figment.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. A TOML file (default `k10cr1.toml`; a missing file is not an error)
//! 3. Environment variables prefixed with `K10CR1_`, nested keys separated by
//!    a double underscore, e.g. `K10CR1_DEVICE__TIMEOUT_MS=500`
//!
//! # Example
//! ```no_run
//! use k10cr1::config::StageConfig;
//!
//! let config = StageConfig::load()?;
//! config.validate()?;
//! println!("Stage on {}", config.device.port);
//! # Ok::<(), k10cr1::error::StageError>(())
//! ```
//!
//! ```toml
//! [application]
//! log_level = "debug"
//! log_format = "json"
//!
//! [device]
//! port = "55000231"   # serial number or port path
//! timeout_ms = 5000
//! motion_timeout_ms = 90000
//! ```

use crate::error::{StageError, StageResult};
use crate::hardware::serial::DEFAULT_BAUD_RATE;
use crate::logging::OutputFormat;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "k10cr1.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageConfig {
    /// `[application]` section
    #[serde(default)]
    pub application: ApplicationConfig,
    /// `[device]` section
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Name reported in startup logs
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default)]
    pub log_format: OutputFormat,
}

/// Serial connection settings for the stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Port path (e.g. "/dev/ttyUSB0", "COM3") or USB serial number
    #[serde(default)]
    pub port: String,
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Deadline for a complete reply to a query
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Deadline for replies sent only once motion ends (home, jog, settle)
    #[serde(default = "default_motion_timeout_ms")]
    pub motion_timeout_ms: u64,
    /// How long to listen for stale bytes before each request (0 disables)
    #[serde(default = "default_drain_ms")]
    pub drain_ms: u64,
}

fn default_name() -> String {
    "k10cr1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_motion_timeout_ms() -> u64 {
    60_000
}

fn default_drain_ms() -> u64 {
    20
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            motion_timeout_ms: default_motion_timeout_ms(),
            drain_ms: default_drain_ms(),
        }
    }
}

impl DeviceConfig {
    /// Settings for `port` with every other field at its default.
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Reply deadline for queries.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reply deadline for commands answered after the stage stops.
    pub fn motion_timeout(&self) -> Duration {
        Duration::from_millis(self.motion_timeout_ms)
    }

    /// Stale-byte listening window before each request.
    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

impl StageConfig {
    /// Load from `k10cr1.toml` and the environment.
    pub fn load() -> StageResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> StageResult<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("K10CR1_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> StageResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(StageError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.device.port.trim().is_empty() {
            return Err(StageError::Configuration(
                "device.port must name a serial port or serial number".to_string(),
            ));
        }

        if self.device.baud_rate == 0 {
            return Err(StageError::Configuration(
                "device.baud_rate must be positive".to_string(),
            ));
        }

        if self.device.timeout_ms == 0 {
            return Err(StageError::Configuration(
                "device.timeout_ms must be positive".to_string(),
            ));
        }

        if self.device.motion_timeout_ms < self.device.timeout_ms {
            return Err(StageError::Configuration(format!(
                "device.motion_timeout_ms ({}) must be at least device.timeout_ms ({})",
                self.device.motion_timeout_ms, self.device.timeout_ms
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> StageConfig {
        StageConfig {
            application: ApplicationConfig::default(),
            device: DeviceConfig::for_port("/dev/ttyUSB0"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = StageConfig::default();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.device.baud_rate, 115_200);
        assert_eq!(config.device.timeout(), Duration::from_millis(2000));
        assert_eq!(config.device.drain(), Duration::from_millis(20));
        assert_eq!(config.device.motion_timeout(), Duration::from_secs(60));
        assert_eq!(config.application.log_format, OutputFormat::Compact);
        // No port configured yet
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[application]\nlog_level = \"debug\"\nlog_format = \"json\"\n\n[device]\nport = \"55000231\"\ntimeout_ms = 5000\nmotion_timeout_ms = 90000\n"
        )
        .unwrap();

        let config = StageConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.name, "k10cr1");
        assert_eq!(config.device.port, "55000231");
        assert_eq!(config.device.timeout_ms, 5000);
        assert_eq!(config.device.motion_timeout_ms, 90_000);
        assert_eq!(config.application.log_format, OutputFormat::Json);
        assert_eq!(config.device.baud_rate, 115_200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StageConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.device.timeout_ms, 2000);
    }

    #[test]
    fn test_environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "stage.toml",
                "[device]\nport = \"/dev/ttyUSB0\"\ntimeout_ms = 5000\n",
            )?;
            jail.set_env("K10CR1_DEVICE__TIMEOUT_MS", "750");
            jail.set_env("K10CR1_APPLICATION__LOG_LEVEL", "warn");
            jail.set_env("K10CR1_APPLICATION__LOG_FORMAT", "pretty");

            let config = StageConfig::load_from("stage.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.device.port, "/dev/ttyUSB0");
            assert_eq!(config.device.timeout_ms, 750);
            assert_eq!(config.application.log_level, "warn");
            assert_eq!(config.application.log_format, OutputFormat::Pretty);
            Ok(())
        });
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device]\ntimeout_ms = \"soon\"\n").unwrap();

        let err = StageConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, StageError::Config(_)));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = valid();
        config.application.log_level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(StageError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = valid();
        config.device.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.device.baud_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_motion_timeout_shorter_than_reply_timeout_rejected() {
        let mut config = valid();
        config.device.timeout_ms = 5000;
        config.device.motion_timeout_ms = 1000;
        assert!(matches!(
            config.validate(),
            Err(StageError::Configuration(msg)) if msg.contains("motion_timeout_ms")
        ));
    }

    #[test]
    fn test_unknown_log_format_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[application]\nlog_format = \"xml\"\n").unwrap();

        let err = StageConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, StageError::Config(_)));
    }
}
