//! Configuration System using Figment
//!
//! Configuration is layered, highest precedence last:
//! 1. Built-in defaults
//! 2. A TOML file (default `config/astro-control.toml`)
//! 3. Environment variables prefixed with `ASTRO_`, using `__` as the
//!    section separator
//!
//! ```text
//! ASTRO_APPLICATION__LOG_LEVEL=debug
//! ASTRO_TELESCOPE__ADDRESS=192.168.1.40:11111
//! ASTRO_POLLING__FAST_INTERVAL=500ms
//! ```
//!
//! # Example file
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [polling]
//! fast_interval = "1s"
//! normal_interval = "5s"
//! slow_interval = "10s"
//!
//! [telescope]
//! address = "localhost:32323"
//! device_number = 0
//! protocol = "http"
//! driver_name = "Simulator"
//! ```

use crate::core::{DeviceEndpoint, Protocol};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or parsed
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// Values loaded but failed validation
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Poll interval tiers
    #[serde(default)]
    pub polling: PollingConfig,
    /// Event bus sizing
    #[serde(default)]
    pub events: EventConfig,
    /// Telescope connection settings
    #[serde(default)]
    pub telescope: DeviceSettings,
    /// Focuser connection settings
    #[serde(default)]
    pub focuser: DeviceSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Poll interval tiers.
///
/// `slow_interval` is reserved for low-priority polling and is not selected
/// by the current loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval while the device reports motion
    #[serde(with = "humantime_serde", default = "default_fast_interval")]
    pub fast_interval: Duration,
    /// Interval while the device is idle
    #[serde(with = "humantime_serde", default = "default_normal_interval")]
    pub normal_interval: Duration,
    /// Reserved low-priority interval
    #[serde(with = "humantime_serde", default = "default_slow_interval")]
    pub slow_interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fast_interval: default_fast_interval(),
            normal_interval: default_normal_interval(),
            slow_interval: default_slow_interval(),
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EventConfig {
    /// Number of events buffered per subscriber before the oldest are dropped
    #[serde(default = "default_event_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_event_capacity(),
        }
    }
}

/// Connection settings for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Host and port of the device server
    #[serde(default = "default_address")]
    pub address: String,
    /// Device number on that server
    #[serde(default)]
    pub device_number: u32,
    /// Transport protocol
    #[serde(default)]
    pub protocol: Protocol,
    /// Display name of the selected driver, shown while disconnected
    #[serde(default)]
    pub driver_name: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            device_number: 0,
            protocol: Protocol::Http,
            driver_name: String::new(),
        }
    }
}

impl DeviceSettings {
    /// Endpoint described by these settings.
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::new(self.address.clone(), self.device_number, self.protocol)
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fast_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_normal_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_slow_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_event_capacity() -> usize {
    64
}

fn default_address() -> String {
    "localhost:32323".to_string()
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl AppConfig {
    /// Load configuration from `config/astro-control.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/astro-control.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment variables
    /// still apply. The result is validated before it is returned.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ASTRO_").split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Poll intervals are non-zero and ordered fast <= normal <= slow
    /// - Event channel capacity is non-zero
    /// - Device addresses are not empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let polling = &self.polling;
        if polling.fast_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "polling.fast_interval must be greater than zero".to_string(),
            ));
        }
        if polling.fast_interval > polling.normal_interval
            || polling.normal_interval > polling.slow_interval
        {
            return Err(ConfigError::ValidationError(format!(
                "Poll intervals must satisfy fast <= normal <= slow (got {:?}, {:?}, {:?})",
                polling.fast_interval, polling.normal_interval, polling.slow_interval
            )));
        }

        if self.events.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "events.channel_capacity must be at least 1".to_string(),
            ));
        }

        for (name, device) in [("telescope", &self.telescope), ("focuser", &self.focuser)] {
            if device.address.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{name}.address cannot be empty"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.polling.fast_interval, Duration::from_secs(1));
        assert_eq!(config.polling.normal_interval, Duration::from_secs(5));
        assert_eq!(config.polling.slow_interval, Duration::from_secs(10));
        assert_eq!(config.telescope.address, "localhost:32323");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    fn test_interval_ordering_is_checked() {
        let mut config = AppConfig::default();
        config.polling.fast_interval = Duration::from_secs(6);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[polling]
fast_interval = "250ms"
normal_interval = "2s"

[focuser]
address = "10.0.0.7:11111"
device_number = 2
protocol = "https"
driver_name = "Robo Focus"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.polling.fast_interval, Duration::from_millis(250));
        assert_eq!(config.polling.normal_interval, Duration::from_secs(2));
        assert_eq!(config.polling.slow_interval, Duration::from_secs(10));
        assert_eq!(config.focuser.device_number, 2);
        assert_eq!(config.focuser.protocol, Protocol::Https);
        assert_eq!(config.focuser.driver_name, "Robo Focus");
        assert_eq!(config.telescope, DeviceSettings::default());
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        std::env::set_var("ASTRO_TELESCOPE__DRIVER_NAME", "Env Mount");
        let result = AppConfig::load_from(&path);
        std::env::remove_var("ASTRO_TELESCOPE__DRIVER_NAME");

        let config = result.unwrap();
        assert_eq!(config.telescope.driver_name, "Env Mount");
    }
}
