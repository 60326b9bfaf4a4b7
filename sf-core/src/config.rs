//! Static daemon configuration
//!
//! Read once at startup from `/etc/socfan/config.json`. Every section has
//! defaults, so a missing file is valid and an empty object selects the stock
//! setup. Control thresholds are not configurable; see `constants`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sf_error::{Result, SocfanError};
use tracing::info;

use crate::constants::{limits, paths, pwm, telemetry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorsConfig {
    /// hwmon chip name of the structured SoC sensor
    pub hwmon_name: String,
    pub hwmon_root: PathBuf,
    /// Thermal zone `temp` file in millidegrees
    pub thermal_zone: PathBuf,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            hwmon_name: paths::SOC_HWMON_NAME.to_string(),
            hwmon_root: PathBuf::from(paths::HWMON_BASE),
            thermal_zone: PathBuf::from(paths::THERMAL_ZONE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TachometerConfig {
    /// Kernel GPIO line number of the tach signal
    pub gpio: u32,
    pub gpio_root: PathBuf,
}

impl Default for TachometerConfig {
    fn default() -> Self {
        Self {
            gpio: 16,
            gpio_root: PathBuf::from(paths::GPIO_BASE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PwmConfig {
    pub chip: PathBuf,
    pub channel: u32,
    pub period_us: u32,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            chip: PathBuf::from(paths::PWM_CHIP),
            channel: 0,
            period_us: pwm::PERIOD_US,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub topic: String,
    pub keep_alive_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: telemetry::DEFAULT_HOST.to_string(),
            port: telemetry::DEFAULT_PORT,
            client_id: telemetry::DEFAULT_CLIENT_ID.to_string(),
            username: telemetry::DEFAULT_USERNAME.to_string(),
            password: String::new(),
            topic: sf_protocol::DEFAULT_TOPIC.to_string(),
            keep_alive_secs: telemetry::DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Optional file receiving a copy of every log line
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sensors: SensorsConfig,
    pub tachometer: TachometerConfig,
    pub pwm: PwmConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    Path::new(paths::CONFIG_DIR).join(paths::CONFIG_FILE)
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// No file at this path; built-in defaults
    Defaults(PathBuf),
}

/// A validated configuration and how it was assembled.
///
/// Loading happens before the log sink exists (the log file is a config
/// value), so nothing is logged during `Config::load`. Call `log_summary`
/// once logging is up.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: Config,
    pub origin: ConfigOrigin,
    pub password_from_env: bool,
}

impl LoadedConfig {
    pub fn log_summary(&self) {
        match &self.origin {
            ConfigOrigin::File(path) => info!("Loaded config from {:?}", path),
            ConfigOrigin::Defaults(path) => info!("No config at {:?}, using defaults", path),
        }
        if self.password_from_env {
            info!("Broker password taken from {}", telemetry::PASSWORD_ENV);
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file does not exist.
    ///
    /// The broker password may be overridden by `SOCFAN_MQTT_PASSWORD`.
    pub fn load(path: &Path) -> Result<LoadedConfig> {
        let (mut config, origin) = if path.exists() {
            (Self::from_file(path)?, ConfigOrigin::File(path.to_path_buf()))
        } else {
            (Self::default(), ConfigOrigin::Defaults(path.to_path_buf()))
        };

        let password_from_env = match std::env::var(telemetry::PASSWORD_ENV) {
            Ok(password) => {
                config.telemetry.password = password;
                true
            }
            Err(_) => false,
        };

        config.validate()?;
        Ok(LoadedConfig {
            config,
            origin,
            password_from_env,
        })
    }

    fn from_file(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|e| SocfanError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        if meta.len() > limits::MAX_CONFIG_SIZE {
            return Err(SocfanError::FileTooLarge {
                path: path.to_path_buf(),
                size: meta.len(),
                max_size: limits::MAX_CONFIG_SIZE,
            });
        }
        let content = fs::read_to_string(path).map_err(|e| SocfanError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pwm.period_us <= pwm::PW_MAX {
            return Err(SocfanError::invalid_config(
                "pwm.period_us",
                format!("must be greater than the maximum pulse width {}", pwm::PW_MAX),
            ));
        }
        if self.sensors.hwmon_name.trim().is_empty() {
            return Err(SocfanError::invalid_config("sensors.hwmon_name", "must not be empty"));
        }
        if self.telemetry.enabled {
            if self.telemetry.host.trim().is_empty() {
                return Err(SocfanError::invalid_config("telemetry.host", "must not be empty"));
            }
            if self.telemetry.port == 0 {
                return Err(SocfanError::invalid_config("telemetry.port", "must be non-zero"));
            }
            if self.telemetry.topic.trim().is_empty() {
                return Err(SocfanError::invalid_config("telemetry.topic", "must not be empty"));
            }
            if self.telemetry.client_id.trim().is_empty() {
                return Err(SocfanError::invalid_config("telemetry.client_id", "must not be empty"));
            }
            if self.telemetry.keep_alive_secs == 0 {
                return Err(SocfanError::invalid_config(
                    "telemetry.keep_alive_secs",
                    "must be non-zero",
                ));
            }
        }
        Ok(())
    }
}
