//! Service configuration management.
//!
//! Handles loading, saving, and validating velolock configuration:
//! - HTTP listener address
//! - Log output mode and level
//! - Broker connection and the default device for unscoped topics
//!
//! The file is TOML. Every section and field is optional; missing values
//! take their defaults.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 4000
//!
//! [mqtt]
//! enabled = true
//! broker_url = "mqtt://broker.local:1883"
//! device_mac = "AA:BB:CC:DD:EE:FF"
//! ```

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::DeviceId;

/// Environment variable that overrides the configuration file location.
pub const CONFIG_PATH_ENV: &str = "VELOLOCK_CONFIG";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

static BROKER_URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(mqtts?|tcp|ssl)://[A-Za-z0-9.\-]+(:\d{1,5})?/?$").expect("valid regex")
});

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Config`].
    #[error("Invalid configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// One field holds an invalid value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted field path, e.g. `mqtt.broker_url`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener.
    pub server: ServerConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Broker connection.
    pub mqtt: MqttConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}

impl ServerConfig {
    /// `host:port` for the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSON file logging instead of pretty stdout.
    pub production: bool,
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            production: false,
            level: "info".to_string(),
        }
    }
}

/// Broker connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Connect to the broker. When `false`, commands are only logged.
    pub enabled: bool,
    /// `mqtt://host:port` or `mqtts://host:port`.
    pub broker_url: String,
    /// Broker username.
    pub username: Option<String>,
    /// Broker password.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Client id; a random suffix is added when absent.
    pub client_id: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// Device that messages on unscoped status topics are attributed to.
    pub device_mac: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_url: "mqtt://localhost:1883".to_string(),
            username: None,
            password: None,
            client_id: None,
            keep_alive_secs: 30,
            device_mac: None,
        }
    }
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("enabled", &self.enabled)
            .field("broker_url", &self.broker_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("client_id", &self.client_id)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("device_mac", &self.device_mac)
            .finish()
    }
}

impl MqttConfig {
    /// The configured fallback device, if it normalizes.
    #[must_use]
    pub fn fallback_device(&self) -> Option<DeviceId> {
        self.device_mac
            .as_deref()
            .and_then(|mac| DeviceId::parse(mac).ok())
    }
}

/// Returns `true` if `url` is a broker URL the client can connect to.
#[must_use]
pub fn is_valid_broker_url(url: &str) -> bool {
    BROKER_URL_PATTERN.is_match(url)
}

/// Returns `true` if `level` is a tracing level name.
#[must_use]
pub fn is_valid_log_level(level: &str) -> bool {
    LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
}

/// Returns the configuration file location.
///
/// `VELOLOCK_CONFIG` wins when set. Otherwise `/etc/velolock/config.toml` on
/// Linux and the platform config directory elsewhere.
///
/// # Errors
///
/// Returns an error if no platform config directory can be determined.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }

    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/etc/velolock/config.toml"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let dirs = directories::ProjectDirs::from("", "", "velolock")
            .ok_or_else(|| ConfigError::invalid("path", "Cannot determine config directory"))?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

impl Config {
    /// Loads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, unparsable, or
    /// fails validation.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration at `path`, or the defaults if there is none.
    ///
    /// # Errors
    ///
    /// As [`Config::load_from`], except that a missing file is not an error.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        match Self::load_from(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Loads from [`default_config_path`], falling back to defaults.
    ///
    /// # Errors
    ///
    /// See [`Config::load_or_default`].
    pub fn load() -> ConfigResult<Self> {
        Self::load_or_default(&default_config_path()?)
    }

    /// Writes the configuration to `path`, creating parent directories.
    ///
    /// The broker password is never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be serialized or written.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_error = |source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)
    }

    /// Checks every field and reports all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the single error, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push(ConfigError::invalid("server.host", "must not be empty"));
        }
        if self.server.port == 0 {
            errors.push(ConfigError::invalid("server.port", "must be greater than 0"));
        }
        if !is_valid_log_level(&self.logging.level) {
            errors.push(ConfigError::invalid(
                "logging.level",
                format!("must be one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        if !is_valid_broker_url(&self.mqtt.broker_url) {
            errors.push(ConfigError::invalid(
                "mqtt.broker_url",
                format!("'{}' is not an mqtt:// or mqtts:// URL", self.mqtt.broker_url),
            ));
        }
        if self.mqtt.keep_alive_secs == 0 || self.mqtt.keep_alive_secs > u64::from(u16::MAX) {
            errors.push(ConfigError::invalid(
                "mqtt.keep_alive_secs",
                "must be between 1 and 65535",
            ));
        }
        if self.mqtt.password.is_some() && self.mqtt.username.is_none() {
            errors.push(ConfigError::invalid(
                "mqtt.password",
                "requires mqtt.username",
            ));
        }
        if let Some(mac) = &self.mqtt.device_mac {
            if DeviceId::parse(mac).is_err() {
                errors.push(ConfigError::invalid(
                    "mqtt.device_mac",
                    format!("'{mac}' contains no hex digits"),
                ));
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_address(), "0.0.0.0:4000");
        assert!(!config.mqtt.enabled);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::NotFound(_))
        ));
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 8080

[mqtt]
enabled = true
broker_url = "mqtts://broker.example.com:8883"
username = "fleet"
password = "secret"
device_mac = "aa:bb:cc:dd:ee:ff"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(config.mqtt.enabled);
        assert_eq!(config.mqtt.keep_alive_secs, 30);
        assert_eq!(
            config.mqtt.fallback_device().map(|id| id.to_string()),
            Some("AABBCCDDEEFF".to_string())
        );
    }

    #[test]
    fn test_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.server.port = 0;
        config.logging.level = "loud".to_string();
        config.mqtt.broker_url = "http://broker".to_string();

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => {
                assert_eq!(errors.len(), 3);
                assert_eq!(errors[0].to_string(), "server.port: must be greater than 0");
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_single_validation_error() {
        let mut config = Config::default();
        config.mqtt.device_mac = Some("zz".to_string());

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "mqtt.device_mac"
        ));
    }

    #[test]
    fn test_save_omits_password() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.mqtt.username = Some("fleet".to_string());
        config.mqtt.password = Some("secret".to_string());
        config.save(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("secret"));

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.mqtt.username.as_deref(), Some("fleet"));
        assert_eq!(reloaded.mqtt.password, None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = MqttConfig {
            password: Some("secret".to_string()),
            ..MqttConfig::default()
        };
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_broker_url_and_level_validators() {
        assert!(is_valid_broker_url("mqtt://localhost:1883"));
        assert!(is_valid_broker_url("mqtts://broker.example.com"));
        assert!(!is_valid_broker_url("http://localhost:1883"));
        assert!(!is_valid_broker_url("mqtt://"));

        assert!(is_valid_log_level("DEBUG"));
        assert!(!is_valid_log_level("verbose"));
    }
}
