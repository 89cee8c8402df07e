//! Application configuration management.
//!
//! Handles loading, saving, and validating fallguard configuration including:
//! - The health band to connect to (name, GATT service and characteristic)
//! - Alert webhook endpoint and escalation countdown
//! - Data directory for the caregiver contact
//! - HTTP server bind address and logging mode
//!
//! Values are layered: built-in defaults, then the TOML file (if present), then
//! environment variables such as `FALLGUARD__ALERT__WEBHOOK_URL`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::contacts::default_data_dir;
use crate::escalation::DEFAULT_COUNTDOWN_SECS;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "FALLGUARD";

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The layered configuration could not be built or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field failed validation.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Health band to connect to.
    pub device: DeviceConfig,

    /// Alert escalation and delivery.
    pub alert: AlertConfig,

    /// Local persistence.
    pub storage: StorageConfig,

    /// HTTP control surface.
    pub server: ServerConfig,

    /// Logging mode.
    pub logging: LoggingConfig,
}

/// Health band identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Advertised name of the band.
    pub name: String,

    /// GATT service carrying the telemetry characteristic.
    pub service_uuid: Uuid,

    /// Notify characteristic that streams telemetry frames.
    pub characteristic_uuid: Uuid,

    /// How long to scan for the band before giving up.
    pub discovery_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "HealthBand".to_string(),
            service_uuid: Uuid::from_u128(0x4faf_c201_1fb5_459e_8fcc_c5c9_c331_914b),
            characteristic_uuid: Uuid::from_u128(0xbeb5_483e_36e1_4688_b7f5_ea07_361b_26a8),
            discovery_timeout_secs: 30,
        }
    }
}

/// Alert escalation and webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Webhook receiving the alert payload.
    pub webhook_url: String,

    /// Seconds between a fall being detected and the alert being sent.
    pub countdown_secs: u32,

    /// Timeout for the single webhook request.
    pub request_timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: "http://localhost:5678/webhook/fall-alert".to_string(),
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            request_timeout_secs: 15,
        }
    }
}

/// Local persistence locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `caregiver.json`.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API listens on.
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

/// Logging mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,

    /// JSON log files plus compact stdout instead of pretty stdout.
    pub production: bool,

    /// Directory for rolling log files in production mode.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            production: false,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, the TOML file at `path` (if it exists),
    /// and `FALLGUARD__*` environment variables, in that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or environment cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load_with_env(path.as_ref(), environment())
    }

    fn load_with_env(path: &Path, environment: config::Environment) -> ConfigResult<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No configuration file, using defaults");
        }

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(environment)
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from a file that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing.
    pub fn load_existing(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load(path)
    }

    /// Save configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every field, collecting all failures.
    ///
    /// # Errors
    ///
    /// Returns a single [`ConfigError::ValidationError`] or
    /// [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.device.name.trim().is_empty() {
            errors.push(invalid("device.name", "must not be empty"));
        }
        if self.device.discovery_timeout_secs == 0 {
            errors.push(invalid("device.discovery_timeout_secs", "must be at least 1"));
        }
        if let Err(message) = validate_webhook_url(&self.alert.webhook_url) {
            errors.push(invalid("alert.webhook_url", &message));
        }
        if self.alert.countdown_secs == 0 {
            errors.push(invalid("alert.countdown_secs", "must be at least 1"));
        }
        if self.alert.request_timeout_secs == 0 {
            errors.push(invalid("alert.request_timeout_secs", "must be at least 1"));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// `FALLGUARD__SECTION__KEY` overrides, e.g. `FALLGUARD__ALERT__COUNTDOWN_SECS=10`.
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Accepts absolute `http` and `https` URLs only.
fn validate_webhook_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("'{raw}' is not a valid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{other}', expected http or https")),
    }
}

/// Default configuration file location.
///
/// On Linux: `/etc/fallguard/config.toml`
/// Elsewhere: the platform config directory.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/fallguard/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "fallguard")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }
}
