//! Client Configuration
//!
//! Where to connect and how long to wait for the transport.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Environment Variables
//!
//! - `SUPERVISOR_URL`: connect target (`http://...` or `unix://...sock[/path]`)
//! - `SUPERVISOR_CONNECT_TIMEOUT`: dial timeout in ms, `0` for none
//!
//! # Example Configuration
//!
//! `$XDG_CONFIG_HOME/supervisor-client/client.toml`:
//!
//! ```toml
//! [client]
//! url = "unix:///var/run/supervisor.sock/RPC2"
//! connect_timeout_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::Target;

/// Default connect target (supervisord's stock inet_http_server)
pub const DEFAULT_URL: &str = "http://localhost:9001/RPC2";

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// `[client]` section of the TOML file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Connect target
    pub url: Option<String>,

    /// Dial timeout in milliseconds (0 = none)
    pub connect_timeout_ms: Option<u64>,
}

/// Root of the TOML file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFileToml {
    /// Client section
    pub client: ClientToml,
}

/// Resolved client configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connect target
    pub url: String,

    /// Dial timeout in milliseconds (0 = no timeout)
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            connect_timeout_ms: 0,
        }
    }
}

impl ClientConfig {
    /// Configuration for a target with no dial timeout
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the dial timeout
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// The dial timeout, if any
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    /// Defaults overlaid with environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Overlay values from an environment lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SUPERVISOR_URL").filter(|v| !v.trim().is_empty()) {
            self.url = url;
        }
        if let Some(ms) = lookup("SUPERVISOR_CONNECT_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.connect_timeout_ms = ms;
        }
    }

    /// Overlay values from a parsed TOML file
    pub fn apply_toml(&mut self, file: &ConfigFileToml) {
        if let Some(ref url) = file.client.url {
            self.url.clone_from(url);
        }
        if let Some(ms) = file.client.connect_timeout_ms {
            self.connect_timeout_ms = ms;
        }
    }

    /// Check that the target is one the transport layer can resolve
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for an unusable `url`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Target::parse(&self.url)
            .map(|_| ())
            .map_err(|e| ConfigError::ValidationError(format!("url '{}': {e}", self.url)))
    }
}

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/supervisor-client/client.toml` or
/// `~/.config/supervisor-client/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("supervisor-client").join("client.toml"))
}

/// Read and parse a configuration file, without any environment overlay
///
/// # Errors
///
/// Returns `ConfigError::ReadError` if the file cannot be read and
/// `ConfigError::ParseError` if it is not valid TOML.
pub fn read_config_file(path: &Path) -> Result<ConfigFileToml, ConfigError> {
    let toml_content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(toml::from_str(&toml_content)?)
}

/// Load configuration from the default file and the environment
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed, or if the
/// resulting target is invalid.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the environment
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. A missing file is not an
///   error; defaults and environment variables still apply.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed, or if the
/// resulting target is invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            config.apply_toml(&read_config_file(config_path)?);
            tracing::debug!(path = ?config_path, "Loaded client config file");
        }
    }

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
