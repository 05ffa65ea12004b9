use super::types::ConfigOverrides;
use crate::error_handling::types::ConfigError;
use log::debug;
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_LOG_PATH: &str = "requests_log.csv";
pub const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// Runtime configuration of the capture service.
///
/// Values are resolved in three layers, each overriding the previous one:
/// built-in defaults, an optional TOML file, then command-line flags and
/// their `SNARE_*` environment variables.
///
/// # Examples
///
/// ```
/// use snare::configuration::Config;
///
/// let config = Config::from_toml_str("port = 8080\nhoneypot_name = \"web-01\"").unwrap();
/// assert_eq!(config.port, 8080);
/// assert_eq!(config.log_path.to_str(), Some("requests_log.csv"));
/// ```
///
/// # Fields Overview
///
/// - `bind_address`: IP address the listener binds to
/// - `port`: TCP port of the listener
/// - `log_path`: CSV file the captured requests are appended to
/// - `honeypot_name`: identifier stored with every row, may be empty
/// - `max_body_bytes`: bodies declaring a larger length are not read
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bind_address: IpAddr,
    pub port: u16,
    pub log_path: PathBuf,
    pub honeypot_name: String,
    pub max_body_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            honeypot_name: String::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(addr) = overrides.bind_address {
            self.bind_address = addr;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(ref path) = overrides.log_path {
            self.log_path = path.clone();
        }
        if let Some(ref name) = overrides.honeypot_name {
            self.honeypot_name = name.clone();
        }
        if let Some(max) = overrides.max_body_bytes {
            self.max_body_bytes = max;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("log_path must not be empty".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "max_body_bytes must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolves the full configuration: defaults, then `config_file` if
    /// given, then `overrides`, and validates the result.
    pub fn load(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
