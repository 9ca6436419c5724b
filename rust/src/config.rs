//! Configuration loader. Values come from an optional JSON file and are then
//! overridden by environment variables, so a bare `PORT=8080` deployment works
//! without any file on disk.

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vault::gate::DEFAULT_MARKERS;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SCRIPT_VAULT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "script-vault.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(String),
    #[error("config parse failed: {0}")]
    Parse(String),
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct VaultConfig {
    pub bind_host: String,
    pub port: u16,
    /// Snapshot file holding every script.
    pub database_path: PathBuf,
    /// Base used in generated loadstrings; derived from the `Host` header when unset.
    pub public_base_url: Option<String>,
    pub body_limit_bytes: usize,
    /// Substrings a client identity must contain to fetch raw scripts.
    pub allowed_client_markers: Vec<String>,
    pub log_level: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
            database_path: PathBuf::from("scripts.json"),
            public_base_url: None,
            body_limit_bytes: 10 * 1024,
            allowed_client_markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
            log_level: "info".to_string(),
        }
    }
}

impl VaultConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_host, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                name: "bindHost",
                reason: format!("{e}"),
            })
    }

    /// Applies overrides from any source that maps variable names to values.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|e| ConfigError::InvalidValue {
                name: "PORT",
                reason: format!("{e}"),
            })?;
        }
        if let Some(host) = lookup("SCRIPT_VAULT_BIND") {
            self.bind_host = host;
        }
        if let Some(path) = lookup("SCRIPT_VAULT_DB") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("SCRIPT_VAULT_PUBLIC_URL") {
            self.public_base_url = Some(url);
        }
        if let Some(level) = lookup("SCRIPT_VAULT_LOG") {
            self.log_level = level;
        }
        Ok(())
    }

    fn validate(mut self) -> Result<Self, ConfigError> {
        if self.body_limit_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                name: "bodyLimitBytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.allowed_client_markers.iter().all(|m| m.is_empty()) {
            return Err(ConfigError::InvalidValue {
                name: "allowedClientMarkers",
                reason: "at least one non-empty marker is required".to_string(),
            });
        }
        self.public_base_url = self
            .public_base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        Ok(self)
    }
}

/// Reads the JSON file at `path`. A missing file yields the defaults.
pub fn load_file(path: impl AsRef<Path>) -> Result<VaultConfig, ConfigError> {
    match fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(format!("{e}"))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(VaultConfig::default()),
        Err(err) => Err(ConfigError::Io(format!("{}: {err}", path.as_ref().display()))),
    }
}

/// Loads the config file named by `SCRIPT_VAULT_CONFIG` and applies
/// environment overrides.
pub fn load_config() -> Result<VaultConfig, ConfigError> {
    let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config_with(path, |name| env::var(name).ok())
}

pub fn load_config_with(
    path: impl AsRef<Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<VaultConfig, ConfigError> {
    let mut config = load_file(path)?;
    config.apply_overrides(lookup)?;
    config.validate()
}
