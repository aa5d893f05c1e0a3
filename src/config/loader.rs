//! Configuration loading from disk and environment.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding the listener port.
pub const PORT_ENV: &str = "PORT";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid PORT value `{0}`")]
    InvalidPort(String),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub port: Option<u16>,
}

impl Overrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_port_var(std::env::var(PORT_ENV).ok())
    }

    /// Parse an optional raw `PORT` value. Empty counts as unset.
    pub fn from_port_var(raw: Option<String>) -> Result<Self, ConfigError> {
        let port = match raw.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(
                value
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPort(value.to_string()))?,
            ),
        };
        Ok(Self { port })
    }

    /// Layer `other` on top of `self`.
    pub fn merge(self, other: Overrides) -> Self {
        Self {
            port: other.port.or(self.port),
        }
    }

    fn apply(&self, config: &mut ServerConfig) {
        let Some(port) = self.port else { return };
        // An unparsable address is left alone for validation to report.
        if let Ok(mut addr) = config.listener.bind_address.parse::<SocketAddr>() {
            addr.set_port(port);
            config.listener.bind_address = addr.to_string();
        }
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    resolve(Some(path), &Overrides::default())
}

/// Build the effective configuration: file (or defaults), then overrides, then validation.
pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        }
        None => ServerConfig::default(),
    };

    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
