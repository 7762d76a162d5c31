//! Configuration module
//!
//! Handles loading and saving WordWire configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::network::{AcceptMode, ListenerConfig};
use crate::protocol::{DEFAULT_PORT, DEFAULT_READ_TIMEOUT_MS};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Human-readable name for this server
    #[serde(default = "default_name")]
    pub name: String,
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Log file path (optional; stderr if unset)
    pub log_file: Option<PathBuf>,
}

fn default_name() -> String {
    "wordwire".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            verbose: false,
            log_file: None,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Ports to listen on; one independent worker per port
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
    /// Interface to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Idle timeout for a single read cycle, in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Accept behavior after the first connection per port
    #[serde(default)]
    pub accept_mode: AcceptMode,
}

fn default_ports() -> Vec<u16> {
    vec![DEFAULT_PORT]
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            bind_address: default_bind_address(),
            read_timeout_ms: default_read_timeout(),
            accept_mode: AcceptMode::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("wordwire/config.toml")),
            Some(PathBuf::from("./wordwire.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Per-port listener configurations derived from the network section
    pub fn listener_configs(&self) -> Vec<ListenerConfig> {
        self.network
            .ports
            .iter()
            .map(|&port| ListenerConfig {
                port,
                bind_address: self.network.bind_address.clone(),
                read_timeout_ms: self.network.read_timeout_ms,
                accept_mode: self.network.accept_mode,
            })
            .collect()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> String {
    let config = Config {
        general: GeneralConfig {
            name: "lab-server".to_string(),
            verbose: false,
            log_file: None,
        },
        network: NetworkConfig {
            ports: vec![DEFAULT_PORT, DEFAULT_PORT + 1],
            accept_mode: AcceptMode::Loop,
            ..Default::default()
        },
    };

    toml::to_string_pretty(&config).unwrap()
}
