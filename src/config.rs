//! Configuration management for powledger

use crate::error::{ChainError, Result};
use crate::transaction::generate_transaction_id;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Public URL of this node; defaults to `http://localhost:<api_port>`.
    #[serde(default)]
    pub node_url: Option<String>,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_reward")]
    pub reward: f64,
    #[serde(default = "default_reward_sender")]
    pub reward_sender: String,
    /// Recipient of mining rewards; a random id when unset.
    #[serde(default = "generate_transaction_id")]
    pub node_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            node_url: None,
            bootstrap_peers: Vec::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            reward: default_reward(),
            reward_sender: default_reward_sender(),
            node_address: generate_transaction_id(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl NetworkConfig {
    pub fn node_url(&self) -> String {
        self.node_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.api_port))
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.network.api_port == 0 {
            return Err(ChainError::ConfigError(
                "network.api_port must be non-zero".to_string(),
            ));
        }
        if self.network.request_timeout_secs == 0 {
            return Err(ChainError::ConfigError(
                "network.request_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.miner.node_address.is_empty() {
            return Err(ChainError::ConfigError(
                "miner.node_address must not be empty".to_string(),
            ));
        }
        if !self.miner.reward.is_finite() {
            return Err(ChainError::ConfigError(
                "miner.reward must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config: Config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)?
    } else {
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

fn default_api_port() -> u16 {
    3001
}

fn default_request_timeout() -> u64 {
    10
}

fn default_reward() -> f64 {
    12.5
}

fn default_reward_sender() -> String {
    "00".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
