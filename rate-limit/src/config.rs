//! Handler configuration loading and parsing

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/var/ossec/etc/rate-limit.toml";

/// Root configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub firewall: FirewallConfig,
    #[serde(default)]
    pub handshake: HandshakeConfig,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_file")]
    pub file: String,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FirewallConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_chain")]
    pub chain: String,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            chain: default_chain(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeConfig {
    /// 0 waits for the orchestrator indefinitely
    #[serde(default)]
    pub timeout_seconds: u64,
}

impl HandshakeConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

fn default_log_file() -> String { "/var/ossec/logs/rate-limit.log".into() }
fn default_log_level() -> String { "info".into() }
fn default_binary() -> String { "iptables".into() }
fn default_chain() -> String { "INPUT".into() }

/// Load configuration from `RATE_LIMIT_CONFIG` or the default path
pub fn load_config() -> Result<Config> {
    let config_path = std::env::var("RATE_LIMIT_CONFIG")
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from(&config_path)
}

pub fn load_from(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {config_path}"))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {config_path}"))?;
        Ok(config)
    } else {
        tracing::debug!("Config file not found at {config_path}, using defaults");
        Ok(Config::default())
    }
}
