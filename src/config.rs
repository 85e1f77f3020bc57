use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::str::FromStr;

use crate::error::ConfigError;

/// An EVM chain whose native token is monitored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url: String,
    pub native_token_symbol: String,
    /// Power of ten between the smallest unit and the display unit
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

/// Address with a label and the chains it is watched on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressConfig {
    pub address: String,
    pub label: String,
    pub chains: Vec<String>,
}

/// Application configuration from YAML or environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub addresses: Vec<AddressConfig>,
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_decimals() -> u32 {
    18
}

fn default_prometheus_port() -> u16 {
    8000
}

fn default_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from a YAML file when a path is given, from the environment otherwise
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {}", path))?;
        Self::from_yaml(&content).wrap_err_with(|| format!("Failed to parse {}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from `CHAINS_CONFIG`, `ADDRESSES_CONFIG`,
    /// `PROMETHEUS_PORT`, `UPDATE_INTERVAL` and `LOG_LEVEL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok().filter(|value| !value.is_empty()))
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let chains_json = lookup("CHAINS_CONFIG").ok_or(ConfigError::MissingVariable("CHAINS_CONFIG"))?;
        let chains: Vec<ChainConfig> = parse_json("CHAINS_CONFIG", &chains_json)?;

        let addresses_json =
            lookup("ADDRESSES_CONFIG").ok_or(ConfigError::MissingVariable("ADDRESSES_CONFIG"))?;
        let addresses: Vec<AddressConfig> = parse_json("ADDRESSES_CONFIG", &addresses_json)?;

        let prometheus_port = match lookup("PROMETHEUS_PORT") {
            Some(value) => parse_number("PROMETHEUS_PORT", &value)?,
            None => default_prometheus_port(),
        };
        let interval_secs = match lookup("UPDATE_INTERVAL") {
            Some(value) => parse_number("UPDATE_INTERVAL", &value)?,
            None => default_interval_secs(),
        };

        Ok(Config {
            chains,
            addresses,
            prometheus_port,
            interval_secs,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(default_log_level),
        })
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(field: &str, raw: &str) -> Result<T, ConfigError> {
    serde_json::from_str(raw).map_err(|e| ConfigError::Invalid {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn parse_number<T>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        field: field.to_string(),
        reason: e.to_string(),
    })
}
