//! Project configuration, read from `Caffeine.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{ensure_nonzero, parse_address, InvalidAddress};

pub const DEFAULT_CONFIG_PATH: &str = "Caffeine.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid deployer.treasury: {0}")]
    Treasury(#[source] InvalidAddress),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub deployer: DeployerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Label used in log output.
    pub name: String,
    /// Where the local chain keeps its state between script runs.
    pub state_path: PathBuf,
    /// Delay before each block is mined. Zero mines immediately.
    pub block_time_ms: u64,
    /// How long scripts wait for a confirmation before giving up.
    pub confirmation_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "localhost".into(),
            state_path: PathBuf::from(".caffeine/localhost.json"),
            block_time_ms: 0,
            confirmation_timeout_ms: 30_000,
        }
    }
}

impl NetworkConfig {
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    /// Seed for the deterministic development accounts.
    pub seed: u64,
    pub accounts: usize,
    /// Treasury for new factories. Defaults to the deployer account.
    pub treasury: Option<String>,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            seed: 1337,
            accounts: 10,
            treasury: None,
        }
    }
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&raw, path)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::parse(&raw, path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deployer.accounts == 0 {
            return Err(ConfigError::Invalid(
                "deployer.accounts must be at least 1".into(),
            ));
        }
        if self.network.confirmation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "network.confirmation_timeout_ms must be positive".into(),
            ));
        }
        self.treasury()?;
        Ok(())
    }

    /// The configured default treasury, strictly parsed.
    pub fn treasury(&self) -> Result<Option<Address>, ConfigError> {
        self.deployer
            .treasury
            .as_deref()
            .map(|literal| parse_address(literal).and_then(ensure_nonzero))
            .transpose()
            .map_err(ConfigError::Treasury)
    }
}
