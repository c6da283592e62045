//! TOML config overlay (§4.10, §6): an optional file layered underneath
//! explicit CLI flags, in the style of the teacher's per-role `Config`
//! structs — serde-deserialized with defaults for every tunable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
#[non_exhaustive]
pub struct ClientConfig {
    pub name: String,
    pub addresses: Vec<String>,
    pub ca_bundle: PathBuf,
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    #[serde(default = "defaults::ring_capacity")]
    pub ring_capacity: usize,
    #[serde(with = "humantime_serde", default = "defaults::stats_period")]
    pub stats_period: Duration,
    #[serde(with = "humantime_serde", default = "defaults::flush_period")]
    pub flush_period: Duration,
    #[serde(with = "humantime_serde", default = "defaults::handshake_timeout")]
    pub handshake_timeout: Duration,
    #[serde(with = "humantime_serde", default = "defaults::failover_backoff")]
    pub failover_backoff: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
#[non_exhaustive]
pub struct CollectorConfig {
    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    pub ca_bundle: PathBuf,
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    #[serde(with = "humantime_serde", default = "defaults::stats_period")]
    pub stats_period: Duration,
    #[serde(with = "humantime_serde", default = "defaults::ack_batch_period")]
    pub ack_batch_period: Duration,
}

impl ClientConfig {
    /// Load from a TOML file, resolving relative paths against the file's
    /// own directory the same way the teacher's `Config::load` does.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<ClientConfig> {
        let mut config: ClientConfig = toml::from_str(&tokio::fs::read_to_string(&path).await?)?;
        let dir = path
            .as_ref()
            .parent()
            .expect("config path must have a parent directory");
        config.ca_bundle = dir.join(&config.ca_bundle);
        config.certificate = dir.join(&config.certificate);
        config.private_key = dir.join(&config.private_key);
        Ok(config)
    }
}

impl CollectorConfig {
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<CollectorConfig> {
        let mut config: CollectorConfig = toml::from_str(&tokio::fs::read_to_string(&path).await?)?;
        let dir = path
            .as_ref()
            .parent()
            .expect("config path must have a parent directory");
        config.ca_bundle = dir.join(&config.ca_bundle);
        config.certificate = dir.join(&config.certificate);
        config.private_key = dir.join(&config.private_key);
        Ok(config)
    }
}
