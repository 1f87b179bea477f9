//! Daemon configuration.
//!
//! A TOML file with `[network]`, `[p2p]`, `[api]`, `[mining]` and
//! `[seed_nodes]` sections, written with defaults on first boot so a fresh
//! data directory is immediately usable.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file does not parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config file could not be written: {0}")]
    Write(#[from] toml::ser::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[serde(rename = "NETWORK")]
    pub network: NetworkSection,
    #[serde(rename = "P2P")]
    pub p2p: P2pSection,
    #[serde(rename = "API")]
    pub api: ApiSection,
    #[serde(rename = "MINING")]
    pub mining: MiningSection,
    /// Label → `host:port` entries dialed at startup.
    #[serde(rename = "SEED_NODES")]
    pub seed_nodes: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSection {
    pub host: String,
    pub data_dir: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct P2pSection {
    pub port: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSection {
    /// The explorer API port; the RPC listener binds one above it.
    pub port: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiningSection {
    /// The wallet whose address collects block rewards. Empty disables the
    /// built-in miner.
    pub wallet: String,
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: NetworkSection::default(),
            p2p: P2pSection::default(),
            api: ApiSection::default(),
            mining: MiningSection::default(),
            seed_nodes: BTreeMap::new(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        NetworkSection {
            host: "127.0.0.1".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for P2pSection {
    fn default() -> Self {
        P2pSection { port: 8889 }
    }
}

impl Default for ApiSection {
    fn default() -> Self {
        ApiSection { port: 8001 }
    }
}

impl Default for MiningSection {
    fn default() -> Self {
        MiningSection {
            wallet: String::new(),
            enabled: true,
        }
    }
}

impl Config {
    /// The RPC port is pinned one above the API port.
    pub fn rpc_port(&self) -> u16 {
        self.api.port + 1
    }

    /// Load `path`, writing a default config there first if none exists.
    pub fn load_or_create(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            warn!(?path, "no config file found, writing defaults");
            let config = Config::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, toml::to_string_pretty(&config)?)?;
            return Ok(config);
        }
        debug!(?path, "loading config");
        let config: Config = toml::from_str(&fs::read_to_string(path)?)?;
        if config.mining.enabled && config.mining.wallet.is_empty() {
            warn!("[mining] has no wallet configured; the miner will not start");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn first_boot_writes_defaults_and_reloads() {
        let dir = TempDir::new("kerneld-config").unwrap();
        let path = dir.path().join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.p2p.port, 8889);
        assert_eq!(created.rpc_port(), 8002);

        let reloaded = Config::load_or_create(&path).unwrap();
        assert_eq!(reloaded.network.host, "127.0.0.1");
        assert!(reloaded.seed_nodes.is_empty());
    }

    #[test]
    fn sections_parse_from_toml() {
        let raw = r#"
            [NETWORK]
            host = "0.0.0.0"
            data_dir = "/var/lib/kernel"

            [P2P]
            port = 9000

            [API]
            port = 9100

            [MINING]
            wallet = "miner"
            enabled = true

            [SEED_NODES]
            alpha = "10.0.0.1:8889"
            beta = "10.0.0.2:8889"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.network.host, "0.0.0.0");
        assert_eq!(config.p2p.port, 9000);
        assert_eq!(config.mining.wallet, "miner");
        assert_eq!(config.seed_nodes.len(), 2);
        assert_eq!(config.seed_nodes["alpha"], "10.0.0.1:8889");
    }
}
