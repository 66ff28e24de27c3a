//! Coordinator configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use hydra_core::PartyId;
use serde::{Deserialize, Serialize};

/// A party and the API port its node was given by the node manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyEndpoint {
    pub id: PartyId,
    pub api_port: u16,
}

/// Coordinator configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Root of the per-party key directories.
    pub key_store: PathBuf,

    #[serde(default = "default_cardano_cli")]
    pub cardano_cli: PathBuf,

    #[serde(default = "default_testnet_magic")]
    pub testnet_magic: u32,

    /// Host the party nodes listen on.
    #[serde(default = "default_node_host")]
    pub node_host: String,

    #[serde(default = "default_channel_timeout_ms")]
    pub channel_timeout_ms: u64,

    #[serde(default = "default_status_timeout_ms")]
    pub status_timeout_ms: u64,

    /// Deadline for a single ledger CLI invocation.
    #[serde(default = "default_cli_timeout_ms")]
    pub cli_timeout_ms: u64,

    #[serde(default = "default_history_depth")]
    pub snapshot_history_depth: usize,

    #[serde(default)]
    pub parties: Vec<PartyEndpoint>,
}

fn default_cardano_cli() -> PathBuf {
    PathBuf::from("cardano-cli")
}

fn default_testnet_magic() -> u32 {
    1
}

fn default_node_host() -> String {
    "127.0.0.1".to_string()
}

fn default_channel_timeout_ms() -> u64 {
    5_000
}

fn default_status_timeout_ms() -> u64 {
    10_000
}

fn default_cli_timeout_ms() -> u64 {
    30_000
}

fn default_history_depth() -> usize {
    hydra_state::history::DEFAULT_HISTORY_DEPTH
}

impl CoordinatorConfig {
    /// A configuration with defaults for everything but the key store.
    pub fn new(key_store: impl Into<PathBuf>) -> Self {
        Self {
            key_store: key_store.into(),
            cardano_cli: default_cardano_cli(),
            testnet_magic: default_testnet_magic(),
            node_host: default_node_host(),
            channel_timeout_ms: default_channel_timeout_ms(),
            status_timeout_ms: default_status_timeout_ms(),
            cli_timeout_ms: default_cli_timeout_ms(),
            snapshot_history_depth: default_history_depth(),
            parties: Vec::new(),
        }
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut config: CoordinatorConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;

        if config.key_store.is_relative() {
            if let Some(base) = path.parent() {
                config.key_store = base.join(&config.key_store);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for party in &self.parties {
            if party.id.is_empty() {
                bail!("party with api_port {} has an empty id", party.api_port);
            }
            if !seen.insert(party.id.as_str()) {
                bail!("party '{}' is configured twice", party.id);
            }
        }
        if self.channel_timeout_ms == 0 {
            bail!("channel_timeout_ms must be positive");
        }
        Ok(())
    }

    /// API port of a party's node.
    pub fn port_of(&self, party: &str) -> Option<u16> {
        self.parties
            .iter()
            .find(|p| p.id == party)
            .map(|p| p.api_port)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn cli_timeout(&self) -> Duration {
        Duration::from_millis(self.cli_timeout_ms)
    }
}
