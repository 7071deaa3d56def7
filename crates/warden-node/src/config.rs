use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use warden_core::config::WatcherParams;

fn default_tick_interval() -> u64 {
    30
}

/// Everything the node binary reads from its JSON config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Directory for the sled database.
    pub data_dir: PathBuf,
    /// Watcher key file written by `keygen`.
    pub key_file: PathBuf,
    /// JSON-RPC endpoint of the target-chain node.
    pub chain_rpc_url: String,
    /// JSON-RPC endpoint of the observation scanner.
    pub scanner_rpc_url: String,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    pub watcher: WatcherParams,
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&json).context("parsing config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Report the first missing or invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chain_rpc_url.is_empty() {
            bail!("chain_rpc_url is not set");
        }
        if self.scanner_rpc_url.is_empty() {
            bail!("scanner_rpc_url is not set");
        }
        if self.tick_interval_secs == 0 {
            bail!("tick_interval_secs must be positive");
        }
        self.watcher.validate().context("invalid watcher parameters")?;
        Ok(())
    }
}
