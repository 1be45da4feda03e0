//! YAML configuration for `chainlisten run`.
//!
//! ```yaml
//! rpc:
//!   url: http://localhost:8545
//!   timeout_ms: 10000
//! contract: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//! database: ./listener.db        # omit for in-memory storage
//! listener:
//!   id: membership
//!   max_block_range: 2048
//!   poll_interval_ms: 12000
//! log:
//!   level: info
//!   json: false
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use chainlisten_core::ListenerConfig;

use crate::logging::LogConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rpc_url() -> String {
    "http://localhost:8545".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Everything `chainlisten run` needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Membership contract address.
    #[serde(default)]
    pub contract: Option<String>,
    /// SQLite file; in-memory storage when absent.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Command-line values that win over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub rpc_url: Option<String>,
    pub contract: Option<String>,
    pub database: Option<String>,
    pub once: bool,
}

impl AppConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid configuration YAML")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&text)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(url) = overrides.rpc_url {
            self.rpc.url = url;
        }
        if let Some(contract) = overrides.contract {
            self.contract = Some(contract);
        }
        if let Some(database) = overrides.database {
            self.database = Some(database);
        }
        if overrides.once {
            self.listener.poll_interval_ms = None;
        }
    }

    /// The configured contract, parsed.
    pub fn contract_address(&self) -> Result<alloy_primitives::Address> {
        let raw = self
            .contract
            .as_deref()
            .ok_or_else(|| anyhow!("no contract address: set `contract` or pass --contract"))?;
        raw.parse()
            .with_context(|| format!("invalid contract address '{raw}'"))
    }
}
