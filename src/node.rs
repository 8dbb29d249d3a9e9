//! Node configuration file (`cometway.toml`)

use anyhow::{Context, Result};
use cometway_comet::CometConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Chain the demo application expects at genesis
    pub chain_id: String,

    /// Reported to the engine in `Info`
    pub instance_id: String,

    /// Filter directive, overridden by `--log-level`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    pub log_json: bool,

    pub comet: CometConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: "cometway-demo".to_string(),
            instance_id: "node-0".to_string(),
            log_level: None,
            log_json: false,
            comet: CometConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid configuration {}", path.display()))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}
