//! Engine home provisioning.
//!
//! Writes the documents the adapter owns into the engine home and forces the
//! handful of `config.toml` settings the adapter depends on. Everything else
//! in those files is left as the engine wrote it.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use toml::{Table, Value as TomlValue};
use tracing::{debug, info, warn};

use crate::config::{CometConfig, ConfigError};

/// Paths inside an engine home directory
#[derive(Debug, Clone)]
pub struct EngineLayout {
    pub home: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_toml: PathBuf,
    pub genesis: PathBuf,
    pub node_key: PathBuf,
    pub priv_validator_key: PathBuf,
    pub priv_validator_state: PathBuf,
}

impl EngineLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let config_dir = home.join("config");
        let data_dir = home.join("data");
        Self {
            config_toml: config_dir.join("config.toml"),
            genesis: config_dir.join("genesis.json"),
            node_key: config_dir.join("node_key.json"),
            priv_validator_key: config_dir.join("priv_validator_key.json"),
            priv_validator_state: data_dir.join("priv_validator_state.json"),
            home,
            config_dir,
            data_dir,
        }
    }

    /// True when the engine has never been initialised here
    pub fn needs_init(&self) -> bool {
        !self.config_toml.exists()
    }
}

fn create_dir(path: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(path).map_err(|e| ConfigError::io(path, e))
}

fn write_json(path: &Path, what: &str, value: &Value) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Json {
        what: what.to_string(),
        source,
    })?;
    fs::write(path, content).map_err(|e| ConfigError::io(path, e))?;
    debug!("wrote {}", path.display());
    Ok(())
}

fn empty_validator_state() -> Value {
    serde_json::json!({ "height": "0", "round": 0, "step": 0 })
}

/// Write genesis, keys and a fresh validator state file where missing
pub fn write_documents(config: &CometConfig, layout: &EngineLayout) -> Result<(), ConfigError> {
    let genesis = config.load_genesis()?;
    if !genesis.is_object() {
        return Err(ConfigError::Invalid {
            name: "genesis",
            reason: "must be a JSON object".to_string(),
        });
    }

    create_dir(&layout.config_dir)?;
    create_dir(&layout.data_dir)?;

    write_json(&layout.genesis, "genesis", &genesis)?;
    if let Some(key) = &config.priv_validator_key {
        write_json(&layout.priv_validator_key, "priv_validator_key", key)?;
    }
    if let Some(key) = &config.node_key {
        write_json(&layout.node_key, "node_key", key)?;
    }
    if !layout.priv_validator_state.exists() {
        write_json(
            &layout.priv_validator_state,
            "priv_validator_state",
            &empty_validator_state(),
        )?;
    }
    Ok(())
}

/// Run `edit` on the table `name`, replacing a non-table value
fn with_section(table: &mut Table, name: &str, edit: impl FnOnce(&mut Table)) {
    let mut inner = match table.remove(name) {
        Some(TomlValue::Table(inner)) => inner,
        _ => Table::new(),
    };
    edit(&mut inner);
    table.insert(name.to_string(), TomlValue::Table(inner));
}

fn set(table: &mut Table, key: &str, value: impl Into<TomlValue>) {
    table.insert(key.to_string(), value.into());
}

/// Force the adapter's settings into a parsed `config.toml`
pub fn apply_overrides(doc: &mut Table, config: &CometConfig, socket: &Path) {
    set(doc, "abci", "socket");
    set(doc, "proxy_app", format!("unix://{}", socket.display()));

    with_section(doc, "storage", |storage| {
        set(storage, "discard_abci_responses", true);
    });

    with_section(doc, "p2p", |p2p| {
        if let Some(port) = config.p2p_port {
            set(p2p, "laddr", format!("tcp://0.0.0.0:{port}"));
        }
        set(p2p, "allow_duplicate_ip", true);
        set(p2p, "addr_book_strict", false);
        set(p2p, "persistent_peers", config.peers.join(","));
    });

    with_section(doc, "rpc", |rpc| {
        if let Some(port) = config.rpc_port {
            set(rpc, "laddr", format!("tcp://{}:{port}", config.rpc_host));
        }
        let max_body = i64::try_from(config.rpc_max_body_bytes).unwrap_or(i64::MAX);
        set(rpc, "max_body_bytes", max_body);
    });

    if config.step_mode {
        with_section(doc, "consensus", |consensus| {
            set(consensus, "create_empty_blocks", false);
            set(consensus, "timeout_propose", "1s");
            set(consensus, "timeout_propose_delta", "0s");
            set(consensus, "timeout_vote", "1s");
            set(consensus, "timeout_vote_delta", "0s");
            set(consensus, "timeout_commit", "0s");
        });
    }
}

/// Read, patch and rewrite the engine's `config.toml`.
///
/// A missing file is created with only the forced settings.
pub fn patch_config_toml(
    config: &CometConfig,
    layout: &EngineLayout,
    socket: &Path,
) -> Result<(), ConfigError> {
    create_dir(&layout.config_dir)?;
    let mut doc = match fs::read_to_string(&layout.config_toml) {
        Ok(content) => content.parse::<Table>()?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "{} not found, writing a minimal one",
                layout.config_toml.display()
            );
            Table::new()
        }
        Err(e) => return Err(ConfigError::io(&layout.config_toml, e)),
    };

    apply_overrides(&mut doc, config, socket);

    let content = toml::to_string_pretty(&doc)?;
    fs::write(&layout.config_toml, content).map_err(|e| ConfigError::io(&layout.config_toml, e))?;
    info!("patched {}", layout.config_toml.display());
    Ok(())
}

/// Remove the engine's block and state stores and reset the validator state
pub fn wipe_data(layout: &EngineLayout) -> Result<(), ConfigError> {
    warn!("wiping engine data directory {}", layout.data_dir.display());
    match fs::remove_dir_all(&layout.data_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ConfigError::io(&layout.data_dir, e)),
    }
    create_dir(&layout.data_dir)?;
    write_json(
        &layout.priv_validator_state,
        "priv_validator_state",
        &empty_validator_state(),
    )
}
