//! Adapter configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::transactions::DEFAULT_CACHE_SIZE;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error on a configuration artifact
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("toml parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// JSON document could not be parsed or written
    #[error("invalid json in {what}: {source}")]
    Json {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// Required option not set
    #[error("missing required option: {0}")]
    Missing(&'static str),

    /// Option set to an unusable value
    #[error("invalid option {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Consensus adapter configuration.
///
/// The engine's own documents (genesis, keys) are carried as opaque JSON and
/// written verbatim into the engine home.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CometConfig {
    /// Engine home directory (`--home`)
    pub home: PathBuf,

    /// Engine executable, looked up in `PATH` when relative
    pub executable: PathBuf,

    /// Genesis document, inline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genesis: Option<serde_json::Value>,

    /// Genesis document, read from a file when `genesis` is not set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genesis_file: Option<PathBuf>,

    /// Validator private key document (`priv_validator_key.json`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priv_validator_key: Option<serde_json::Value>,

    /// Node key document (`node_key.json`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_key: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub p2p_port: Option<u16>,

    /// Engine RPC port. Outbound calls are unavailable without it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_port: Option<u16>,

    /// Host the engine RPC listens on and the adapter connects to
    pub rpc_host: String,

    /// Persistent peers, `<node-id>@<host>:<port>`
    pub peers: Vec<String>,

    /// Produce blocks only when there are transactions, with zero timeouts
    pub step_mode: bool,

    /// Spawn and supervise the engine process. When false the engine is
    /// managed elsewhere and only connects to the socket.
    pub launch_engine: bool,

    /// Run the engine's offline inspection before starting it
    pub inspect: bool,

    /// Wipe the engine data directory when inspection finds it unusable
    pub wipe_on_inconsistency: bool,

    /// ABCI socket path, `<home>/abci.sock` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abci_socket: Option<PathBuf>,

    /// How long the engine has to reach the ABCI socket and RPC after launch
    pub handshake_timeout_ms: u64,

    /// Per-request timeout for outbound RPC calls
    pub rpc_timeout_ms: u64,

    /// Transactions larger than this are refused without an RPC call
    pub max_tx_bytes: usize,

    /// Value forced into the engine's `rpc.max_body_bytes`
    pub rpc_max_body_bytes: u64,

    /// Entries per bucket of the finalized-transaction cache, 0 to disable
    pub tx_cache_size: usize,
}

impl Default for CometConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(".cometbft"),
            executable: PathBuf::from("cometbft"),
            genesis: None,
            genesis_file: None,
            priv_validator_key: None,
            node_key: None,
            p2p_port: None,
            rpc_port: None,
            rpc_host: "127.0.0.1".to_string(),
            peers: Vec::new(),
            step_mode: false,
            launch_engine: true,
            inspect: true,
            wipe_on_inconsistency: false,
            abci_socket: None,
            handshake_timeout_ms: 10_000,
            rpc_timeout_ms: 5_000,
            max_tx_bytes: 1024 * 1024,
            rpc_max_body_bytes: 200_000_000,
            tx_cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl CometConfig {
    /// Config rooted at `home` with defaults elsewhere
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config: CometConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| ConfigError::io(path, e))?;
        Ok(())
    }

    /// Check the options that can be checked without touching the engine
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.home.as_os_str().is_empty() {
            return Err(ConfigError::Missing("home"));
        }
        if self.genesis.is_none() && self.genesis_file.is_none() {
            return Err(ConfigError::Missing("genesis"));
        }
        if self.launch_engine {
            if self.p2p_port.is_none() {
                return Err(ConfigError::Missing("p2p_port"));
            }
            if self.rpc_port.is_none() {
                return Err(ConfigError::Missing("rpc_port"));
            }
        }
        if self.p2p_port.is_some() && self.p2p_port == self.rpc_port {
            return Err(ConfigError::Invalid {
                name: "rpc_port",
                reason: "must differ from p2p_port".to_string(),
            });
        }
        if self.max_tx_bytes == 0 {
            return Err(ConfigError::Invalid {
                name: "max_tx_bytes",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// The genesis document, inline or loaded from `genesis_file`
    pub fn load_genesis(&self) -> Result<serde_json::Value, ConfigError> {
        if let Some(genesis) = &self.genesis {
            return Ok(genesis.clone());
        }
        let path = self
            .genesis_file
            .as_ref()
            .ok_or(ConfigError::Missing("genesis"))?;
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            what: path.display().to_string(),
            source,
        })
    }

    pub fn socket_path(&self) -> PathBuf {
        self.abci_socket
            .clone()
            .unwrap_or_else(|| self.home.join("abci.sock"))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}
