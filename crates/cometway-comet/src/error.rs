//! Adapter errors and their stable error codes.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::rpc::RpcError;
use crate::state::AdapterState;

/// Coarse classification reported through `Comet::error_code`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None,
    Error,
    Fatal,
    Config,
    Data,
    Run,
    RunTimeout,
    Fail,
    RpcTimeout,
    RpcCallFailed,
    RpcBadResponse,
    AbciServerFailed,
    AbciTimeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::None => "NONE",
            ErrorCode::Error => "ERROR",
            ErrorCode::Fatal => "FATAL",
            ErrorCode::Config => "CONFIG",
            ErrorCode::Data => "DATA",
            ErrorCode::Run => "RUN",
            ErrorCode::RunTimeout => "RUN_TIMEOUT",
            ErrorCode::Fail => "FAIL",
            ErrorCode::RpcTimeout => "RPC_TIMEOUT",
            ErrorCode::RpcCallFailed => "RPC_CALL_FAILED",
            ErrorCode::RpcBadResponse => "RPC_BAD_RESPONSE",
            ErrorCode::AbciServerFailed => "ABCI_SERVER_FAILED",
            ErrorCode::AbciTimeout => "ABCI_TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consensus adapter errors
#[derive(Error, Debug)]
pub enum CometError {
    /// Missing or unusable configuration, I/O on the engine home
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Engine output or persisted data that does not make sense
    #[error("bad engine data: {0}")]
    Data(String),

    /// Persisted engine state that can only be fixed by wiping it
    #[error("inconsistent engine state: {0}")]
    Inconsistent(String),

    /// A helper command could not be run or exited with failure
    #[error("failed to run {command}: {reason}")]
    Run { command: String, reason: String },

    /// A helper command did not finish in time
    #[error("{command} timed out")]
    RunTimeout { command: String },

    /// The engine process failed to start or exited
    #[error("engine process failed: {0}")]
    Engine(String),

    /// Outbound RPC failure
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The ABCI server could not start or has failed
    #[error("ABCI server failed: {0}")]
    AbciServer(String),

    /// The engine never talked to the ABCI socket
    #[error("timed out waiting for the engine to connect over ABCI")]
    AbciTimeout,

    /// The engine and the application disagree on the chain
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("illegal state transition from {from} to {to}")]
    IllegalTransition {
        from: AdapterState,
        to: AdapterState,
    },

    #[error("timed out waiting for pause state")]
    PauseTimeout,

    /// A previously recorded fatal error, reported to a waiter
    #[error("{message}")]
    Failed { code: ErrorCode, message: String },

    /// No tokio runtime to run the adapter on
    #[error("runtime unavailable: {0}")]
    Runtime(String),

    /// Stop was requested; unwinds the worker without being an error
    #[error("stop requested")]
    Stopped,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CometError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CometError::Config(_) => ErrorCode::Config,
            CometError::Data(_) | CometError::Inconsistent(_) => ErrorCode::Data,
            CometError::Run { .. } => ErrorCode::Run,
            CometError::RunTimeout { .. } | CometError::PauseTimeout => ErrorCode::RunTimeout,
            CometError::Engine(_) => ErrorCode::Fail,
            CometError::Rpc(e) => e.code(),
            CometError::AbciServer(_) => ErrorCode::AbciServerFailed,
            CometError::AbciTimeout => ErrorCode::AbciTimeout,
            CometError::Protocol(_) | CometError::IllegalTransition { .. } => ErrorCode::Fatal,
            CometError::Failed { code, .. } => *code,
            CometError::Stopped => ErrorCode::None,
            CometError::Runtime(_) | CometError::Io(_) => ErrorCode::Error,
        }
    }
}

impl From<cometway_abci::AbciError> for CometError {
    fn from(err: cometway_abci::AbciError) -> Self {
        CometError::AbciServer(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CometError>;
