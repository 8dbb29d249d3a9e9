//! Error types for the ABCI server.

use thiserror::Error;

use crate::codec::FrameError;

/// ABCI server errors
#[derive(Error, Debug)]
pub enum AbciError {
    /// Framing failure on the socket, fatal to the connection
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Frame payload is not a valid Request
    #[error("failed to decode request: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Socket or filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Request case the server does not know how to answer
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// The application refused to continue; the connection is torn down
    #[error("application error: {0}")]
    Application(String),

    /// Server lifecycle error
    #[error("server error: {0}")]
    ServerError(String),
}

impl AbciError {
    /// Error code reported in logs and exception responses
    pub fn code(&self) -> u32 {
        match self {
            AbciError::Frame(_) => 1,
            AbciError::Decode(_) => 2,
            AbciError::Io(_) => 3,
            AbciError::UnknownRequest(_) => 4,
            AbciError::Application(_) => 5,
            AbciError::ServerError(_) => 99,
        }
    }
}

pub type Result<T> = std::result::Result<T, AbciError>;
