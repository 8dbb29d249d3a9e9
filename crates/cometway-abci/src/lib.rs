//! ABCI socket server for the CometBFT engine.
//!
//! The engine connects to a Unix socket and sends varint-framed protobuf
//! requests ([`codec`]). Every accepted connection runs as a [`Session`]
//! task that answers its requests strictly in order through an
//! [`AbciHandler`]. The [`NetServer`] tracks the sessions and tears all of
//! them down on the first fatal error; [`AbciServer`] wraps it with a
//! start/stop/running lifecycle.

pub mod codec;
pub mod error;
pub mod handler;
pub mod net_server;
pub mod session;
pub mod server;

pub use codec::{read_frame, write_frame, FrameError, MAX_FRAME_SIZE};
pub use error::{AbciError, Result};
pub use handler::{dispatch, AbciHandler};
pub use net_server::NetServer;
pub use server::AbciServer;
pub use session::Session;
