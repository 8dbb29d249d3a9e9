//! CometBFT ABCI v1 message definitions.
//!
//! The engine talks to the application over a socket with `cometbft.abci.v1`
//! `Request`/`Response` envelopes. The messages are declared by hand with
//! `prost` derives so the workspace builds without `protoc` or a build script.
//! Only the fields the adapter reads or writes matter to us, but every field
//! of the upstream schema that carries data is declared so that decoding is
//! lossless.

mod requests;
mod responses;
pub mod types;

pub use prost::Message;
pub use prost_types::{Duration, Timestamp};

pub use requests::*;
pub use responses::*;
pub use types::*;
