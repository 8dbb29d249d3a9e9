//! CometBFT consensus adapter.
//!
//! [`Comet`] runs a CometBFT node on behalf of an application: it writes the
//! engine's configuration, serves the ABCI socket the engine connects to,
//! launches and supervises the engine process, and relays every block and
//! mempool check to the application's [`CometListener`]. Transactions and
//! block lookups go the other way over the engine's JSON-RPC endpoint.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use cometway_comet::{Comet, CometConfig, CometListener};
//! # async fn run(app: Arc<dyn CometListener>, config: CometConfig) -> cometway_comet::Result<()> {
//! let mut comet = Comet::new(app, "node-0", config);
//! comet.start()?;
//! // ... later
//! comet.stop().await;
//! # Ok(())
//! # }
//! ```

mod bridge;
pub mod comet;
pub mod config;
pub mod error;
pub mod listener;
pub mod process;
pub mod provision;
pub mod rpc;
pub mod state;
pub mod transactions;
mod worker;

pub use comet::Comet;
pub use config::{CometConfig, ConfigError};
pub use error::{CometError, ErrorCode, Result};
pub use listener::{
    BlockOutcome, CheckTxOutcome, CometBlock, CometExecTxResult, CometListener,
    CometValidatorUpdate, CurrentState, QueryOutcome,
};
pub use rpc::{CometRpcClient, RpcError};
pub use state::AdapterState;
pub use transactions::{
    transaction_hash, TransactionCheck, TransactionInclusion, TransactionRecord,
};
