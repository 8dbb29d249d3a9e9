//! The application side of the adapter.
//!
//! An application implements [`CometListener`] to receive genesis, blocks
//! and mempool checks from the engine, and the results of outbound calls.
//! Calls arrive on blocking worker threads; methods may take their time, but
//! several of them can run at once (one per engine connection), so shared
//! application state needs its own locking.

use chrono::{DateTime, Utc};
use cometway_proto::{FinalizeBlockRequest, ProcessProposalRequest, Timestamp, ValidatorUpdate};
use serde_json::Value;

use crate::state::AdapterState;

/// Key type the engine expects for validator updates
pub const VALIDATOR_KEY_TYPE: &str = "ed25519";

/// A decided (or proposed) block as delivered to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CometBlock {
    pub height: u64,
    pub time: DateTime<Utc>,
    pub proposer_address: Vec<u8>,
    /// Hash of the previous block, empty when not known to the adapter
    pub prev_hash: Vec<u8>,
    pub txs: Vec<Vec<u8>>,
    pub hash: Vec<u8>,
}

pub(crate) fn timestamp_to_datetime(ts: Option<&Timestamp>) -> DateTime<Utc> {
    ts.and_then(|ts| DateTime::from_timestamp(ts.seconds, u32::try_from(ts.nanos).unwrap_or(0)))
        .unwrap_or_default()
}

impl CometBlock {
    pub(crate) fn from_finalize(request: &FinalizeBlockRequest, height: u64, prev_hash: Vec<u8>) -> Self {
        Self {
            height,
            time: timestamp_to_datetime(request.time.as_ref()),
            proposer_address: request.proposer_address.clone(),
            prev_hash,
            txs: request.txs.clone(),
            hash: request.hash.clone(),
        }
    }

    pub(crate) fn from_proposal(
        request: &ProcessProposalRequest,
        height: u64,
        prev_hash: Vec<u8>,
    ) -> Self {
        Self {
            height,
            time: timestamp_to_datetime(request.time.as_ref()),
            proposer_address: request.proposer_address.clone(),
            prev_hash,
            txs: request.txs.clone(),
            hash: request.hash.clone(),
        }
    }
}

/// Validator set change. Power 0 removes the validator; an unknown key adds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CometValidatorUpdate {
    pub public_key: Vec<u8>,
    pub power: i64,
}

impl From<&ValidatorUpdate> for CometValidatorUpdate {
    fn from(update: &ValidatorUpdate) -> Self {
        Self {
            public_key: update.pub_key_bytes.clone(),
            power: update.power,
        }
    }
}

impl From<&CometValidatorUpdate> for ValidatorUpdate {
    fn from(update: &CometValidatorUpdate) -> Self {
        ValidatorUpdate {
            power: update.power,
            pub_key_bytes: update.public_key.clone(),
            pub_key_type: VALIDATOR_KEY_TYPE.to_string(),
        }
    }
}

/// Execution outcome of one transaction, in block order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CometExecTxResult {
    pub code: u32,
    pub data: Vec<u8>,
    pub gas_wanted: i64,
    pub gas_used: i64,
}

/// What the application returns for a finalized block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockOutcome {
    pub app_hash: Vec<u8>,
    /// Exactly one entry per transaction of the block
    pub tx_results: Vec<CometExecTxResult>,
    pub validator_updates: Vec<CometValidatorUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTxOutcome {
    pub accept: bool,
    pub gas_limit: i64,
}

/// The application's committed position, reported on every handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentState {
    pub height: u64,
    pub app_hash: Vec<u8>,
    pub app_sem_ver: String,
    pub app_version: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    pub code: u32,
    pub value: Vec<u8>,
    pub log: String,
}

/// Callbacks from the adapter into the application
pub trait CometListener: Send + Sync + 'static {
    /// Genesis. Returns the initial app hash.
    fn init_chain(
        &self,
        genesis_time: DateTime<Utc>,
        chain_id: &str,
        initial_app_state: &[u8],
        initial_height: u64,
        initial_validators: &[CometValidatorUpdate],
    ) -> Vec<u8>;

    /// A decided block. `syncing_to_height` is larger than `block.height`
    /// while the engine replays stored blocks and equal to it for live blocks.
    fn incoming_block(&self, syncing_to_height: u64, block: &CometBlock) -> BlockOutcome;

    /// Height and hash of the last block the application committed
    fn get_current_state(&self) -> CurrentState;

    fn check_tx(&self, _tx: &[u8], _is_recheck: bool) -> CheckTxOutcome {
        CheckTxOutcome {
            accept: true,
            gas_limit: 0,
        }
    }

    /// Indices of `txs` to leave out of a block this node proposes
    fn build_block_proposal(&self, _height: u64, _txs: &[Vec<u8>]) -> Vec<usize> {
        Vec::new()
    }

    fn validate_block_proposal(&self, _block: &CometBlock) -> bool {
        true
    }

    /// Called after each commit; returns the lowest height the engine must keep
    fn persist_state(&self) -> u64 {
        0
    }

    /// Also used by the engine to filter peers (`/p2p/filter/...`); a
    /// non-zero code refuses the peer.
    fn query(&self, _path: &str, _data: &[u8], _height: u64) -> QueryOutcome {
        QueryOutcome::default()
    }

    fn send_transaction_result(
        &self,
        _id: u64,
        _tx: &[u8],
        _success: bool,
        _tx_hash: &str,
        _response: &Value,
    ) {
    }

    fn check_transaction_result(&self, _tx_hash: &str, _success: bool, _response: &Value) {}

    fn get_block_result(&self, _height: u64, _success: bool, _response: &Value) {}

    /// Height of the engine's block store, found during inspection
    fn current_cometbft_height(&self, _height: u64) {}

    /// Adapter state changes. Called on the adapter's worker; must not block.
    fn state_transition(&self, _from: AdapterState, _to: AdapterState) {}
}
