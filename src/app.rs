//! Demo application run by `cometway start`.
//!
//! Keeps an in-memory hash chain: every block's app hash is the SHA-256 of
//! the previous app hash, the height and the block's transactions. Nothing is
//! written to disk, so after a restart the engine replays its whole block
//! store into a fresh chain.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use cometway_comet::{
    AdapterState, BlockOutcome, CheckTxOutcome, CometBlock, CometExecTxResult, CometListener,
    CometValidatorUpdate, CurrentState, QueryOutcome,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Transactions above this size are refused by `CheckTx`
const MAX_DEMO_TX_BYTES: usize = 64 * 1024;

#[derive(Debug, Default)]
struct ChainState {
    height: u64,
    app_hash: Vec<u8>,
    tx_count: u64,
}

pub struct DemoApp {
    chain_id: String,
    state: Mutex<ChainState>,
}

impl DemoApp {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            state: Mutex::new(ChainState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        // A panicked listener call leaves the chain as it was before the block.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn next_hash(prev: &[u8], height: u64, txs: &[Vec<u8>]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(prev);
    hasher.update(height.to_be_bytes());
    for tx in txs {
        hasher.update(tx);
    }
    hasher.finalize().to_vec()
}

impl CometListener for DemoApp {
    fn init_chain(
        &self,
        genesis_time: DateTime<Utc>,
        chain_id: &str,
        initial_app_state: &[u8],
        initial_height: u64,
        initial_validators: &[CometValidatorUpdate],
    ) -> Vec<u8> {
        if chain_id != self.chain_id {
            warn!(expected = %self.chain_id, chain_id, "genesis is for a different chain");
        }
        info!(
            %genesis_time,
            initial_height,
            validators = initial_validators.len(),
            "starting chain {}",
            chain_id
        );

        let mut state = self.state();
        state.height = initial_height - 1;
        state.app_hash = Sha256::digest([chain_id.as_bytes(), initial_app_state].concat()).to_vec();
        state.tx_count = 0;
        state.app_hash.clone()
    }

    fn incoming_block(&self, syncing_to_height: u64, block: &CometBlock) -> BlockOutcome {
        let mut state = self.state();
        state.app_hash = next_hash(&state.app_hash, block.height, &block.txs);
        state.height = block.height;
        state.tx_count += block.txs.len() as u64;
        if syncing_to_height > block.height {
            debug!(height = block.height, syncing_to_height, "replaying block");
        } else {
            info!(
                height = block.height,
                txs = block.txs.len(),
                app_hash = %hex::encode(&state.app_hash),
                "block applied"
            );
        }

        BlockOutcome {
            app_hash: state.app_hash.clone(),
            tx_results: block
                .txs
                .iter()
                .map(|tx| CometExecTxResult {
                    code: 0,
                    data: Vec::new(),
                    gas_wanted: tx.len() as i64,
                    gas_used: tx.len() as i64,
                })
                .collect(),
            validator_updates: Vec::new(),
        }
    }

    fn get_current_state(&self) -> CurrentState {
        let state = self.state();
        CurrentState {
            height: state.height,
            app_hash: state.app_hash.clone(),
            app_sem_ver: env!("CARGO_PKG_VERSION").to_string(),
            app_version: 1,
        }
    }

    fn check_tx(&self, tx: &[u8], _is_recheck: bool) -> CheckTxOutcome {
        CheckTxOutcome {
            accept: !tx.is_empty() && tx.len() <= MAX_DEMO_TX_BYTES,
            gas_limit: tx.len() as i64,
        }
    }

    fn query(&self, path: &str, _data: &[u8], _height: u64) -> QueryOutcome {
        let state = self.state();
        match path {
            "/height" => QueryOutcome {
                value: state.height.to_string().into_bytes(),
                ..Default::default()
            },
            "/app_hash" => QueryOutcome {
                value: hex::encode(&state.app_hash).into_bytes(),
                ..Default::default()
            },
            "/tx_count" => QueryOutcome {
                value: state.tx_count.to_string().into_bytes(),
                ..Default::default()
            },
            // peer filters and anything else are accepted with no value
            _ => QueryOutcome::default(),
        }
    }

    fn send_transaction_result(
        &self,
        id: u64,
        _tx: &[u8],
        success: bool,
        tx_hash: &str,
        _response: &Value,
    ) {
        info!(id, success, tx_hash, "transaction broadcast");
    }

    fn current_cometbft_height(&self, height: u64) {
        info!(height, "engine block store height");
    }

    fn state_transition(&self, from: AdapterState, to: AdapterState) {
        debug!(%from, %to, "adapter state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u64, txs: &[&[u8]]) -> CometBlock {
        CometBlock {
            height,
            time: DateTime::from_timestamp(1_704_067_200, 0).unwrap(),
            proposer_address: vec![1; 20],
            prev_hash: Vec::new(),
            txs: txs.iter().map(|tx| tx.to_vec()).collect(),
            hash: vec![2; 32],
        }
    }

    #[test]
    fn test_hash_chain_is_deterministic() {
        let apps = [DemoApp::new("demo"), DemoApp::new("demo")];
        let mut hashes = Vec::new();
        for app in &apps {
            app.init_chain(Utc::now(), "demo", b"{}", 1, &[]);
            app.incoming_block(1, &block(1, &[b"a", b"b"]));
            let outcome = app.incoming_block(2, &block(2, &[]));
            hashes.push(outcome.app_hash);
        }
        assert_eq!(hashes[0], hashes[1]);
        assert_eq!(apps[0].get_current_state().height, 2);
    }

    #[test]
    fn test_one_result_per_transaction() {
        let app = DemoApp::new("demo");
        app.init_chain(Utc::now(), "demo", b"", 5, &[]);
        assert_eq!(app.get_current_state().height, 4);

        let outcome = app.incoming_block(5, &block(5, &[b"x", b"yy", b"zzz"]));
        assert_eq!(outcome.tx_results.len(), 3);
        assert_eq!(outcome.tx_results[2].gas_used, 3);
        assert_eq!(app.query("/tx_count", b"", 0).value, b"3");
    }

    #[test]
    fn test_check_tx_limits() {
        let app = DemoApp::new("demo");
        assert!(app.check_tx(b"tx", false).accept);
        assert!(!app.check_tx(b"", false).accept);
        assert!(!app.check_tx(&vec![0; MAX_DEMO_TX_BYTES + 1], true).accept);
    }

    #[test]
    fn test_unknown_query_accepts() {
        let app = DemoApp::new("demo");
        let outcome = app.query("/p2p/filter/id/abcd", b"", 0);
        assert_eq!(outcome.code, 0);
        assert!(outcome.value.is_empty());
    }
}
