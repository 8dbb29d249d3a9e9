#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cometway_abci::{read_frame, write_frame};
use cometway_comet::{
    AdapterState, BlockOutcome, CheckTxOutcome, Comet, CometBlock, CometConfig,
    CometExecTxResult, CometListener, CometValidatorUpdate, CurrentState,
};
use cometway_proto::{
    request, response, CommitRequest, CommitResponse, FinalizeBlockRequest,
    FinalizeBlockResponse, InfoRequest, InfoResponse, InitChainRequest, InitChainResponse,
    Message, Request, Response, Timestamp,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::UnixStream;

/// A block as the application saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenBlock {
    pub height: u64,
    pub syncing_to_height: u64,
    pub prev_hash: Vec<u8>,
    pub txs: Vec<Vec<u8>>,
    /// Application hash after applying the block
    pub app_hash: Vec<u8>,
}

#[derive(Default)]
struct Chain {
    height: u64,
    app_hash: Vec<u8>,
    blocks: Vec<SeenBlock>,
}

/// Hash-chain application: each block's app hash is the SHA-256 of the
/// previous hash, the height and the transactions.
#[derive(Default)]
pub struct TestApp {
    chain: Mutex<Chain>,
    pub init_chain_calls: AtomicU64,
    pub initial_validators: Mutex<Vec<CometValidatorUpdate>>,
    pub engine_heights: Mutex<Vec<u64>>,
    pub transitions: Mutex<Vec<(AdapterState, AdapterState)>>,
    pub sent: Mutex<Vec<(u64, bool, String)>>,
    pub checked: Mutex<Vec<(String, bool)>>,
    /// Return one result fewer than the block has transactions
    pub short_results: AtomicBool,
    /// Validator updates to return with the block at each height
    pub validator_updates: Mutex<HashMap<u64, Vec<CometValidatorUpdate>>>,
}

pub fn chain_hash(prev: &[u8], height: u64, txs: &[Vec<u8>]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(prev);
    hasher.update(height.to_be_bytes());
    for tx in txs {
        hasher.update(tx);
    }
    hasher.finalize().to_vec()
}

impl TestApp {
    pub fn height(&self) -> u64 {
        self.chain.lock().unwrap().height
    }

    pub fn app_hash(&self) -> Vec<u8> {
        self.chain.lock().unwrap().app_hash.clone()
    }

    pub fn blocks(&self) -> Vec<SeenBlock> {
        self.chain.lock().unwrap().blocks.clone()
    }
}

impl CometListener for TestApp {
    fn init_chain(
        &self,
        _genesis_time: DateTime<Utc>,
        chain_id: &str,
        initial_app_state: &[u8],
        initial_height: u64,
        initial_validators: &[CometValidatorUpdate],
    ) -> Vec<u8> {
        self.init_chain_calls.fetch_add(1, Ordering::SeqCst);
        *self.initial_validators.lock().unwrap() = initial_validators.to_vec();
        let mut chain = self.chain.lock().unwrap();
        chain.height = initial_height - 1;
        chain.app_hash = Sha256::digest([chain_id.as_bytes(), initial_app_state].concat()).to_vec();
        chain.app_hash.clone()
    }

    fn incoming_block(&self, syncing_to_height: u64, block: &CometBlock) -> BlockOutcome {
        let mut chain = self.chain.lock().unwrap();
        chain.app_hash = chain_hash(&chain.app_hash, block.height, &block.txs);
        chain.height = block.height;
        let app_hash = chain.app_hash.clone();
        chain.blocks.push(SeenBlock {
            height: block.height,
            syncing_to_height,
            prev_hash: block.prev_hash.clone(),
            txs: block.txs.clone(),
            app_hash,
        });

        let mut tx_results: Vec<CometExecTxResult> = block
            .txs
            .iter()
            .map(|tx| CometExecTxResult {
                code: 0,
                data: tx.clone(),
                gas_wanted: tx.len() as i64,
                gas_used: tx.len() as i64,
            })
            .collect();
        if self.short_results.load(Ordering::SeqCst) {
            tx_results.pop();
        }
        BlockOutcome {
            app_hash: chain.app_hash.clone(),
            tx_results,
            validator_updates: self
                .validator_updates
                .lock()
                .unwrap()
                .remove(&block.height)
                .unwrap_or_default(),
        }
    }

    fn get_current_state(&self) -> CurrentState {
        let chain = self.chain.lock().unwrap();
        CurrentState {
            height: chain.height,
            app_hash: chain.app_hash.clone(),
            app_sem_ver: "1.0.0".to_string(),
            app_version: 1,
        }
    }

    fn check_tx(&self, tx: &[u8], _is_recheck: bool) -> CheckTxOutcome {
        CheckTxOutcome {
            accept: !tx.starts_with(b"x"),
            gas_limit: tx.len() as i64,
        }
    }

    fn build_block_proposal(&self, _height: u64, txs: &[Vec<u8>]) -> Vec<usize> {
        txs.iter()
            .enumerate()
            .filter(|(_, tx)| tx.starts_with(b"drop"))
            .map(|(index, _)| index)
            .collect()
    }

    fn persist_state(&self) -> u64 {
        self.height().saturating_sub(10)
    }

    fn send_transaction_result(
        &self,
        id: u64,
        _tx: &[u8],
        success: bool,
        tx_hash: &str,
        _response: &Value,
    ) {
        self.sent
            .lock()
            .unwrap()
            .push((id, success, tx_hash.to_string()));
    }

    fn check_transaction_result(&self, tx_hash: &str, success: bool, _response: &Value) {
        self.checked
            .lock()
            .unwrap()
            .push((tx_hash.to_string(), success));
    }

    fn current_cometbft_height(&self, height: u64) {
        self.engine_heights.lock().unwrap().push(height);
    }

    fn state_transition(&self, from: AdapterState, to: AdapterState) {
        self.transitions.lock().unwrap().push((from, to));
    }
}

/// Adapter config for an engine the test drives itself
pub fn test_config(home: &Path) -> CometConfig {
    CometConfig {
        genesis: Some(json!({
            "genesis_time": "2024-01-01T00:00:00Z",
            "chain_id": "cometway-test",
            "initial_height": "1",
            "app_hash": ""
        })),
        launch_engine: false,
        inspect: false,
        handshake_timeout_ms: 5_000,
        ..CometConfig::with_home(home)
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

pub async fn wait_for_state(comet: &Comet, state: AdapterState) {
    let reached = tokio::time::timeout(Duration::from_secs(30), async {
        while comet.state() != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        reached.is_ok(),
        "adapter stuck in {} waiting for {}",
        comet.state(),
        state
    );
}

/// Plays the engine's side of one ABCI connection
pub struct EngineHarness {
    stream: UnixStream,
}

impl EngineHarness {
    /// Connect once the adapter has bound its socket
    pub async fn connect(path: &Path) -> Self {
        for _ in 0..500 {
            if let Ok(stream) = UnixStream::connect(path).await {
                return Self { stream };
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("ABCI socket {} never came up", path.display());
    }

    pub async fn send(&mut self, value: request::Value) {
        let request = Request::from(value);
        write_frame(&mut self.stream, &request.encode_to_vec())
            .await
            .unwrap();
    }

    /// Next response, or `None` once the adapter has closed the connection
    pub async fn receive(&mut self) -> Option<Response> {
        let frame = tokio::time::timeout(Duration::from_secs(10), read_frame(&mut self.stream))
            .await
            .expect("no response from the adapter");
        frame
            .ok()
            .map(|frame| Response::decode(frame.as_slice()).unwrap())
    }

    pub async fn call(&mut self, value: request::Value) -> Response {
        self.send(value).await;
        self.receive().await.expect("connection closed")
    }

    pub async fn info(&mut self) -> InfoResponse {
        match self.call(request::Value::Info(InfoRequest::default())).await.value {
            Some(response::Value::Info(info)) => info,
            other => panic!("unexpected response {other:?}"),
        }
    }

    pub async fn init_chain(&mut self, initial_height: i64) -> InitChainResponse {
        let request = InitChainRequest {
            time: Some(Timestamp {
                seconds: 1_704_067_200,
                nanos: 0,
            }),
            chain_id: "cometway-test".to_string(),
            app_state_bytes: b"{}".to_vec(),
            initial_height,
            ..Default::default()
        };
        match self.call(request::Value::InitChain(request)).await.value {
            Some(response::Value::InitChain(init)) => init,
            other => panic!("unexpected response {other:?}"),
        }
    }

    pub fn finalize_request(height: i64, syncing_to_height: i64, txs: &[&[u8]]) -> request::Value {
        request::Value::FinalizeBlock(FinalizeBlockRequest {
            txs: txs.iter().map(|tx| tx.to_vec()).collect(),
            hash: height.to_be_bytes().repeat(4),
            height,
            time: Some(Timestamp {
                seconds: 1_704_067_200 + height,
                nanos: 0,
            }),
            proposer_address: vec![1; 20],
            syncing_to_height,
            ..Default::default()
        })
    }

    pub async fn finalize(
        &mut self,
        height: i64,
        syncing_to_height: i64,
        txs: &[&[u8]],
    ) -> FinalizeBlockResponse {
        let request = Self::finalize_request(height, syncing_to_height, txs);
        match self.call(request).await.value {
            Some(response::Value::FinalizeBlock(finalized)) => finalized,
            other => panic!("unexpected response {other:?}"),
        }
    }

    pub async fn commit(&mut self) -> CommitResponse {
        match self.call(request::Value::Commit(CommitRequest {})).await.value {
            Some(response::Value::Commit(commit)) => commit,
            other => panic!("unexpected response {other:?}"),
        }
    }

    /// Apply and commit `count` live blocks starting at `from`
    pub async fn produce(&mut self, from: i64, count: i64) {
        for height in from..from + count {
            let tx = format!("tx-{height}");
            self.finalize(height, height, &[tx.as_bytes()]).await;
            self.commit().await;
        }
    }
}
