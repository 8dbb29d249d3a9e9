//! The consensus adapter.
//!
//! [`Comet`] owns a background worker that provisions the engine home, serves
//! the ABCI socket, launches the engine and supervises it. The application
//! sees the engine only through its [`CometListener`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::CometConfig;
use crate::error::{CometError, ErrorCode, Result};
use crate::listener::CometListener;
use crate::rpc::{parse_height, tx_succeeded, CometRpcClient, RpcError};
use crate::state::{AdapterState, StateMachine};
use crate::transactions::{
    TransactionCheck, TransactionInclusion, TransactionRecord, TransactionRegistry,
};
use crate::worker;

/// Where the application and the engine agree the chain is
#[derive(Debug, Default)]
pub(crate) struct Cursor {
    /// Last height the application has applied, once known
    pub(crate) last_height: Option<u64>,
    /// Hash of the block at `last_height`, empty after a handshake
    pub(crate) prev_hash: Vec<u8>,
}

#[derive(Clone)]
struct Outbound {
    rpc: CometRpcClient,
    runtime: Handle,
    epoch: u64,
    max_tx_bytes: usize,
}

/// State shared by the worker, the ABCI sessions and the public handle
pub(crate) struct CometCore {
    pub(crate) listener: Arc<dyn CometListener>,
    pub(crate) instance_id: String,
    machine: StateMachine,
    status: AtomicBool,
    failure: Mutex<Option<(ErrorCode, String)>>,
    /// Count of Echo and Info requests since start
    pub(crate) handshakes: watch::Sender<u64>,
    cursor: Mutex<Cursor>,
    engine_height: Mutex<Option<u64>>,
    node_id: Mutex<Option<String>>,
    outbound: RwLock<Option<Outbound>>,
    /// Epoch whose outbound results may still reach the listener
    gate: RwLock<Option<u64>>,
    epoch: Mutex<u64>,
    pub(crate) registry: TransactionRegistry,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CometCore {
    pub(crate) fn new(listener: Arc<dyn CometListener>, instance_id: String) -> Self {
        let (handshakes, _) = watch::channel(0);
        Self {
            listener,
            instance_id,
            machine: StateMachine::new(),
            status: AtomicBool::new(true),
            failure: Mutex::new(None),
            handshakes,
            cursor: Mutex::new(Cursor::default()),
            engine_height: Mutex::new(None),
            node_id: Mutex::new(None),
            outbound: RwLock::new(None),
            gate: RwLock::new(None),
            epoch: Mutex::new(0),
            registry: TransactionRegistry::new(),
        }
    }

    pub(crate) fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub(crate) fn state(&self) -> AdapterState {
        self.machine.state()
    }

    pub(crate) fn transition(&self, next: AdapterState) -> Result<()> {
        let from = self.machine.transition(next)?;
        self.listener.state_transition(from, next);
        Ok(())
    }

    fn reset(&self) {
        self.status.store(true, Ordering::SeqCst);
        *lock(&self.failure) = None;
        *lock(&self.cursor) = Cursor::default();
        *lock(&self.engine_height) = None;
        *lock(&self.node_id) = None;
        self.handshakes.send_replace(0);
    }

    /// Record a fatal error. The first one wins; `status` turns false.
    pub(crate) fn raise_error(&self, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        self.status.store(false, Ordering::SeqCst);
        let mut failure = lock(&self.failure);
        if failure.is_none() {
            error!(code = %code, "{}", message);
            *failure = Some((code, message));
        } else {
            warn!(code = %code, "further error after failure: {}", message);
        }
    }

    pub(crate) fn status(&self) -> bool {
        self.status.load(Ordering::SeqCst)
    }

    pub(crate) fn failure(&self) -> Option<(ErrorCode, String)> {
        lock(&self.failure).clone()
    }

    pub(crate) fn cursor(&self) -> MutexGuard<'_, Cursor> {
        lock(&self.cursor)
    }

    pub(crate) fn engine_height(&self) -> Option<u64> {
        *lock(&self.engine_height)
    }

    pub(crate) fn set_engine_height(&self, height: u64) {
        *lock(&self.engine_height) = Some(height);
    }

    pub(crate) fn set_node_id(&self, node_id: String) {
        info!(node_id = %node_id, "engine node id");
        *lock(&self.node_id) = Some(node_id);
    }

    /// Enable outbound calls and let their results through to the listener
    pub(crate) fn open_outbound(&self, rpc: Option<CometRpcClient>, max_tx_bytes: usize) {
        let epoch = {
            let mut epoch = lock(&self.epoch);
            *epoch += 1;
            *epoch
        };
        *self.gate.write().unwrap_or_else(|p| p.into_inner()) = Some(epoch);
        let Some(rpc) = rpc else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        *self.outbound.write().unwrap_or_else(|p| p.into_inner()) = Some(Outbound {
            rpc,
            runtime,
            epoch,
            max_tx_bytes,
        });
    }

    /// Disable outbound calls. Returns once no result callback is running,
    /// and none from the closed epoch will run afterwards.
    pub(crate) fn close_outbound(&self) {
        *self.outbound.write().unwrap_or_else(|p| p.into_inner()) = None;
        *self.gate.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    fn outbound(&self) -> Option<Outbound> {
        if self.state() != AdapterState::Running {
            return None;
        }
        self.outbound
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Run a listener callback on the blocking pool if `epoch` is still open
    async fn deliver<F>(self: &Arc<Self>, epoch: u64, callback: F)
    where
        F: FnOnce(&dyn CometListener) + Send + 'static,
    {
        let core = Arc::clone(self);
        let delivered = tokio::task::spawn_blocking(move || {
            let gate = core.gate.read().unwrap_or_else(|p| p.into_inner());
            if *gate == Some(epoch) {
                callback(core.listener.as_ref());
            }
        })
        .await;
        if let Err(e) = delivered {
            error!("listener callback panicked: {}", e);
        }
    }
}

fn error_response(err: &RpcError) -> Value {
    json!({ "error": err.to_string(), "code": err.code().as_str() })
}

struct Worker {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Consensus adapter handle.
///
/// `start` brings the engine up in the background; `state`, `status` and
/// `error` can be polled at any time. After a failure the adapter stays in
/// `Terminated` until `stop` is called.
pub struct Comet {
    core: Arc<CometCore>,
    config: CometConfig,
    worker: Option<Worker>,
}

impl Comet {
    pub fn new(
        listener: Arc<dyn CometListener>,
        instance_id: impl Into<String>,
        config: CometConfig,
    ) -> Self {
        let core = Arc::new(CometCore::new(listener, instance_id.into()));
        core.registry.set_cache_size(config.tx_cache_size);
        Self {
            core,
            config,
            worker: None,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.core.instance_id
    }

    pub fn config(&self) -> &CometConfig {
        &self.config
    }

    /// Spawn the worker on the current tokio runtime. No-op while a worker
    /// exists, including a terminated one that has not been stopped yet.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|e| CometError::Runtime(e.to_string()))?;

        self.core.reset();
        self.core.transition(AdapterState::Started)?;

        let (stop, stop_rx) = watch::channel(false);
        let task = runtime.spawn(worker::run(
            Arc::clone(&self.core),
            self.config.clone(),
            stop_rx,
        ));
        self.worker = Some(Worker { stop, task });
        Ok(())
    }

    /// Stop the worker and wait for it to shut the engine and the ABCI
    /// server down. Ends in `Stopped`; no listener callback runs afterwards.
    pub async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.core.machine().set_pause_state(None);
        worker.stop.send_replace(true);
        self.core.close_outbound();

        if let Err(e) = worker.task.await {
            self.core
                .raise_error(ErrorCode::Fatal, format!("adapter worker panicked: {e}"));
        }
        if !self.core.state().is_final() {
            if let Err(e) = self.core.transition(AdapterState::Terminated) {
                warn!("{}", e);
            }
        }
        if let Err(e) = self.core.transition(AdapterState::Stopped) {
            warn!("{}", e);
        }
    }

    pub fn state(&self) -> AdapterState {
        self.core.state()
    }

    /// False once a fatal error has been recorded since the last `start`
    pub fn status(&self) -> bool {
        self.core.status()
    }

    pub fn error(&self) -> Option<String> {
        self.core.failure().map(|(_, message)| message)
    }

    pub fn error_code(&self) -> ErrorCode {
        self.core
            .failure()
            .map(|(code, _)| code)
            .unwrap_or(ErrorCode::None)
    }

    /// Make the worker hold once it reaches `state`; `None` releases it
    pub fn set_pause_state(&self, state: Option<AdapterState>) {
        self.core.machine().set_pause_state(state);
    }

    pub fn pause_state(&self) -> Option<AdapterState> {
        self.core.machine().pause_state()
    }

    /// Wait until the worker holds at the pause state.
    ///
    /// Fails with the recorded error if the adapter fails first.
    pub async fn wait_pause_state(&self, timeout: Duration) -> Result<()> {
        let core = Arc::clone(&self.core);
        self.core
            .machine()
            .wait_for_pause(timeout, move || {
                core.failure()
                    .map(|(code, message)| CometError::Failed { code, message })
            })
            .await
    }

    /// Engine node id, known after inspection
    pub fn node_id(&self) -> Option<String> {
        lock(&self.core.node_id).clone()
    }

    /// Height of the engine block store found during inspection
    pub fn engine_height(&self) -> Option<u64> {
        self.core.engine_height()
    }

    pub fn transaction(&self, id: u64) -> Option<TransactionRecord> {
        self.core.registry.get(id)
    }

    /// Submitted transaction by engine hash (uppercase or lowercase hex)
    pub fn transaction_by_hash(&self, hash_hex: &str) -> Option<TransactionRecord> {
        self.core.registry.find_by_hash(hash_hex)
    }

    /// Height, position and result of a recently finalized transaction.
    ///
    /// Answered from memory: every transaction in a block finalized through
    /// this adapter is cached, whether or not it was submitted here.
    pub fn transaction_status(&self, hash_hex: &str) -> Option<TransactionInclusion> {
        self.core.registry.included(hash_hex)
    }

    /// Resize the finalized-transaction cache; 0 empties and disables it
    pub fn set_transaction_cache_size(&self, size: usize) {
        self.core.registry.set_cache_size(size);
    }

    /// Submit a transaction to the engine mempool.
    ///
    /// Returns an id for the pending call, or 0 when the call cannot be made
    /// (adapter not running, no RPC port). The outcome arrives through
    /// `CometListener::send_transaction_result` with the same id.
    pub fn send_transaction(&self, tx: Vec<u8>) -> u64 {
        let Some(outbound) = self.core.outbound() else {
            return 0;
        };
        let id = self.core.registry.register(tx.clone());
        let core = Arc::clone(&self.core);

        outbound.runtime.spawn(async move {
            let (success, hash, response) = if tx.len() > outbound.max_tx_bytes {
                let message = format!(
                    "transaction of {} bytes exceeds the {} byte limit",
                    tx.len(),
                    outbound.max_tx_bytes
                );
                (false, String::new(), json!({ "error": message }))
            } else {
                match outbound.rpc.broadcast_tx_async(&tx).await {
                    Ok((result, hash)) => (true, hash, result),
                    Err(e) => {
                        warn!(id, "broadcast_tx_async failed: {}", e);
                        (false, String::new(), error_response(&e))
                    }
                }
            };
            core.registry
                .record_sent(id, success, (!hash.is_empty()).then_some(hash.as_str()));
            core.deliver(outbound.epoch, move |listener| {
                listener.send_transaction_result(id, &tx, success, &hash, &response)
            })
            .await;
        });
        id
    }

    /// Look up a transaction by hash. Returns false when the call cannot be
    /// made; the outcome arrives through `check_transaction_result`.
    pub fn check_transaction(&self, hash_hex: &str) -> bool {
        if hex::decode(hash_hex).is_err() {
            return false;
        }
        let Some(outbound) = self.core.outbound() else {
            return false;
        };
        let hash = hash_hex.to_uppercase();
        let core = Arc::clone(&self.core);

        outbound.runtime.spawn(async move {
            let (success, response) = match outbound.rpc.tx(&hash).await {
                Ok(result) => (tx_succeeded(&result), result),
                Err(e) => (false, error_response(&e)),
            };
            let check = TransactionCheck {
                success,
                height: response.get("height").and_then(|h| parse_height(h).ok()),
                code: response["tx_result"]["code"]
                    .as_u64()
                    .and_then(|code| u32::try_from(code).ok()),
            };
            core.registry.record_check(&hash, check);
            core.deliver(outbound.epoch, move |listener| {
                listener.check_transaction_result(&hash, success, &response)
            })
            .await;
        });
        true
    }

    /// Fetch a block. Returns false when the call cannot be made; the outcome
    /// arrives through `get_block_result`.
    pub fn get_block(&self, height: u64) -> bool {
        let Some(outbound) = self.core.outbound() else {
            return false;
        };
        let core = Arc::clone(&self.core);

        outbound.runtime.spawn(async move {
            let (success, response) = match outbound.rpc.block(height).await {
                Ok(result) => (true, result),
                Err(e) => (false, error_response(&e)),
            };
            core.deliver(outbound.epoch, move |listener| {
                listener.get_block_result(height, success, &response)
            })
            .await;
        });
        true
    }

    /// Direct JSON-RPC call to the engine while running
    pub async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let outbound = self
            .core
            .outbound()
            .ok_or(CometError::Rpc(RpcError::Unavailable))?;
        Ok(outbound.rpc.call(method, params).await?)
    }
}

impl Drop for Comet {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.send_replace(true);
            self.core.close_outbound();
        }
    }
}
