//! ABCI requests translated into listener calls.
//!
//! Height bookkeeping lives here: every decided block must extend the
//! application's last height by exactly one, and any break in that sequence
//! fails the adapter instead of letting the two sides drift apart.

use std::collections::HashSet;

use cometway_abci::{AbciError, AbciHandler, Result as AbciResult};
use cometway_proto::{
    CheckTxRequest, CheckTxResponse, CommitRequest, CommitResponse, ConsensusParams, Duration,
    EchoRequest, EchoResponse, ExecTxResult, FeatureParams, FinalizeBlockRequest,
    FinalizeBlockResponse, InfoRequest, InfoResponse, InitChainRequest, InitChainResponse,
    PrepareProposalRequest, PrepareProposalResponse, ProcessProposalRequest,
    ProcessProposalResponse, QueryRequest, QueryResponse, SynchronyParams, ValidatorUpdate,
    VerifyStatus,
};
use tracing::{debug, info};

use crate::comet::CometCore;
use crate::error::CometError;
use crate::listener::{timestamp_to_datetime, CometBlock, CometValidatorUpdate};
use crate::state::AdapterState;
use crate::transactions::{transaction_hash, TransactionInclusion};

/// Proposer-based timestamps are on from the first block
const PBTS_ENABLE_HEIGHT: i64 = 1;
const SYNCHRONY_PRECISION_SECS: i64 = 1;
const SYNCHRONY_MESSAGE_DELAY_SECS: i64 = 5;

fn genesis_consensus_params() -> ConsensusParams {
    ConsensusParams {
        synchrony: Some(SynchronyParams {
            precision: Some(Duration {
                seconds: SYNCHRONY_PRECISION_SECS,
                nanos: 0,
            }),
            message_delay: Some(Duration {
                seconds: SYNCHRONY_MESSAGE_DELAY_SECS,
                nanos: 0,
            }),
        }),
        feature: Some(FeatureParams {
            vote_extensions_enable_height: None,
            pbts_enable_height: Some(PBTS_ENABLE_HEIGHT),
        }),
        ..Default::default()
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Bytes `tx` adds to the block's transaction list once encoded
fn encoded_tx_len(tx: &[u8]) -> u64 {
    (1 + prost::length_delimiter_len(tx.len()) + tx.len()) as u64
}

impl CometCore {
    /// Record `err` as the adapter's failure and turn it into a handler error,
    /// which closes the ABCI server.
    fn fail(&self, err: CometError) -> AbciError {
        let message = err.to_string();
        self.raise_error(err.code(), message.clone());
        AbciError::Application(message)
    }

    fn count_handshake(&self) {
        self.handshakes.send_modify(|count| *count += 1);
    }
}

impl AbciHandler for CometCore {
    fn echo(&self, request: EchoRequest) -> AbciResult<EchoResponse> {
        self.count_handshake();
        Ok(EchoResponse {
            message: request.message,
        })
    }

    fn info(&self, request: InfoRequest) -> AbciResult<InfoResponse> {
        debug!(
            engine_version = %request.version,
            abci_version = %request.abci_version,
            "Info"
        );
        // Held while reading the state; blocks are finalized under it.
        let mut cursor = self.cursor();
        let state = self.listener.get_current_state();

        // The engine cannot replay towards an application that is ahead of
        // its block store.
        if let Some(engine_height) = self.engine_height() {
            if state.height > engine_height {
                return Err(self.fail(CometError::Protocol(format!(
                    "application height {} is ahead of the engine block store at height {}; \
                     the application state must be reset",
                    state.height, engine_height
                ))));
            }
        }

        // Once running, Info is only a status query and never moves the
        // cursor back.
        let handshaking = self.state() != AdapterState::Running;
        match cursor.last_height {
            Some(last) if !handshaking && last >= state.height => {}
            _ => {
                cursor.last_height = Some(state.height);
                cursor.prev_hash.clear();
            }
        }
        drop(cursor);
        self.count_handshake();
        info!(height = state.height, "reported application state to the engine");

        Ok(InfoResponse {
            data: self.instance_id.clone(),
            version: state.app_sem_ver,
            app_version: state.app_version,
            last_block_height: to_i64(state.height),
            last_block_app_hash: state.app_hash,
        })
    }

    fn init_chain(&self, request: InitChainRequest) -> AbciResult<InitChainResponse> {
        let initial_height = u64::try_from(request.initial_height)
            .ok()
            .filter(|height| *height > 0)
            .unwrap_or(1);
        let validators: Vec<CometValidatorUpdate> =
            request.validators.iter().map(Into::into).collect();
        info!(
            chain_id = %request.chain_id,
            initial_height,
            validators = validators.len(),
            "InitChain"
        );

        let app_hash = self.listener.init_chain(
            timestamp_to_datetime(request.time.as_ref()),
            &request.chain_id,
            &request.app_state_bytes,
            initial_height,
            &validators,
        );

        {
            let mut cursor = self.cursor();
            cursor.last_height = Some(initial_height - 1);
            cursor.prev_hash.clear();
        }

        // An empty validator list keeps the genesis validators.
        Ok(InitChainResponse {
            consensus_params: Some(genesis_consensus_params()),
            validators: Vec::new(),
            app_hash,
        })
    }

    fn query(&self, request: QueryRequest) -> AbciResult<QueryResponse> {
        let height = u64::try_from(request.height).unwrap_or(0);
        let outcome = self.listener.query(&request.path, &request.data, height);
        Ok(QueryResponse {
            code: outcome.code,
            log: outcome.log,
            key: request.data,
            value: outcome.value,
            height: request.height,
            ..Default::default()
        })
    }

    fn check_tx(&self, request: CheckTxRequest) -> AbciResult<CheckTxResponse> {
        let outcome = self.listener.check_tx(&request.tx, request.is_recheck());
        Ok(CheckTxResponse {
            code: if outcome.accept { 0 } else { 1 },
            gas_wanted: outcome.gas_limit,
            ..Default::default()
        })
    }

    fn commit(&self, _request: CommitRequest) -> AbciResult<CommitResponse> {
        let retain_height = self.listener.persist_state();
        Ok(CommitResponse {
            retain_height: to_i64(retain_height),
        })
    }

    fn prepare_proposal(&self, request: PrepareProposalRequest) -> AbciResult<PrepareProposalResponse> {
        let height = u64::try_from(request.height).unwrap_or(0);
        let dropped: HashSet<usize> = self
            .listener
            .build_block_proposal(height, &request.txs)
            .into_iter()
            .collect();
        let limit = u64::try_from(request.max_tx_bytes)
            .ok()
            .filter(|limit| *limit > 0);

        let mut total = 0u64;
        let mut txs = Vec::with_capacity(request.txs.len());
        for (index, tx) in request.txs.into_iter().enumerate() {
            if dropped.contains(&index) {
                continue;
            }
            let size = encoded_tx_len(&tx);
            if let Some(limit) = limit {
                if total + size > limit {
                    debug!(height, index, "transaction does not fit the proposal");
                    continue;
                }
            }
            total += size;
            txs.push(tx);
        }
        Ok(PrepareProposalResponse { txs })
    }

    fn process_proposal(&self, request: ProcessProposalRequest) -> AbciResult<ProcessProposalResponse> {
        let height = u64::try_from(request.height).unwrap_or(0);
        let prev_hash = {
            let cursor = self.cursor();
            match cursor.last_height {
                Some(last) if last + 1 == height => cursor.prev_hash.clone(),
                _ => Vec::new(),
            }
        };
        let block = CometBlock::from_proposal(&request, height, prev_hash);
        let status = if self.listener.validate_block_proposal(&block) {
            VerifyStatus::Accept
        } else {
            VerifyStatus::Reject
        };
        Ok(ProcessProposalResponse {
            status: status.into(),
        })
    }

    fn finalize_block(&self, request: FinalizeBlockRequest) -> AbciResult<FinalizeBlockResponse> {
        let height = u64::try_from(request.height).map_err(|_| {
            self.fail(CometError::Protocol(format!(
                "finalize for negative height {}",
                request.height
            )))
        })?;

        // Held across the listener call so blocks are applied one at a time.
        let mut cursor = self.cursor();
        let last_height = match cursor.last_height {
            Some(last) => last,
            None => self.listener.get_current_state().height,
        };
        if last_height.checked_add(1) != Some(height) {
            return Err(self.fail(CometError::Protocol(format!(
                "finalize for height {height} but the application is at height {last_height}"
            ))));
        }

        let syncing_to_height = u64::try_from(request.syncing_to_height)
            .unwrap_or(0)
            .max(height);
        let block = CometBlock::from_finalize(&request, height, cursor.prev_hash.clone());
        let outcome = self.listener.incoming_block(syncing_to_height, &block);

        if outcome.tx_results.len() != block.txs.len() {
            return Err(self.fail(CometError::Protocol(format!(
                "block {height} has {} transactions but the application returned {} results",
                block.txs.len(),
                outcome.tx_results.len()
            ))));
        }
        if let Some(update) = outcome.validator_updates.iter().find(|u| u.power < 0) {
            return Err(self.fail(CometError::Protocol(format!(
                "validator update with negative power {} at height {height}",
                update.power
            ))));
        }

        for (index, (tx, result)) in block.txs.iter().zip(&outcome.tx_results).enumerate() {
            self.registry.record_included(
                &transaction_hash(tx),
                TransactionInclusion {
                    height,
                    index,
                    result: result.clone(),
                },
            );
        }

        cursor.last_height = Some(height);
        cursor.prev_hash = block.hash;
        debug!(height, syncing_to_height, txs = block.txs.len(), "block finalized");

        Ok(FinalizeBlockResponse {
            tx_results: outcome
                .tx_results
                .into_iter()
                .map(|result| ExecTxResult {
                    code: result.code,
                    data: result.data,
                    gas_wanted: result.gas_wanted,
                    gas_used: result.gas_used,
                    ..Default::default()
                })
                .collect(),
            validator_updates: outcome
                .validator_updates
                .iter()
                .map(ValidatorUpdate::from)
                .collect(),
            app_hash: outcome.app_hash,
            ..Default::default()
        })
    }
}
