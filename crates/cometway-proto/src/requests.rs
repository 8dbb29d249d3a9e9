//! Request side of the ABCI protocol.

use prost_types::Timestamp;

use crate::types::{
    CommitInfo, ConsensusParams, ExtendedCommitInfo, Misbehavior, Snapshot, ValidatorUpdate,
};

/// Envelope carried in every frame sent by the engine
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(
        oneof = "request::Value",
        tags = "1, 2, 3, 5, 6, 8, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20"
    )]
    pub value: Option<request::Value>,
}

pub mod request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "1")]
        Echo(super::EchoRequest),
        #[prost(message, tag = "2")]
        Flush(super::FlushRequest),
        #[prost(message, tag = "3")]
        Info(super::InfoRequest),
        #[prost(message, tag = "5")]
        InitChain(super::InitChainRequest),
        #[prost(message, tag = "6")]
        Query(super::QueryRequest),
        #[prost(message, tag = "8")]
        CheckTx(super::CheckTxRequest),
        #[prost(message, tag = "11")]
        Commit(super::CommitRequest),
        #[prost(message, tag = "12")]
        ListSnapshots(super::ListSnapshotsRequest),
        #[prost(message, tag = "13")]
        OfferSnapshot(super::OfferSnapshotRequest),
        #[prost(message, tag = "14")]
        LoadSnapshotChunk(super::LoadSnapshotChunkRequest),
        #[prost(message, tag = "15")]
        ApplySnapshotChunk(super::ApplySnapshotChunkRequest),
        #[prost(message, tag = "16")]
        PrepareProposal(super::PrepareProposalRequest),
        #[prost(message, tag = "17")]
        ProcessProposal(super::ProcessProposalRequest),
        #[prost(message, tag = "18")]
        ExtendVote(super::ExtendVoteRequest),
        #[prost(message, tag = "19")]
        VerifyVoteExtension(super::VerifyVoteExtensionRequest),
        #[prost(message, tag = "20")]
        FinalizeBlock(super::FinalizeBlockRequest),
    }
}

impl Request {
    /// Short name of the carried case, used in logs and error messages
    pub fn kind(&self) -> &'static str {
        use request::Value;
        match &self.value {
            None => "empty",
            Some(Value::Echo(_)) => "echo",
            Some(Value::Flush(_)) => "flush",
            Some(Value::Info(_)) => "info",
            Some(Value::InitChain(_)) => "init_chain",
            Some(Value::Query(_)) => "query",
            Some(Value::CheckTx(_)) => "check_tx",
            Some(Value::Commit(_)) => "commit",
            Some(Value::ListSnapshots(_)) => "list_snapshots",
            Some(Value::OfferSnapshot(_)) => "offer_snapshot",
            Some(Value::LoadSnapshotChunk(_)) => "load_snapshot_chunk",
            Some(Value::ApplySnapshotChunk(_)) => "apply_snapshot_chunk",
            Some(Value::PrepareProposal(_)) => "prepare_proposal",
            Some(Value::ProcessProposal(_)) => "process_proposal",
            Some(Value::ExtendVote(_)) => "extend_vote",
            Some(Value::VerifyVoteExtension(_)) => "verify_vote_extension",
            Some(Value::FinalizeBlock(_)) => "finalize_block",
        }
    }
}

impl From<request::Value> for Request {
    fn from(value: request::Value) -> Self {
        Request { value: Some(value) }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EchoRequest {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FlushRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InfoRequest {
    #[prost(string, tag = "1")]
    pub version: String,
    #[prost(uint64, tag = "2")]
    pub block_version: u64,
    #[prost(uint64, tag = "3")]
    pub p2p_version: u64,
    #[prost(string, tag = "4")]
    pub abci_version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitChainRequest {
    #[prost(message, optional, tag = "1")]
    pub time: Option<Timestamp>,
    #[prost(string, tag = "2")]
    pub chain_id: String,
    #[prost(message, optional, tag = "3")]
    pub consensus_params: Option<ConsensusParams>,
    #[prost(message, repeated, tag = "4")]
    pub validators: Vec<ValidatorUpdate>,
    #[prost(bytes = "vec", tag = "5")]
    pub app_state_bytes: Vec<u8>,
    #[prost(int64, tag = "6")]
    pub initial_height: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(string, tag = "2")]
    pub path: String,
    #[prost(int64, tag = "3")]
    pub height: i64,
    #[prost(bool, tag = "4")]
    pub prove: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CheckTxType {
    Unknown = 0,
    Recheck = 1,
    Check = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckTxRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub tx: Vec<u8>,
    #[prost(enumeration = "CheckTxType", tag = "3")]
    pub r#type: i32,
}

impl CheckTxRequest {
    /// True when the engine re-validates a transaction already in its mempool
    pub fn is_recheck(&self) -> bool {
        self.r#type == CheckTxType::Recheck as i32
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListSnapshotsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OfferSnapshotRequest {
    #[prost(message, optional, tag = "1")]
    pub snapshot: Option<Snapshot>,
    #[prost(bytes = "vec", tag = "2")]
    pub app_hash: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoadSnapshotChunkRequest {
    #[prost(uint64, tag = "1")]
    pub height: u64,
    #[prost(uint32, tag = "2")]
    pub format: u32,
    #[prost(uint32, tag = "3")]
    pub chunk: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplySnapshotChunkRequest {
    #[prost(uint32, tag = "1")]
    pub index: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub chunk: Vec<u8>,
    #[prost(string, tag = "3")]
    pub sender: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrepareProposalRequest {
    #[prost(int64, tag = "1")]
    pub max_tx_bytes: i64,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub txs: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "3")]
    pub local_last_commit: Option<ExtendedCommitInfo>,
    #[prost(message, repeated, tag = "4")]
    pub misbehavior: Vec<Misbehavior>,
    #[prost(int64, tag = "5")]
    pub height: i64,
    #[prost(message, optional, tag = "6")]
    pub time: Option<Timestamp>,
    #[prost(bytes = "vec", tag = "7")]
    pub next_validators_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub proposer_address: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProcessProposalRequest {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub txs: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "2")]
    pub proposed_last_commit: Option<CommitInfo>,
    #[prost(message, repeated, tag = "3")]
    pub misbehavior: Vec<Misbehavior>,
    #[prost(bytes = "vec", tag = "4")]
    pub hash: Vec<u8>,
    #[prost(int64, tag = "5")]
    pub height: i64,
    #[prost(message, optional, tag = "6")]
    pub time: Option<Timestamp>,
    #[prost(bytes = "vec", tag = "7")]
    pub next_validators_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub proposer_address: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtendVoteRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub height: i64,
    #[prost(message, optional, tag = "3")]
    pub time: Option<Timestamp>,
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub txs: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "5")]
    pub proposed_last_commit: Option<CommitInfo>,
    #[prost(message, repeated, tag = "6")]
    pub misbehavior: Vec<Misbehavior>,
    #[prost(bytes = "vec", tag = "7")]
    pub next_validators_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub proposer_address: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerifyVoteExtensionRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub validator_address: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub height: i64,
    #[prost(bytes = "vec", tag = "4")]
    pub vote_extension: Vec<u8>,
}

/// Delivers a decided block to the application.
///
/// `syncing_to_height` is the engine's target height while it replays
/// stored blocks; during live operation it equals `height` (or is left zero
/// by engines that do not report it).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FinalizeBlockRequest {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub txs: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "2")]
    pub decided_last_commit: Option<CommitInfo>,
    #[prost(message, repeated, tag = "3")]
    pub misbehavior: Vec<Misbehavior>,
    #[prost(bytes = "vec", tag = "4")]
    pub hash: Vec<u8>,
    #[prost(int64, tag = "5")]
    pub height: i64,
    #[prost(message, optional, tag = "6")]
    pub time: Option<Timestamp>,
    #[prost(bytes = "vec", tag = "7")]
    pub next_validators_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub proposer_address: Vec<u8>,
    #[prost(int64, tag = "9")]
    pub syncing_to_height: i64,
}
