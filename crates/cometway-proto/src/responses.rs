//! Response side of the ABCI protocol.

use crate::types::{ConsensusParams, Event, ExecTxResult, ProofOps, Snapshot, ValidatorUpdate};

/// Envelope written back for every request frame
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(
        oneof = "response::Value",
        tags = "1, 2, 3, 4, 6, 7, 9, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21"
    )]
    pub value: Option<response::Value>,
}

pub mod response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "1")]
        Exception(super::ExceptionResponse),
        #[prost(message, tag = "2")]
        Echo(super::EchoResponse),
        #[prost(message, tag = "3")]
        Flush(super::FlushResponse),
        #[prost(message, tag = "4")]
        Info(super::InfoResponse),
        #[prost(message, tag = "6")]
        InitChain(super::InitChainResponse),
        #[prost(message, tag = "7")]
        Query(super::QueryResponse),
        #[prost(message, tag = "9")]
        CheckTx(super::CheckTxResponse),
        #[prost(message, tag = "12")]
        Commit(super::CommitResponse),
        #[prost(message, tag = "13")]
        ListSnapshots(super::ListSnapshotsResponse),
        #[prost(message, tag = "14")]
        OfferSnapshot(super::OfferSnapshotResponse),
        #[prost(message, tag = "15")]
        LoadSnapshotChunk(super::LoadSnapshotChunkResponse),
        #[prost(message, tag = "16")]
        ApplySnapshotChunk(super::ApplySnapshotChunkResponse),
        #[prost(message, tag = "17")]
        PrepareProposal(super::PrepareProposalResponse),
        #[prost(message, tag = "18")]
        ProcessProposal(super::ProcessProposalResponse),
        #[prost(message, tag = "19")]
        ExtendVote(super::ExtendVoteResponse),
        #[prost(message, tag = "20")]
        VerifyVoteExtension(super::VerifyVoteExtensionResponse),
        #[prost(message, tag = "21")]
        FinalizeBlock(super::FinalizeBlockResponse),
    }
}

impl Response {
    /// Short name of the carried case. Matches [`crate::Request::kind`] for
    /// the request this response answers.
    pub fn kind(&self) -> &'static str {
        use response::Value;
        match &self.value {
            None => "empty",
            Some(Value::Exception(_)) => "exception",
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

    /// Builds an exception response carrying `error`
    pub fn exception(error: impl Into<String>) -> Self {
        response::Value::Exception(ExceptionResponse {
            error: error.into(),
        })
        .into()
    }
}

impl From<response::Value> for Response {
    fn from(value: response::Value) -> Self {
        Response { value: Some(value) }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExceptionResponse {
    #[prost(string, tag = "1")]
    pub error: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EchoResponse {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FlushResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InfoResponse {
    #[prost(string, tag = "1")]
    pub data: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(uint64, tag = "3")]
    pub app_version: u64,
    #[prost(int64, tag = "4")]
    pub last_block_height: i64,
    #[prost(bytes = "vec", tag = "5")]
    pub last_block_app_hash: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitChainResponse {
    #[prost(message, optional, tag = "1")]
    pub consensus_params: Option<ConsensusParams>,
    #[prost(message, repeated, tag = "2")]
    pub validators: Vec<ValidatorUpdate>,
    #[prost(bytes = "vec", tag = "3")]
    pub app_hash: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryResponse {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "3")]
    pub log: String,
    #[prost(string, tag = "4")]
    pub info: String,
    #[prost(int64, tag = "5")]
    pub index: i64,
    #[prost(bytes = "vec", tag = "6")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub value: Vec<u8>,
    #[prost(message, optional, tag = "8")]
    pub proof_ops: Option<ProofOps>,
    #[prost(int64, tag = "9")]
    pub height: i64,
    #[prost(string, tag = "10")]
    pub codespace: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckTxResponse {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(string, tag = "3")]
    pub log: String,
    #[prost(string, tag = "4")]
    pub info: String,
    #[prost(int64, tag = "5")]
    pub gas_wanted: i64,
    #[prost(int64, tag = "6")]
    pub gas_used: i64,
    #[prost(message, repeated, tag = "7")]
    pub events: Vec<Event>,
    #[prost(string, tag = "8")]
    pub codespace: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitResponse {
    #[prost(int64, tag = "3")]
    pub retain_height: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListSnapshotsResponse {
    #[prost(message, repeated, tag = "1")]
    pub snapshots: Vec<Snapshot>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OfferSnapshotResult {
    Unknown = 0,
    Accept = 1,
    Abort = 2,
    Reject = 3,
    RejectFormat = 4,
    RejectSender = 5,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OfferSnapshotResponse {
    #[prost(enumeration = "OfferSnapshotResult", tag = "1")]
    pub result: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoadSnapshotChunkResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub chunk: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ApplySnapshotChunkResult {
    Unknown = 0,
    Accept = 1,
    Abort = 2,
    Retry = 3,
    RetrySnapshot = 4,
    RejectSnapshot = 5,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplySnapshotChunkResponse {
    #[prost(enumeration = "ApplySnapshotChunkResult", tag = "1")]
    pub result: i32,
    #[prost(uint32, repeated, tag = "2")]
    pub refetch_chunks: Vec<u32>,
    #[prost(string, repeated, tag = "3")]
    pub reject_senders: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrepareProposalResponse {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub txs: Vec<Vec<u8>>,
}

/// Verdict shared by `ProcessProposal` and `VerifyVoteExtension`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum VerifyStatus {
    Unknown = 0,
    Accept = 1,
    Reject = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProcessProposalResponse {
    #[prost(enumeration = "VerifyStatus", tag = "1")]
    pub status: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtendVoteResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub vote_extension: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerifyVoteExtensionResponse {
    #[prost(enumeration = "VerifyStatus", tag = "1")]
    pub status: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FinalizeBlockResponse {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<Event>,
    #[prost(message, repeated, tag = "2")]
    pub tx_results: Vec<ExecTxResult>,
    #[prost(message, repeated, tag = "3")]
    pub validator_updates: Vec<ValidatorUpdate>,
    #[prost(message, optional, tag = "4")]
    pub consensus_param_updates: Option<ConsensusParams>,
    #[prost(bytes = "vec", tag = "5")]
    pub app_hash: Vec<u8>,
}
