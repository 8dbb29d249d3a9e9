//! Messages shared between several ABCI requests and responses.
//!
//! Field numbers follow the `cometbft.abci.v1`, `cometbft.types.v1` and
//! `cometbft.crypto.v1` schemas so that the wire bytes are interchangeable
//! with what the engine produces.

use prost_types::{Duration, Timestamp};

/// Event emitted by the application while executing a block or a transaction
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Event {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(message, repeated, tag = "2")]
    pub attributes: Vec<EventAttribute>,
}

/// Single key/value pair attached to an [`Event`]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventAttribute {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
    /// Whether the engine should index this attribute
    #[prost(bool, tag = "3")]
    pub index: bool,
}

/// Outcome of one transaction in a finalized block
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecTxResult {
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

/// Change to the validator set. A power of zero removes the validator.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidatorUpdate {
    #[prost(int64, tag = "2")]
    pub power: i64,
    #[prost(bytes = "vec", tag = "3")]
    pub pub_key_bytes: Vec<u8>,
    #[prost(string, tag = "4")]
    pub pub_key_type: String,
}

/// Validator as seen in commit information (address only, no key)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Validator {
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub power: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VoteInfo {
    #[prost(message, optional, tag = "1")]
    pub validator: Option<Validator>,
    #[prost(enumeration = "BlockIdFlag", tag = "3")]
    pub block_id_flag: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtendedVoteInfo {
    #[prost(message, optional, tag = "1")]
    pub validator: Option<Validator>,
    #[prost(bytes = "vec", tag = "3")]
    pub vote_extension: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub extension_signature: Vec<u8>,
    #[prost(enumeration = "BlockIdFlag", tag = "5")]
    pub block_id_flag: i32,
}

/// Votes that committed the previous block
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitInfo {
    #[prost(int32, tag = "1")]
    pub round: i32,
    #[prost(message, repeated, tag = "2")]
    pub votes: Vec<VoteInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtendedCommitInfo {
    #[prost(int32, tag = "1")]
    pub round: i32,
    #[prost(message, repeated, tag = "2")]
    pub votes: Vec<ExtendedVoteInfo>,
}

/// Evidence of validator misbehavior
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Misbehavior {
    #[prost(enumeration = "MisbehaviorType", tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub validator: Option<Validator>,
    #[prost(int64, tag = "3")]
    pub height: i64,
    #[prost(message, optional, tag = "4")]
    pub time: Option<Timestamp>,
    #[prost(int64, tag = "5")]
    pub total_voting_power: i64,
}

/// State sync snapshot descriptor
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Snapshot {
    #[prost(uint64, tag = "1")]
    pub height: u64,
    #[prost(uint32, tag = "2")]
    pub format: u32,
    #[prost(uint32, tag = "3")]
    pub chunks: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub metadata: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProofOp {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProofOps {
    #[prost(message, repeated, tag = "1")]
    pub ops: Vec<ProofOp>,
}

/// Consensus parameters the application may set at genesis or per block
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConsensusParams {
    #[prost(message, optional, tag = "1")]
    pub block: Option<BlockParams>,
    #[prost(message, optional, tag = "2")]
    pub evidence: Option<EvidenceParams>,
    #[prost(message, optional, tag = "3")]
    pub validator: Option<ValidatorParams>,
    #[prost(message, optional, tag = "4")]
    pub version: Option<VersionParams>,
    #[prost(message, optional, tag = "5")]
    pub abci: Option<AbciParams>,
    #[prost(message, optional, tag = "6")]
    pub synchrony: Option<SynchronyParams>,
    #[prost(message, optional, tag = "7")]
    pub feature: Option<FeatureParams>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockParams {
    #[prost(int64, tag = "1")]
    pub max_bytes: i64,
    #[prost(int64, tag = "2")]
    pub max_gas: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvidenceParams {
    #[prost(int64, tag = "1")]
    pub max_age_num_blocks: i64,
    #[prost(message, optional, tag = "2")]
    pub max_age_duration: Option<Duration>,
    #[prost(int64, tag = "3")]
    pub max_bytes: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidatorParams {
    #[prost(string, repeated, tag = "1")]
    pub pub_key_types: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionParams {
    #[prost(uint64, tag = "1")]
    pub app: u64,
}

/// Deprecated in favour of [`FeatureParams`], kept for wire compatibility
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AbciParams {
    #[prost(int64, tag = "1")]
    pub vote_extensions_enable_height: i64,
}

/// Proposer-based timestamp bounds
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SynchronyParams {
    #[prost(message, optional, tag = "1")]
    pub precision: Option<Duration>,
    #[prost(message, optional, tag = "2")]
    pub message_delay: Option<Duration>,
}

/// Heights at which optional consensus features switch on.
///
/// Both fields are `google.protobuf.Int64Value` wrappers on the wire.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FeatureParams {
    #[prost(message, optional, tag = "1")]
    pub vote_extensions_enable_height: Option<i64>,
    #[prost(message, optional, tag = "2")]
    pub pbts_enable_height: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum BlockIdFlag {
    Unknown = 0,
    Absent = 1,
    Commit = 2,
    Nil = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MisbehaviorType {
    Unknown = 0,
    DuplicateVote = 1,
    LightClientAttack = 2,
}
