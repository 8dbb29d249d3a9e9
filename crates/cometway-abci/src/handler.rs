//! Request dispatch.
//!
//! The engine's requests arrive as one tagged union. [`dispatch`] matches on
//! the case and calls the corresponding [`AbciHandler`] method, so an
//! application only implements the calls it cares about.

use cometway_proto::{
    ApplySnapshotChunkRequest, ApplySnapshotChunkResponse,
    ApplySnapshotChunkResult, CheckTxRequest, CheckTxResponse, CommitRequest, CommitResponse,
    EchoRequest, EchoResponse, ExtendVoteRequest, ExtendVoteResponse, FinalizeBlockRequest,
    FinalizeBlockResponse, FlushRequest, FlushResponse, InfoRequest, InfoResponse,
    InitChainRequest, InitChainResponse, ListSnapshotsRequest, ListSnapshotsResponse,
    LoadSnapshotChunkRequest, LoadSnapshotChunkResponse, OfferSnapshotRequest,
    OfferSnapshotResponse, OfferSnapshotResult, PrepareProposalRequest, PrepareProposalResponse,
    ProcessProposalRequest, ProcessProposalResponse, QueryRequest, QueryResponse, Request,
    Response, VerifyStatus, VerifyVoteExtensionRequest, VerifyVoteExtensionResponse,
};
use tracing::warn;

use crate::error::Result;

/// Application side of the ABCI protocol.
///
/// Methods are called synchronously from a blocking worker thread, one at a
/// time per connection. Different connections may call concurrently, so
/// implementations guard shared state themselves. Returning an error tears
/// the connection down and fails the server.
pub trait AbciHandler: Send + Sync + 'static {
    fn echo(&self, request: EchoRequest) -> Result<EchoResponse> {
        Ok(EchoResponse {
            message: request.message,
        })
    }

    fn flush(&self, _request: FlushRequest) -> Result<FlushResponse> {
        Ok(FlushResponse {})
    }

    fn info(&self, _request: InfoRequest) -> Result<InfoResponse> {
        Ok(InfoResponse::default())
    }

    fn init_chain(&self, _request: InitChainRequest) -> Result<InitChainResponse> {
        Ok(InitChainResponse::default())
    }

    fn query(&self, _request: QueryRequest) -> Result<QueryResponse> {
        Ok(QueryResponse::default())
    }

    fn check_tx(&self, _request: CheckTxRequest) -> Result<CheckTxResponse> {
        Ok(CheckTxResponse::default())
    }

    fn commit(&self, _request: CommitRequest) -> Result<CommitResponse> {
        Ok(CommitResponse::default())
    }

    fn list_snapshots(&self, _request: ListSnapshotsRequest) -> Result<ListSnapshotsResponse> {
        Ok(ListSnapshotsResponse::default())
    }

    fn offer_snapshot(&self, _request: OfferSnapshotRequest) -> Result<OfferSnapshotResponse> {
        Ok(OfferSnapshotResponse {
            result: OfferSnapshotResult::Reject.into(),
        })
    }

    fn load_snapshot_chunk(
        &self,
        _request: LoadSnapshotChunkRequest,
    ) -> Result<LoadSnapshotChunkResponse> {
        Ok(LoadSnapshotChunkResponse::default())
    }

    fn apply_snapshot_chunk(
        &self,
        _request: ApplySnapshotChunkRequest,
    ) -> Result<ApplySnapshotChunkResponse> {
        Ok(ApplySnapshotChunkResponse {
            result: ApplySnapshotChunkResult::Abort.into(),
            ..Default::default()
        })
    }

    fn prepare_proposal(&self, request: PrepareProposalRequest) -> Result<PrepareProposalResponse> {
        Ok(PrepareProposalResponse { txs: request.txs })
    }

    fn process_proposal(&self, _request: ProcessProposalRequest) -> Result<ProcessProposalResponse> {
        Ok(ProcessProposalResponse {
            status: VerifyStatus::Accept.into(),
        })
    }

    fn extend_vote(&self, _request: ExtendVoteRequest) -> Result<ExtendVoteResponse> {
        Ok(ExtendVoteResponse::default())
    }

    fn verify_vote_extension(
        &self,
        _request: VerifyVoteExtensionRequest,
    ) -> Result<VerifyVoteExtensionResponse> {
        Ok(VerifyVoteExtensionResponse {
            status: VerifyStatus::Accept.into(),
        })
    }

    fn finalize_block(&self, _request: FinalizeBlockRequest) -> Result<FinalizeBlockResponse> {
        Ok(FinalizeBlockResponse::default())
    }
}

/// Route `request` to the matching handler method.
///
/// A request with no recognised case (including ones from a newer protocol
/// revision that decode to nothing) is answered with an exception response.
pub fn dispatch(handler: &dyn AbciHandler, request: Request) -> Result<Response> {
    use cometway_proto::request::Value as Req;
    use cometway_proto::response::Value as Res;

    let value = match request.value {
        Some(Req::Echo(req)) => Res::Echo(handler.echo(req)?),
        Some(Req::Flush(req)) => Res::Flush(handler.flush(req)?),
        Some(Req::Info(req)) => Res::Info(handler.info(req)?),
        Some(Req::InitChain(req)) => Res::InitChain(handler.init_chain(req)?),
        Some(Req::Query(req)) => Res::Query(handler.query(req)?),
        Some(Req::CheckTx(req)) => Res::CheckTx(handler.check_tx(req)?),
        Some(Req::Commit(req)) => Res::Commit(handler.commit(req)?),
        Some(Req::ListSnapshots(req)) => Res::ListSnapshots(handler.list_snapshots(req)?),
        Some(Req::OfferSnapshot(req)) => Res::OfferSnapshot(handler.offer_snapshot(req)?),
        Some(Req::LoadSnapshotChunk(req)) => {
            Res::LoadSnapshotChunk(handler.load_snapshot_chunk(req)?)
        }
        Some(Req::ApplySnapshotChunk(req)) => {
            Res::ApplySnapshotChunk(handler.apply_snapshot_chunk(req)?)
        }
        Some(Req::PrepareProposal(req)) => Res::PrepareProposal(handler.prepare_proposal(req)?),
        Some(Req::ProcessProposal(req)) => Res::ProcessProposal(handler.process_proposal(req)?),
        Some(Req::ExtendVote(req)) => Res::ExtendVote(handler.extend_vote(req)?),
        Some(Req::VerifyVoteExtension(req)) => {
            Res::VerifyVoteExtension(handler.verify_vote_extension(req)?)
        }
        Some(Req::FinalizeBlock(req)) => Res::FinalizeBlock(handler.finalize_block(req)?),
        None => {
            warn!("ABCI request with unknown or missing case");
            return Ok(Response::exception("unknown request"));
        }
    };
    Ok(value.into())
}
