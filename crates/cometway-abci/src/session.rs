//! One accepted engine connection.

use std::sync::Arc;

use cometway_proto::{Message, Request};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::codec;
use crate::error::{AbciError, Result};
use crate::handler::{dispatch, AbciHandler};
use crate::net_server::NetServer;

/// Serves a single socket connection.
///
/// The session task owns the stream. It reads one request, waits for the
/// handler to answer it and writes the response before reading the next one,
/// so responses leave in request order. It stops when the owning
/// [`NetServer`] closes, or on its first framing, socket or handler error,
/// which it reports to the server.
pub struct Session {
    id: u64,
    stream: UnixStream,
    handler: Arc<dyn AbciHandler>,
    server: Arc<NetServer>,
    shutdown: watch::Receiver<bool>,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        stream: UnixStream,
        handler: Arc<dyn AbciHandler>,
        server: Arc<NetServer>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            stream,
            handler,
            server,
            shutdown,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) async fn run(self) {
        let Session {
            id,
            stream,
            handler,
            server,
            mut shutdown,
        } = self;

        debug!(session = id, "ABCI session opened");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        match serve(id, &mut reader, &mut write_half, &handler, &mut shutdown).await {
            Ok(served) => debug!(session = id, served, "ABCI session closed"),
            Err(e) => {
                debug!(session = id, error = %e, "ABCI session failed");
                server.notify_failure(format!("session {id}: {e}"));
            }
        }
        let _ = write_half.shutdown().await;
    }
}

/// Request/response loop. Returns the number of requests answered when the
/// session is closed by its owner.
async fn serve<R, W>(
    id: u64,
    reader: &mut R,
    writer: &mut W,
    handler: &Arc<dyn AbciHandler>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut served = 0u64;
    loop {
        if *shutdown.borrow() {
            return Ok(served);
        }
        let frame = tokio::select! {
            _ = shutdown.changed() => return Ok(served),
            frame = codec::read_frame(reader) => frame?,
        };

        let request = Request::decode(frame.as_slice())?;
        let kind = request.kind();
        trace!(session = id, kind, "ABCI request");

        let handler = Arc::clone(handler);
        let response = tokio::task::spawn_blocking(move || dispatch(handler.as_ref(), request))
            .await
            .map_err(|e| AbciError::ServerError(format!("{kind} handler did not complete: {e}")))??;

        codec::write_frame(writer, &response.encode_to_vec()).await?;
        served += 1;
    }
}
