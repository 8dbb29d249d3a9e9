//! ABCI server lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{AbciError, Result};
use crate::handler::AbciHandler;
use crate::net_server::NetServer;

struct Active {
    net: Arc<NetServer>,
    task: JoinHandle<()>,
}

/// Unix socket ABCI server.
///
/// `start` binds the socket and spawns the accept loop on the current tokio
/// runtime; `stop` closes every session and waits until no handler call is
/// in flight. Both are idempotent.
pub struct AbciServer {
    socket_path: PathBuf,
    handler: Arc<dyn AbciHandler>,
    active: Option<Active>,
}

impl AbciServer {
    pub fn new(socket_path: impl Into<PathBuf>, handler: Arc<dyn AbciHandler>) -> Self {
        Self {
            socket_path: socket_path.into(),
            handler,
            active: None,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket and start accepting. No-op when already started.
    ///
    /// A socket file left behind by a previous run is removed first.
    pub fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Ok(());
        }
        let runtime = Handle::try_current()
            .map_err(|e| AbciError::ServerError(format!("no tokio runtime: {e}")))?;

        remove_stale_socket(&self.socket_path)?;
        if let Some(parent) = self.socket_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let listener = {
            let _guard = runtime.enter();
            UnixListener::bind(&self.socket_path)?
        };
        let net = NetServer::new(Arc::clone(&self.handler));
        let task = runtime.spawn(Arc::clone(&net).run(listener));
        info!("ABCI server listening on {}", self.socket_path.display());

        self.active = Some(Active { net, task });
        Ok(())
    }

    /// Close all sessions, stop accepting and remove the socket file.
    ///
    /// Safe to call when never started or when the engine never connected.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.net.close();
        if let Err(e) = active.task.await {
            error!("ABCI server task ended abnormally: {}", e);
        }
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            debug!("socket file not removed: {}", e);
        }
        info!("ABCI server stopped");
    }

    /// True while the accept loop (or its session drain) is still live
    pub fn running(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| !active.task.is_finished())
            .unwrap_or(false)
    }

    pub fn failed(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| active.net.failed())
            .unwrap_or(false)
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.active.as_ref().and_then(|active| active.net.reason())
    }

    /// Resolves when the running server closes or fails. Returns at once when
    /// the server is not started.
    pub async fn closed(&self) {
        if let Some(active) = &self.active {
            active.net.closed().await;
        }
    }
}

impl Drop for AbciServer {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.net.close();
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("removed stale socket {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
