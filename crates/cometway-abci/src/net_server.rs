//! Accept loop and session bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::handler::AbciHandler;
use crate::session::Session;

/// Accepts engine connections and runs a [`Session`] for each.
///
/// The first failure reported through [`NetServer::notify_failure`] (by a
/// session or by the accept loop) wins: it is recorded, every session is
/// closed and no further connection is accepted. [`NetServer::run`] returns
/// once the sessions have drained.
pub struct NetServer {
    handler: Arc<dyn AbciHandler>,
    shutdown: watch::Sender<bool>,
    failure: OnceLock<String>,
    sessions: Mutex<Vec<JoinHandle<()>>>,
    next_session: AtomicU64,
}

impl NetServer {
    pub fn new(handler: Arc<dyn AbciHandler>) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            handler,
            shutdown,
            failure: OnceLock::new(),
            sessions: Mutex::new(Vec::new()),
            next_session: AtomicU64::new(1),
        })
    }

    /// Accept connections until closed or failed, then wait for the sessions
    pub async fn run(self: Arc<Self>, listener: UnixListener) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => self.spawn_session(stream),
                    Err(e) => {
                        self.notify_failure(format!("accept failed: {e}"));
                        break;
                    }
                },
            }
        }
        drop(listener);

        let sessions = match self.sessions.lock() {
            Ok(mut sessions) => std::mem::take(&mut *sessions),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for session in sessions {
            if let Err(e) = session.await {
                error!("ABCI session task aborted: {}", e);
            }
        }
        debug!("ABCI net server drained");
    }

    fn spawn_session(self: &Arc<Self>, stream: tokio::net::UnixStream) {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        info!(session = id, "Accepted ABCI connection");
        let session = Session::new(
            id,
            stream,
            Arc::clone(&self.handler),
            Arc::clone(self),
            self.shutdown.subscribe(),
        );
        let task = tokio::spawn(session.run());
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.retain(|s| !s.is_finished());
            sessions.push(task);
        }
    }

    /// Record a fatal network error and tear everything down.
    ///
    /// Only the first reason is kept; later calls are ignored.
    pub fn notify_failure(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.failure.set(reason.clone()).is_ok() {
            error!("ABCI server failed: {}", reason);
            self.shutdown.send_replace(true);
        }
    }

    /// Stop accepting and close every session without recording a failure
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn failed(&self) -> bool {
        self.failure.get().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.failure.get().cloned()
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once the server has been closed or has failed
    pub async fn closed(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let _ = shutdown.wait_for(|closed| *closed).await;
    }

    /// Sessions whose task has not finished yet
    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .map(|sessions| sessions.iter().filter(|s| !s.is_finished()).count())
            .unwrap_or(0)
    }
}
