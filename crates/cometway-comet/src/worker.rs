//! Adapter bring-up and supervision.
//!
//! One task walks the lifecycle: configure the engine home, optionally
//! inspect the engine's stored state, serve the ABCI socket, launch the
//! engine, wait for it to talk to us, then watch the engine and the socket
//! until stop is requested or something fails. Stop is checked at every
//! stage and the worker may be held at any stage by the pause state.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cometway_abci::{AbciHandler, AbciServer};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::comet::CometCore;
use crate::config::{CometConfig, ConfigError};
use crate::error::{CometError, Result};
use crate::process::{run_command, EngineProcess};
use crate::provision::{patch_config_toml, wipe_data, write_documents, EngineLayout};
use crate::rpc::CometRpcClient;
use crate::state::AdapterState;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);
const TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// Worker entry point. Leaves the adapter in `Finished` or `Terminated`.
pub(crate) async fn run(core: Arc<CometCore>, config: CometConfig, mut stop: watch::Receiver<bool>) {
    let mut engine: Option<EngineProcess> = None;
    let mut abci: Option<AbciServer> = None;

    let result = bring_up(&core, &config, &mut stop, &mut engine, &mut abci).await;

    core.close_outbound();
    if let Some(process) = engine.take() {
        if let Err(e) = process.terminate(TERMINATE_GRACE).await {
            warn!("failed to terminate the engine: {}", e);
        }
    }
    if let Some(mut server) = abci.take() {
        server.stop().await;
    }

    let next = match result {
        Ok(()) | Err(CometError::Stopped) => AdapterState::Finished,
        Err(e) => {
            core.raise_error(e.code(), e.to_string());
            AdapterState::Terminated
        }
    };
    if let Err(e) = core.transition(next) {
        warn!("{}", e);
    }
}

/// Enter `next`, then hold there while it is the pause state
async fn advance(
    core: &CometCore,
    stop: &mut watch::Receiver<bool>,
    next: AdapterState,
) -> Result<()> {
    if *stop.borrow() {
        return Err(CometError::Stopped);
    }
    core.transition(next)?;
    core.machine().hold_if_paused(stop).await
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    // a dropped sender counts as a stop request
    let _ = stop.wait_for(|stop| *stop).await;
}

async fn bring_up(
    core: &Arc<CometCore>,
    config: &CometConfig,
    stop: &mut watch::Receiver<bool>,
    engine: &mut Option<EngineProcess>,
    abci: &mut Option<AbciServer>,
) -> Result<()> {
    let layout = EngineLayout::new(&config.home);
    let socket = config.socket_path();

    let mut wiped = false;
    loop {
        advance(core, stop, AdapterState::Configuring).await?;
        configure(config, &layout, &socket).await?;
        advance(core, stop, AdapterState::Configured).await?;

        if !(config.inspect && config.launch_engine) {
            break;
        }

        advance(core, stop, AdapterState::InspectingEngine).await?;
        match inspect(core, config, stop).await {
            Ok(height) => {
                info!(height, "engine block store inspected");
                core.set_engine_height(height);
                let listener = Arc::clone(&core.listener);
                tokio::task::spawn_blocking(move || listener.current_cometbft_height(height))
                    .await
                    .map_err(|e| CometError::Engine(format!("listener panicked: {e}")))?;
                advance(core, stop, AdapterState::InspectedEngine).await?;
                break;
            }
            Err(CometError::Inconsistent(reason)) if config.wipe_on_inconsistency && !wiped => {
                warn!("engine state unusable ({}), wiping it and reconfiguring", reason);
                wipe_data(&layout)?;
                wiped = true;
            }
            Err(e) => return Err(e),
        }
    }

    advance(core, stop, AdapterState::StartingAbci).await?;
    let handler: Arc<dyn AbciHandler> = Arc::clone(core) as Arc<dyn AbciHandler>;
    let mut server = AbciServer::new(&socket, handler);
    server.start()?;
    let server = abci.insert(server);
    advance(core, stop, AdapterState::StartedAbci).await?;

    advance(core, stop, AdapterState::StartingEngine).await?;
    if config.launch_engine {
        let args = [
            OsString::from("start"),
            OsString::from("--abci=socket"),
            OsString::from(format!("--proxy_app=unix://{}", socket.display())),
            OsString::from(format!("--home={}", config.home.display())),
        ];
        *engine = Some(EngineProcess::spawn(&config.executable, &args)?);
    } else {
        info!("engine is managed externally, waiting for it on {}", socket.display());
    }
    advance(core, stop, AdapterState::StartedEngine).await?;

    advance(core, stop, AdapterState::TestingEngine).await?;
    let rpc = test_engine(core, config, stop, engine, server).await?;
    advance(core, stop, AdapterState::TestedEngine).await?;

    core.open_outbound(rpc, config.max_tx_bytes);
    advance(core, stop, AdapterState::Running).await?;
    info!("adapter running");

    tokio::select! {
        _ = stopped(stop) => Ok(()),
        _ = server.closed() => Err(abci_failure(server)),
        reason = engine_exit(engine) => Err(CometError::Engine(reason)),
    }
}

fn abci_failure(server: &AbciServer) -> CometError {
    CometError::AbciServer(
        server
            .failure_reason()
            .unwrap_or_else(|| "server closed".to_string()),
    )
}

/// Resolves when the supervised engine exits; never without one
async fn engine_exit(engine: &mut Option<EngineProcess>) -> String {
    match engine {
        Some(process) => match process.wait().await {
            Ok(status) => format!("{} exited with {}", process.command(), status),
            Err(e) => format!("lost track of {}: {}", process.command(), e),
        },
        None => std::future::pending().await,
    }
}

async fn configure(config: &CometConfig, layout: &EngineLayout, socket: &Path) -> Result<()> {
    config.validate()?;

    if config.launch_engine && layout.needs_init() {
        info!("initializing engine home {}", config.home.display());
        let args = [OsStr::new("init"), OsStr::new("--home"), config.home.as_os_str()];
        run_command(&config.executable, &args, config.handshake_timeout()).await?;
    }

    write_documents(config, layout)?;
    patch_config_toml(config, layout, socket)?;
    Ok(())
}

fn is_node_id(id: &str) -> bool {
    id.len() == 40 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Learn the node id and the height of the engine's block store.
///
/// The engine's `inspect` mode opens the stores read-only and serves RPC; an
/// `inspect` that dies before answering means stores it cannot open.
async fn inspect(
    core: &CometCore,
    config: &CometConfig,
    stop: &mut watch::Receiver<bool>,
) -> Result<u64> {
    let home = config.home.as_os_str();
    let output = run_command(
        &config.executable,
        &[OsStr::new("show-node-id"), OsStr::new("--home"), home],
        config.handshake_timeout(),
    )
    .await?;
    let node_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !is_node_id(&node_id) {
        return Err(CometError::Data(format!(
            "unexpected show-node-id output {node_id:?}"
        )));
    }
    core.set_node_id(node_id);

    let port = config.rpc_port.ok_or(ConfigError::Missing("rpc_port"))?;
    let args = [
        OsString::from("inspect"),
        OsString::from(format!("--home={}", config.home.display())),
        OsString::from(format!("--rpc.laddr=tcp://{}:{}", config.rpc_host, port)),
    ];
    let mut process = EngineProcess::spawn(&config.executable, &args)?;
    let result = inspected_height(config, port, &mut process, stop).await;
    if let Err(e) = process.terminate(TERMINATE_GRACE).await {
        warn!("failed to stop engine inspect: {}", e);
    }
    result
}

async fn inspected_height(
    config: &CometConfig,
    port: u16,
    process: &mut EngineProcess,
    stop: &mut watch::Receiver<bool>,
) -> Result<u64> {
    let rpc = CometRpcClient::new(&config.rpc_host, port, config.rpc_timeout())?;
    let deadline = Instant::now() + config.handshake_timeout();
    loop {
        if *stop.borrow() {
            return Err(CometError::Stopped);
        }
        if !process.is_alive() {
            return Err(CometError::Inconsistent(
                "engine inspect exited before serving RPC".to_string(),
            ));
        }
        match rpc.latest_height().await {
            Ok(height) => return Ok(height),
            Err(e) if Instant::now() < deadline => debug!("inspect RPC not ready: {}", e),
            Err(e) => return Err(e.into()),
        }
        tokio::select! {
            _ = stopped(stop) => return Err(CometError::Stopped),
            _ = tokio::time::sleep(RETRY_INTERVAL) => {}
        }
    }
}

/// Wait for the engine's ABCI handshake, then for its RPC to answer.
///
/// Returns the RPC client for outbound calls, if an RPC port is configured.
async fn test_engine(
    core: &CometCore,
    config: &CometConfig,
    stop: &mut watch::Receiver<bool>,
    engine: &mut Option<EngineProcess>,
    server: &AbciServer,
) -> Result<Option<CometRpcClient>> {
    let deadline = Instant::now() + config.handshake_timeout();
    let mut handshakes = core.handshakes.subscribe();
    loop {
        if *handshakes.borrow_and_update() > 0 {
            break;
        }
        tokio::select! {
            _ = stopped(stop) => return Err(CometError::Stopped),
            _ = tokio::time::sleep_until(deadline) => return Err(CometError::AbciTimeout),
            _ = server.closed() => return Err(abci_failure(server)),
            reason = engine_exit(engine) => return Err(CometError::Engine(reason)),
            changed = handshakes.changed() => {
                if changed.is_err() {
                    return Err(CometError::Stopped);
                }
            }
        }
    }
    debug!("engine completed the ABCI handshake");

    let Some(port) = config.rpc_port else {
        return Ok(None);
    };
    let rpc = CometRpcClient::new(&config.rpc_host, port, config.rpc_timeout())?;
    let deadline = Instant::now() + config.handshake_timeout();
    loop {
        let attempt = tokio::select! {
            _ = stopped(stop) => return Err(CometError::Stopped),
            reason = engine_exit(engine) => return Err(CometError::Engine(reason)),
            attempt = rpc.health() => attempt,
        };
        match attempt {
            Ok(()) => break,
            Err(e) if Instant::now() < deadline => debug!("engine RPC not ready: {}", e),
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(RETRY_INTERVAL).await;
    }
    info!("engine RPC is up at {}", rpc.url());
    Ok(Some(rpc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_node_id() {
        assert!(is_node_id("0123456789abcdef0123456789ABCDEF01234567"));
        assert!(!is_node_id("0123456789abcdef"));
        assert!(!is_node_id("0123456789abcdef0123456789abcdef0123456z"));
    }
}
