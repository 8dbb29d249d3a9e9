//! Engine process supervision.
//!
//! The engine runs as a child in its own process group. Its stdout and stderr
//! are forwarded line by line to tracing under the `cometbft` target.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use cometway_log::ENGINE_TARGET;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CometError, Result};

fn describe<S: AsRef<OsStr>>(executable: &Path, args: &[S]) -> String {
    let mut line = executable.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

fn forward_lines<R>(reader: R, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: ENGINE_TARGET, stream, "{}", line);
        }
    })
}

/// Run a short-lived engine command to completion and collect its output
pub async fn run_command<S: AsRef<OsStr>>(
    executable: &Path,
    args: &[S],
    timeout: Duration,
) -> Result<Output> {
    let command = describe(executable, args);
    debug!("running {}", command);

    let child = Command::new(executable)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CometError::Run {
            command: command.clone(),
            reason: e.to_string(),
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| CometError::RunTimeout {
            command: command.clone(),
        })?
        .map_err(|e| CometError::Run {
            command: command.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(CometError::Run {
            command,
            reason: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(output)
}

/// A supervised long-running engine process
pub struct EngineProcess {
    command: String,
    child: Child,
    pumps: Vec<JoinHandle<()>>,
}

impl EngineProcess {
    pub fn spawn<S: AsRef<OsStr>>(executable: &Path, args: &[S]) -> Result<Self> {
        let command = describe(executable, args);
        let mut cmd = Command::new(executable);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| CometError::Run {
            command: command.clone(),
            reason: e.to_string(),
        })?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(forward_lines(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(forward_lines(stderr, "stderr"));
        }
        info!(pid = child.id(), "started {}", command);

        Ok(Self {
            command,
            child,
            pumps,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for the process to exit on its own.
    ///
    /// Cancel safe: dropping the future leaves the process running.
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Ask the process to exit, then kill it after `grace`
    pub async fn terminate(mut self, grace: Duration) -> Result<()> {
        if !self.is_alive() {
            self.finish().await;
            return Ok(());
        }
        if let Some(pid) = self.child.id() {
            debug!(pid, "sending SIGTERM to {}", self.command);
            if send_sigterm(KILL_PROGRAM, pid, &self.command).await {
                if let Ok(status) = tokio::time::timeout(grace, self.child.wait()).await {
                    info!("{} exited with {}", self.command, status?);
                    self.finish().await;
                    return Ok(());
                }
            }
        }
        warn!("{} did not exit in time, killing it", self.command);
        self.child.kill().await?;
        self.finish().await;
        Ok(())
    }

    async fn finish(&mut self) {
        for pump in self.pumps.drain(..) {
            let _ = pump.await;
        }
    }
}

const KILL_PROGRAM: &str = "kill";

/// Deliver SIGTERM through `program`, returning whether it was sent
async fn send_sigterm(program: &str, pid: u32, name: &str) -> bool {
    let status = Command::new(program)
        .args(["-TERM", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!("{program} -TERM {pid} for {name} exited with {status}");
            false
        }
        Err(e) => {
            warn!("could not run {program} to stop {name} ({e}), killing it without a grace period");
            false
        }
    }
}
