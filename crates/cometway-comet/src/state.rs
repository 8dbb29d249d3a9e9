//! Adapter lifecycle states.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::error::{CometError, Result};

/// Lifecycle stage of the adapter, in bring-up order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AdapterState {
    Stopped = 0,
    Started = 1,
    Configuring = 2,
    Configured = 3,
    InspectingEngine = 4,
    InspectedEngine = 5,
    StartingAbci = 6,
    StartedAbci = 7,
    StartingEngine = 8,
    StartedEngine = 9,
    TestingEngine = 10,
    TestedEngine = 11,
    Running = 12,
    Terminated = 13,
    Finished = 14,
}

const NO_PAUSE: u8 = u8::MAX;

impl AdapterState {
    pub const ALL: [AdapterState; 15] = [
        AdapterState::Stopped,
        AdapterState::Started,
        AdapterState::Configuring,
        AdapterState::Configured,
        AdapterState::InspectingEngine,
        AdapterState::InspectedEngine,
        AdapterState::StartingAbci,
        AdapterState::StartedAbci,
        AdapterState::StartingEngine,
        AdapterState::StartedEngine,
        AdapterState::TestingEngine,
        AdapterState::TestedEngine,
        AdapterState::Running,
        AdapterState::Terminated,
        AdapterState::Finished,
    ];

    fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdapterState::Stopped => "Stopped",
            AdapterState::Started => "Started",
            AdapterState::Configuring => "Configuring",
            AdapterState::Configured => "Configured",
            AdapterState::InspectingEngine => "InspectingEngine",
            AdapterState::InspectedEngine => "InspectedEngine",
            AdapterState::StartingAbci => "StartingABCI",
            AdapterState::StartedAbci => "StartedABCI",
            AdapterState::StartingEngine => "StartingEngine",
            AdapterState::StartedEngine => "StartedEngine",
            AdapterState::TestingEngine => "TestingEngine",
            AdapterState::TestedEngine => "TestedEngine",
            AdapterState::Running => "Running",
            AdapterState::Terminated => "Terminated",
            AdapterState::Finished => "Finished",
        }
    }

    /// True for the two states a worker ends in
    pub fn is_final(&self) -> bool {
        matches!(self, AdapterState::Terminated | AdapterState::Finished)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Bring-up moves one step forward at a time; inspection may skip or send
    /// the worker back to `Configuring` after wiping engine data. Any live
    /// stage may end in `Terminated` or `Finished`, and only those two lead
    /// back to `Stopped`.
    pub fn can_transition_to(&self, next: AdapterState) -> bool {
        use AdapterState::*;
        match (*self, next) {
            (Stopped, Started) => true,
            (Started, Configuring) => true,
            (Configuring, Configured) => true,
            (Configured, InspectingEngine) | (Configured, StartingAbci) => true,
            (InspectingEngine, InspectedEngine) | (InspectingEngine, Configuring) => true,
            (InspectedEngine, StartingAbci) => true,
            (StartingAbci, StartedAbci) => true,
            (StartedAbci, StartingEngine) => true,
            (StartingEngine, StartedEngine) => true,
            (StartedEngine, TestingEngine) => true,
            (TestingEngine, TestedEngine) => true,
            (TestedEngine, Running) => true,
            (Terminated, Stopped) | (Finished, Stopped) => true,
            (from, Terminated) | (from, Finished) => from != Stopped && !from.is_final(),
            _ => false,
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current stage plus pause target, readable from any thread.
///
/// Both live in atomics so `state()` never blocks; a watch channel wakes
/// anyone waiting for either to change.
pub struct StateMachine {
    state: AtomicU8,
    pause: AtomicU8,
    changed: watch::Sender<()>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(());
        Self {
            state: AtomicU8::new(AdapterState::Stopped as u8),
            pause: AtomicU8::new(NO_PAUSE),
            changed,
        }
    }

    pub fn state(&self) -> AdapterState {
        AdapterState::from_u8(self.state.load(Ordering::SeqCst)).unwrap_or(AdapterState::Stopped)
    }

    pub fn pause_state(&self) -> Option<AdapterState> {
        AdapterState::from_u8(self.pause.load(Ordering::SeqCst))
    }

    /// Set (or clear with `None`) the stage at which the worker holds
    pub fn set_pause_state(&self, pause: Option<AdapterState>) {
        let raw = pause.map(|s| s as u8).unwrap_or(NO_PAUSE);
        self.pause.store(raw, Ordering::SeqCst);
        self.changed.send_replace(());
    }

    /// Move to `next`, returning the previous state
    pub fn transition(&self, next: AdapterState) -> Result<AdapterState> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(CometError::IllegalTransition {
                from: current,
                to: next,
            });
        }
        self.state.store(next as u8, Ordering::SeqCst);
        self.changed.send_replace(());
        info!(from = %current, to = %next, "Adapter state transition");
        Ok(current)
    }

    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.changed.subscribe()
    }

    /// Hold while the pause target equals the current state.
    ///
    /// Returns `Err(Stopped)` as soon as `stop` flips to true.
    pub async fn hold_if_paused(&self, stop: &mut watch::Receiver<bool>) -> Result<()> {
        let mut changed = self.subscribe();
        loop {
            if *stop.borrow() {
                return Err(CometError::Stopped);
            }
            if self.pause_state() != Some(self.state()) {
                return Ok(());
            }
            tokio::select! {
                _ = changed.changed() => {}
                res = stop.changed() => {
                    if res.is_err() {
                        return Err(CometError::Stopped);
                    }
                }
            }
        }
    }

    /// Wait until the state reaches the pause target (or no pause is set).
    ///
    /// `failed` is polled on every wake-up so a worker that dies before
    /// reaching the target does not leave the caller waiting for the timeout.
    pub async fn wait_for_pause<F>(&self, timeout: Duration, failed: F) -> Result<()>
    where
        F: Fn() -> Option<CometError>,
    {
        let mut changed = self.subscribe();
        let wait = async {
            loop {
                if let Some(err) = failed() {
                    return Err(err);
                }
                match self.pause_state() {
                    None => return Ok(()),
                    Some(target) if target == self.state() => return Ok(()),
                    Some(_) => {}
                }
                if changed.changed().await.is_err() {
                    return Err(CometError::Stopped);
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or(Err(CometError::PauseTimeout))
    }
}
