//! Lifecycle of the background bot: at most one polling loop per process.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shared_types::{BotMode, BotStatusResponse, LogEntry, RunExit};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::SchedulingApi;
use crate::logging::LogBuffer;
use crate::poller::{LoopExit, LoopSettings, LoopSnapshot, PollState, PollingLoop};

pub const DEFAULT_LOG_LIMIT: usize = 50;
pub const MAX_LOG_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("Bot is already running")]
    AlreadyRunning,
    #[error("Bot is not running")]
    NotRunning,
}

struct Run {
    generation: u64,
    /// The state the run was started with
    initial: PollState,
    snapshot: watch::Receiver<LoopSnapshot>,
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    active: bool,
}

#[derive(Default)]
struct Inner {
    run: Option<Run>,
    generation: u64,
    last_exit: Option<RunExit>,
}

/// Handle shared by the control surface.
pub struct BotManager<A: SchedulingApi> {
    api: Arc<A>,
    settings: LoopSettings,
    logs: LogBuffer,
    inner: Arc<Mutex<Inner>>,
}

impl<A: SchedulingApi> Clone for BotManager<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            settings: self.settings.clone(),
            logs: self.logs.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: SchedulingApi> BotManager<A> {
    pub fn new(api: Arc<A>, settings: LoopSettings, logs: LogBuffer) -> Self {
        Self {
            api,
            settings,
            logs,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().run.as_ref().is_some_and(|run| run.active)
    }

    /// Spawn a polling loop for `state`.
    ///
    /// `refresh_delay` overrides the configured delay for this run only.
    pub fn start(
        &self,
        state: PollState,
        refresh_delay: Option<Duration>,
    ) -> Result<BotMode, ManagerError> {
        let mut inner = self.inner.lock();
        if inner.run.as_ref().is_some_and(|run| run.active) {
            return Err(ManagerError::AlreadyRunning);
        }

        let mut settings = self.settings.clone();
        if let Some(delay) = refresh_delay {
            settings.refresh_delay = delay;
        }

        let mode = BotMode::from_dry_run(state.dry_run);
        let (polling, snapshot) = PollingLoop::new(Arc::clone(&self.api), settings, state.clone());
        let (stop, stop_rx) = watch::channel(false);

        inner.generation += 1;
        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            // A panic inside the loop is reported as a crash instead of
            // leaving the manager stuck in the running state
            let exit = match tokio::spawn(polling.run(stop_rx)).await {
                Ok(LoopExit::TargetReached(date)) => RunExit::TargetReached {
                    date: date.to_string(),
                },
                Ok(LoopExit::Stopped) => RunExit::Stopped,
                Err(e) => {
                    tracing::error!("Polling loop crashed: {}", e);
                    RunExit::Crashed {
                        reason: e.to_string(),
                    }
                }
            };

            let mut inner = shared.lock();
            if let Some(run) = inner.run.as_mut().filter(|run| run.generation == generation) {
                run.active = false;
            }
            inner.last_exit = Some(exit);
        });

        inner.run = Some(Run {
            generation,
            initial: state,
            snapshot,
            stop,
            handle: Some(handle),
            active: true,
        });

        tracing::info!("Bot started in {} mode", mode_label(mode));
        Ok(mode)
    }

    /// Ask the running loop to stop. It exits at its next sleep or cycle
    /// boundary; an in-flight booking submission completes first.
    pub fn stop(&self) -> Result<(), ManagerError> {
        let inner = self.inner.lock();
        match inner.run.as_ref().filter(|run| run.active) {
            Some(run) => {
                run.stop.send_replace(true);
                tracing::info!("Stop requested");
                Ok(())
            }
            None => Err(ManagerError::NotRunning),
        }
    }

    /// Stop the loop (if any) and wait for its task to finish.
    pub async fn shutdown(&self) {
        let handle = {
            let mut inner = self.inner.lock();
            match inner.run.as_mut() {
                Some(run) => {
                    run.stop.send_replace(true);
                    run.handle.take()
                }
                None => None,
            }
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Bot task ended abnormally: {}", e);
            }
        }
    }

    /// Status of the current run, or of the last one once it has ended.
    pub fn status(&self) -> BotStatusResponse {
        let inner = self.inner.lock();
        let Some(run) = inner.run.as_ref() else {
            return BotStatusResponse {
                running: false,
                mode: None,
                current_date: None,
                target_date: None,
                min_date: None,
                held_date: None,
                cycles: 0,
                last_check: None,
                last_exit: inner.last_exit.clone(),
            };
        };

        let snapshot = run.snapshot.borrow().clone();
        BotStatusResponse {
            running: run.active,
            mode: Some(BotMode::from_dry_run(run.initial.dry_run)),
            current_date: Some(run.initial.held.to_string()),
            target_date: run.initial.bounds.target_date.map(|d| d.to_string()),
            min_date: run.initial.bounds.min_date.map(|d| d.to_string()),
            held_date: Some(snapshot.held.to_string()),
            cycles: snapshot.cycles,
            last_check: snapshot.last_check,
            last_exit: if run.active {
                None
            } else {
                inner.last_exit.clone()
            },
        }
    }

    /// Recent log entries, oldest first.
    pub fn logs(&self, since: Option<u64>, limit: Option<usize>) -> Vec<LogEntry> {
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
        match since {
            Some(after) => self.logs.since(after, limit),
            None => self.logs.recent(limit),
        }
    }
}

fn mode_label(mode: BotMode) -> &'static str {
    match mode {
        BotMode::DryRun => "test",
        BotMode::Live => "live booking",
    }
}
