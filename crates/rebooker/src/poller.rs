//! The polling loop.
//!
//! One task per running bot. The loop owns its `PollState` and the current
//! session; observers only ever see `LoopSnapshot` copies.
//!
//! Phases:
//! - `Init`: log in. Failure goes to `Recovering`.
//! - `Authenticated`: list dates, select, book or idle, sleep.
//! - `Recovering`: drop the session, sleep the retry delay, back to `Init`.
//!
//! A stop request is seen at the top of every iteration and during every
//! sleep, never while a request is in flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::availability::AvailabilityQuery;
use crate::booking::{BookingExecutor, BookingResult, RetryPolicy};
use crate::client::{Credentials, SchedulingApi, Session, Target};
use crate::config::BotConfig;
use crate::error::BotError;
use crate::policy::{self, DateBounds};
use crate::types::AppointmentDate;

/// What the loop is hunting for. Only the loop mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    /// The appointment currently held; only strictly earlier dates qualify
    pub held: AppointmentDate,
    pub bounds: DateBounds,
    pub dry_run: bool,
}

/// Fixed operating parameters of a run.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub credentials: Credentials,
    pub target: Target,
    pub refresh_delay: Duration,
    pub retry_delay: Duration,
    /// Failed cycles in a row before the session is presumed stale
    pub max_consecutive_failures: u32,
    pub retry: RetryPolicy,
}

impl LoopSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            credentials: config.credentials.clone(),
            target: config.target.clone(),
            refresh_delay: config.refresh_delay,
            retry_delay: config.retry_delay,
            max_consecutive_failures: config.max_consecutive_failures,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Authenticated,
    Recovering,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Booked a date on or before the target date
    TargetReached(AppointmentDate),
    Stopped,
}

/// Read-only view of a running loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSnapshot {
    pub phase: Phase,
    pub held: AppointmentDate,
    /// Completed check cycles
    pub cycles: u64,
    pub last_check: Option<DateTime<Utc>>,
}

/// Result of one successful check cycle.
enum Cycle {
    Idle,
    Booked(AppointmentDate),
    TargetReached(AppointmentDate),
    NotBooked,
}

pub struct PollingLoop<A: SchedulingApi> {
    api: Arc<A>,
    settings: LoopSettings,
    state: PollState,
    snapshot: watch::Sender<LoopSnapshot>,
    cycles: u64,
    last_check: Option<DateTime<Utc>>,
}

impl<A: SchedulingApi> PollingLoop<A> {
    pub fn new(
        api: Arc<A>,
        settings: LoopSettings,
        state: PollState,
    ) -> (Self, watch::Receiver<LoopSnapshot>) {
        let (snapshot, observer) = watch::channel(LoopSnapshot {
            phase: Phase::Init,
            held: state.held,
            cycles: 0,
            last_check: None,
        });

        let polling = Self {
            api,
            settings,
            state,
            snapshot,
            cycles: 0,
            last_check: None,
        };
        (polling, observer)
    }

    /// Run until the target date is booked or `stop` flips to `true`.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> LoopExit {
        info!("Initializing with current date {}", self.state.held);
        if self.state.dry_run {
            info!("[DRY RUN MODE] Bot will only log what would be booked without actually booking");
        }
        if let Some(target) = self.state.bounds.target_date {
            info!("Target date: {}", target);
        }
        if let Some(min) = self.state.bounds.min_date {
            info!("Minimum date: {}", min);
        }

        let mut phase = Phase::Init;
        let mut session: Option<Session> = None;
        let mut consecutive_failures: u32 = 0;

        loop {
            if *stop.borrow() {
                info!("Stop requested, shutting down polling loop");
                return LoopExit::Stopped;
            }
            self.publish(phase);

            match phase {
                Phase::Init => match self.api.login(&self.settings.credentials).await {
                    Ok(fresh) => {
                        info!("Logged in");
                        session = Some(fresh);
                        consecutive_failures = 0;
                        phase = Phase::Authenticated;
                    }
                    Err(e) => {
                        error!(endpoint = e.endpoint(), "Login failed: {}", e);
                        phase = Phase::Recovering;
                    }
                },

                Phase::Recovering => {
                    session = None;
                    warn!(
                        "Re-authenticating in {} seconds...",
                        self.settings.retry_delay.as_secs()
                    );
                    if !pause(self.settings.retry_delay, &mut stop).await {
                        return LoopExit::Stopped;
                    }
                    phase = Phase::Init;
                }

                Phase::Authenticated => {
                    let Some(active) = session.as_ref() else {
                        phase = Phase::Init;
                        continue;
                    };

                    let outcome = self.check_cycle(active).await;
                    self.cycles += 1;
                    self.last_check = Some(Utc::now());
                    self.publish(phase);

                    match outcome {
                        Ok(Cycle::TargetReached(date)) => return LoopExit::TargetReached(date),
                        Ok(cycle) => {
                            consecutive_failures = 0;
                            match cycle {
                                Cycle::Booked(date) => info!(
                                    "Booked {}, but continuing to monitor for better dates...",
                                    date
                                ),
                                Cycle::Idle => info!(
                                    "No matching dates found. Checking again in {} seconds...",
                                    self.settings.refresh_delay.as_secs()
                                ),
                                Cycle::NotBooked | Cycle::TargetReached(_) => {}
                            }
                            if !pause(self.settings.refresh_delay, &mut stop).await {
                                return LoopExit::Stopped;
                            }
                        }
                        Err(e) if e.requires_reauth() => {
                            error!(endpoint = e.endpoint(), "Session lost: {}", e);
                            phase = Phase::Recovering;
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            if consecutive_failures >= self.settings.max_consecutive_failures.max(1)
                            {
                                warn!(
                                    failures = consecutive_failures,
                                    "Too many failed cycles in a row, presuming the session is stale: {}",
                                    e
                                );
                                phase = Phase::Recovering;
                                continue;
                            }
                            error!(
                                endpoint = e.endpoint(),
                                "Error in check loop: {}. Retrying in {} seconds...",
                                e,
                                self.settings.retry_delay.as_secs()
                            );
                            if !pause(self.settings.retry_delay, &mut stop).await {
                                return LoopExit::Stopped;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn check_cycle(&mut self, session: &Session) -> Result<Cycle, BotError> {
        let api = self.api.as_ref();
        let target = &self.settings.target;

        let dates = AvailabilityQuery::new(api, target).list_dates(session).await?;
        let Some(date) = policy::select_logged(&dates, self.state.held, &self.state.bounds) else {
            return Ok(Cycle::Idle);
        };

        let executor =
            BookingExecutor::new(api, target, self.state.dry_run, &self.settings.retry);
        match executor.execute(session, date).await? {
            BookingResult::Confirmed { slot, .. } => {
                self.state.held = slot.date;
                if self
                    .state
                    .bounds
                    .target_date
                    .is_some_and(|target_date| slot.date <= target_date)
                {
                    info!(
                        outcome = "success",
                        "Target date reached! Successfully booked appointment on {}", slot.date
                    );
                    return Ok(Cycle::TargetReached(slot.date));
                }
                Ok(Cycle::Booked(slot.date))
            }
            BookingResult::Rejected { slot, reason } => {
                warn!("Booking for {} was not accepted: {}", slot, reason);
                Ok(Cycle::NotBooked)
            }
            BookingResult::Unverified { slot, location } => {
                warn!(
                    "Booking for {} could not be verified (landed on {}); keeping {} as the held date",
                    slot, location, self.state.held
                );
                Ok(Cycle::NotBooked)
            }
            BookingResult::NoSlot { .. } => Ok(Cycle::NotBooked),
            BookingResult::Failed {
                slot,
                error,
                attempts,
            } => {
                error!("Giving up on {} after {} attempt(s)", slot, attempts);
                Err(error)
            }
        }
    }

    fn publish(&self, phase: Phase) {
        self.snapshot.send_replace(LoopSnapshot {
            phase,
            held: self.state.held,
            cycles: self.cycles,
            last_check: self.last_check,
        });
    }
}

/// Sleep for `duration` unless a stop is requested first.
///
/// Returns `false` when the loop should stop.
async fn pause(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = stop_requested(stop) => false,
    }
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|requested| *requested).await.is_err() {
        // No sender left, so no stop can ever arrive
        std::future::pending::<()>().await;
    }
}
