//! Booking executor.
//!
//! One attempt runs SlotLookup -> Submit -> terminal result, with a bounded
//! number of re-submissions when the connection drops or times out. A
//! submission that may have reached the site is never reported as success
//! unless the site said so.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::client::{BookingVerdict, SchedulingApi, Session, Target};
use crate::error::BotError;
use crate::types::{AppointmentDate, Slot};

/// Retry bounds for booking submissions.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total submissions, including the first
    pub max_attempts: u32,
    /// Fixed pause between submissions
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Terminal result of one booking attempt.
#[derive(Debug, Clone)]
pub enum BookingResult {
    /// Booked, or in dry-run mode would have been booked
    Confirmed { slot: Slot, dry_run: bool },
    /// The site kept us on the booking form
    Rejected { slot: Slot, reason: String },
    /// The site answered with a page that is neither success nor the form.
    /// The booking may or may not exist.
    Unverified { slot: Slot, location: String },
    /// The date had no open time left
    NoSlot { date: AppointmentDate },
    Failed {
        slot: Slot,
        error: BotError,
        attempts: u32,
    },
}

impl BookingResult {
    /// The booked slot, if the held date may advance.
    pub fn confirmed_slot(&self) -> Option<&Slot> {
        match self {
            BookingResult::Confirmed { slot, .. } => Some(slot),
            _ => None,
        }
    }
}

pub struct BookingExecutor<'a, A: SchedulingApi> {
    api: &'a A,
    target: &'a Target,
    dry_run: bool,
    retry: &'a RetryPolicy,
}

impl<'a, A: SchedulingApi> BookingExecutor<'a, A> {
    pub fn new(api: &'a A, target: &'a Target, dry_run: bool, retry: &'a RetryPolicy) -> Self {
        Self {
            api,
            target,
            dry_run,
            retry,
        }
    }

    /// Look up a time for `date` and book it.
    ///
    /// Errors from the time lookup are returned as `Err` so the caller treats
    /// them like any other read failure; everything after the lookup ends in
    /// a `BookingResult`.
    pub async fn execute(
        &self,
        session: &Session,
        date: AppointmentDate,
    ) -> Result<BookingResult, BotError> {
        let Some(time) = self
            .api
            .fetch_available_time(session, self.target, date)
            .await?
        else {
            info!("no available time slots for date {}", date);
            return Ok(BookingResult::NoSlot { date });
        };

        let slot = Slot { date, time };

        if self.dry_run {
            info!(
                outcome = "success",
                "[DRY RUN] Would book appointment at {} (not actually booking)", slot
            );
            return Ok(BookingResult::Confirmed {
                slot,
                dry_run: true,
            });
        }

        Ok(self.submit(session, slot).await)
    }

    async fn submit(&self, session: &Session, slot: Slot) -> BookingResult {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self
                .api
                .submit_booking(session, self.target, slot.date, &slot.time)
                .await
            {
                Ok(outcome) => {
                    return match outcome.verdict {
                        BookingVerdict::Confirmed => {
                            info!(outcome = "success", "booked time at {}", slot);
                            BookingResult::Confirmed {
                                slot,
                                dry_run: false,
                            }
                        }
                        BookingVerdict::Rejected => BookingResult::Rejected {
                            slot,
                            reason: format!("site stayed on {}", outcome.location),
                        },
                        BookingVerdict::Indeterminate => BookingResult::Unverified {
                            slot,
                            location: outcome.location,
                        },
                    };
                }
                Err(e) if e.is_retryable_submit() && attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        "booking submission for {} failed: {}. Retrying in {:?}",
                        slot,
                        e,
                        self.retry.backoff
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(e) => {
                    error!(
                        attempt,
                        max_attempts, "booking submission for {} failed: {}", slot, e
                    );
                    return BookingResult::Failed {
                        slot,
                        error: e,
                        attempts: attempt,
                    };
                }
            }
        }
    }
}
