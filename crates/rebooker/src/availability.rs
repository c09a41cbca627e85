//! Availability queries: thin pass-throughs over the session client that keep
//! the selection policy free of transport concerns.

use crate::client::{SchedulingApi, Session, Target};
use crate::error::BotError;
use crate::types::{AppointmentDate, TimeSlot};

pub struct AvailabilityQuery<'a, A: SchedulingApi> {
    api: &'a A,
    target: &'a Target,
}

impl<'a, A: SchedulingApi> AvailabilityQuery<'a, A> {
    pub fn new(api: &'a A, target: &'a Target) -> Self {
        Self { api, target }
    }

    /// All open days for the configured facility.
    pub async fn list_dates(&self, session: &Session) -> Result<Vec<AppointmentDate>, BotError> {
        let dates = self.api.fetch_available_dates(session, self.target).await?;

        if dates.is_empty() {
            tracing::info!("no dates available");
        } else {
            let listed: Vec<String> = dates.iter().map(ToString::to_string).collect();
            tracing::info!(
                "found {} available dates: {}",
                dates.len(),
                listed.join(", ")
            );
        }

        Ok(dates)
    }

    /// The preferred open time on `date`.
    pub async fn list_time(
        &self,
        session: &Session,
        date: AppointmentDate,
    ) -> Result<Option<TimeSlot>, BotError> {
        self.api.fetch_available_time(session, self.target, date).await
    }
}
