//! Session client for the scheduling site.
//!
//! `SchedulingApi` is the seam the rest of the crate talks to; `VisaClient`
//! is the HTTP implementation. Tests substitute scripted implementations.

mod http;
pub mod payload;
pub mod session;

use async_trait::async_trait;

use crate::error::BotError;
use crate::types::{AppointmentDate, TimeSlot};

pub use http::{base_uri, ClientOptions, VisaClient};
pub use payload::{BookingOutcome, BookingVerdict};
pub use session::{Credentials, Session, SessionCookie};

/// Identifies the applicant schedule and the consulate being polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub schedule_id: String,
    pub facility_id: String,
}

/// Operations against the scheduling site.
///
/// Every call performs network I/O. Only the two listings are safe to repeat;
/// `submit_booking` reports what it observed and never retries on its own.
#[async_trait]
pub trait SchedulingApi: Send + Sync + 'static {
    /// Sign in and produce a fresh session.
    async fn login(&self, credentials: &Credentials) -> Result<Session, BotError>;

    async fn fetch_available_dates(
        &self,
        session: &Session,
        target: &Target,
    ) -> Result<Vec<AppointmentDate>, BotError>;

    /// The preferred open time for `date`, if any.
    async fn fetch_available_time(
        &self,
        session: &Session,
        target: &Target,
        date: AppointmentDate,
    ) -> Result<Option<TimeSlot>, BotError>;

    async fn submit_booking(
        &self,
        session: &Session,
        target: &Target,
        date: AppointmentDate,
        time: &TimeSlot,
    ) -> Result<BookingOutcome, BotError>;
}
