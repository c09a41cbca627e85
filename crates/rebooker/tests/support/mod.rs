#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use rebooker::booking::RetryPolicy;
use rebooker::client::{
    BookingOutcome, Credentials, SchedulingApi, Session, SessionCookie, Target,
};
use rebooker::error::{BotError, TransportKind};
use rebooker::poller::LoopSettings;
use rebooker::types::{AppointmentDate, TimeSlot};

pub const CONFIRMED_URL: &str = "https://site.test/en-ca/niv/schedule/1/continue_actions";
pub const FORM_URL: &str = "https://site.test/en-ca/niv/schedule/1/appointment";

pub fn date(s: &str) -> AppointmentDate {
    s.parse().expect("valid test date")
}

pub fn target() -> Target {
    Target {
        schedule_id: "1".to_string(),
        facility_id: "94".to_string(),
    }
}

pub fn settings() -> LoopSettings {
    LoopSettings {
        credentials: Credentials::new("me@example.com", "secret"),
        target: target(),
        refresh_delay: Duration::from_secs(3),
        retry_delay: Duration::from_secs(5),
        max_consecutive_failures: 3,
        retry: RetryPolicy::default(),
    }
}

pub fn reset(endpoint: &'static str) -> BotError {
    BotError::transport(endpoint, TransportKind::ConnectionReset, "connection reset by peer")
}

pub fn timeout(endpoint: &'static str) -> BotError {
    BotError::transport(endpoint, TransportKind::Timeout, "operation timed out")
}

/// A `SchedulingApi` that replays queued responses.
///
/// When a queue runs dry the call falls back to a benign default: login
/// succeeds, no dates are listed, 09:00 is open and bookings are confirmed.
#[derive(Default)]
pub struct ScriptedApi {
    logins: Mutex<VecDeque<Result<(), BotError>>>,
    dates: Mutex<VecDeque<Result<Vec<AppointmentDate>, BotError>>>,
    times: Mutex<VecDeque<Result<Option<TimeSlot>, BotError>>>,
    submits: Mutex<VecDeque<Result<BookingOutcome, BotError>>>,
    calls: Mutex<Calls>,
}

#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub logins: usize,
    pub dates: usize,
    pub times: usize,
    pub submits: usize,
    /// Dates passed to `submit_booking`, in order
    pub submitted: Vec<AppointmentDate>,
    /// Session cookie seen by each date listing
    pub date_sessions: Vec<String>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(self, result: Result<(), BotError>) -> Self {
        self.logins.lock().push_back(result);
        self
    }

    pub fn dates(self, result: Result<Vec<AppointmentDate>, BotError>) -> Self {
        self.dates.lock().push_back(result);
        self
    }

    pub fn times(self, result: Result<Option<TimeSlot>, BotError>) -> Self {
        self.times.lock().push_back(result);
        self
    }

    pub fn submit(self, result: Result<BookingOutcome, BotError>) -> Self {
        self.submits.lock().push_back(result);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SchedulingApi for ScriptedApi {
    async fn login(&self, _credentials: &Credentials) -> Result<Session, BotError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.logins += 1;
            calls.logins
        };
        self.logins.lock().pop_front().unwrap_or(Ok(()))?;
        Ok(Session::new(
            SessionCookie::new(format!("session-{}", n)),
            "token",
            "https://site.test/en-ca/niv",
        ))
    }

    async fn fetch_available_dates(
        &self,
        session: &Session,
        _target: &Target,
    ) -> Result<Vec<AppointmentDate>, BotError> {
        {
            let mut calls = self.calls.lock();
            calls.dates += 1;
            calls.date_sessions.push(session.cookie().value().to_string());
        }
        self.dates.lock().pop_front().unwrap_or(Ok(Vec::new()))
    }

    async fn fetch_available_time(
        &self,
        _session: &Session,
        _target: &Target,
        _date: AppointmentDate,
    ) -> Result<Option<TimeSlot>, BotError> {
        self.calls.lock().times += 1;
        self.times
            .lock()
            .pop_front()
            .unwrap_or(Ok(Some(TimeSlot::new("09:00"))))
    }

    async fn submit_booking(
        &self,
        _session: &Session,
        _target: &Target,
        date: AppointmentDate,
        _time: &TimeSlot,
    ) -> Result<BookingOutcome, BotError> {
        {
            let mut calls = self.calls.lock();
            calls.submits += 1;
            calls.submitted.push(date);
        }
        self.submits
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(BookingOutcome::from_location(CONFIRMED_URL)))
    }
}
