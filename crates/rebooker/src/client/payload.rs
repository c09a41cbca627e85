//! Parsing of the JSON payloads returned by the date and time listings,
//! and classification of the booking redirect.

use serde::Deserialize;
use serde_json::Value;

use crate::error::BotError;
use crate::types::{AppointmentDate, TimeSlot};

#[derive(Debug, Deserialize)]
struct DayEntry {
    date: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimesPayload {
    #[serde(default)]
    pub business_times: Option<Vec<String>>,
    #[serde(default)]
    pub available_times: Option<Vec<String>>,
}

impl TimesPayload {
    /// First business time if there is one, else the first available time.
    pub fn preferred(&self) -> Option<TimeSlot> {
        first_non_blank(self.business_times.as_deref())
            .or_else(|| first_non_blank(self.available_times.as_deref()))
            .map(TimeSlot::new)
    }
}

fn first_non_blank(times: Option<&[String]>) -> Option<&str> {
    times?
        .first()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
}

/// Reject payloads carrying an explicit `error` field.
fn check_remote_error(endpoint: &'static str, value: &Value) -> Result<(), BotError> {
    let Some(error) = value.as_object().and_then(|obj| obj.get("error")) else {
        return Ok(());
    };
    let message = match error {
        Value::Null | Value::Bool(false) => return Ok(()),
        Value::String(s) if s.is_empty() => return Ok(()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Err(BotError::remote(endpoint, message))
}

/// Parse the date listing: a JSON array of `{"date": "YYYY-MM-DD", ...}`.
pub fn parse_dates(endpoint: &'static str, body: &str) -> Result<Vec<AppointmentDate>, BotError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| BotError::protocol(endpoint, format!("response is not JSON: {}", e)))?;
    check_remote_error(endpoint, &value)?;

    if !value.is_array() {
        return Err(BotError::protocol(endpoint, "expected a JSON array of dates"));
    }

    let entries: Vec<DayEntry> = serde_json::from_value(value)
        .map_err(|e| BotError::protocol(endpoint, format!("malformed date entry: {}", e)))?;

    entries
        .into_iter()
        .map(|entry| {
            entry
                .date
                .parse::<AppointmentDate>()
                .map_err(|e| BotError::protocol(endpoint, e.to_string()))
        })
        .collect()
}

/// Parse the time listing for a single date.
pub fn parse_times(endpoint: &'static str, body: &str) -> Result<TimesPayload, BotError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| BotError::protocol(endpoint, format!("response is not JSON: {}", e)))?;
    check_remote_error(endpoint, &value)?;

    if !value.is_object() {
        return Err(BotError::protocol(endpoint, "expected a JSON object of times"));
    }

    serde_json::from_value(value)
        .map_err(|e| BotError::protocol(endpoint, format!("malformed times payload: {}", e)))
}

/// Path segment the site redirects to after a booking is accepted.
pub const CONFIRMED_PATH: &str = "continue_actions";
/// Path segment of the booking form itself.
pub const APPOINTMENT_PATH: &str = "appointment";

/// What the site told us about a booking submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingVerdict {
    Confirmed,
    Rejected,
    /// Neither success nor the booking form; never counted as success
    Indeterminate,
}

/// Verdict plus the final location the submission landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingOutcome {
    pub verdict: BookingVerdict,
    pub location: String,
}

impl BookingOutcome {
    pub fn from_location(location: impl Into<String>) -> Self {
        let location = location.into();
        Self {
            verdict: classify_location(&location),
            location,
        }
    }
}

/// Classify the final redirect destination of a booking submission.
///
/// Only the path is inspected so query strings cannot fake a verdict.
pub fn classify_location(location: &str) -> BookingVerdict {
    let path = reqwest::Url::parse(location)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| location.split(['?', '#']).next().unwrap_or("").to_string());

    if path.contains(CONFIRMED_PATH) {
        BookingVerdict::Confirmed
    } else if path.contains(APPOINTMENT_PATH) {
        BookingVerdict::Rejected
    } else {
        BookingVerdict::Indeterminate
    }
}
