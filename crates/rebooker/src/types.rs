//! Value types shared by the client, the selection policy and the loop.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A calendar date in `YYYY-MM-DD` form.
///
/// Ordering follows the calendar, which is also the lexicographic order of
/// the ISO string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppointmentDate(NaiveDate);

impl AppointmentDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid date {input:?}: expected YYYY-MM-DD")]
pub struct ParseDateError {
    pub input: String,
}

impl FromStr for AppointmentDate {
    type Err = ParseDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // NaiveDate accepts unpadded fields; the site never sends those
        if trimmed.len() != 10 {
            return Err(ParseDateError {
                input: s.to_string(),
            });
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(AppointmentDate)
            .map_err(|_| ParseDateError {
                input: s.to_string(),
            })
    }
}

impl fmt::Display for AppointmentDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Serialize for AppointmentDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AppointmentDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A time of day offered for a specific date, kept as the site formats it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSlot(String);

impl TimeSlot {
    pub fn new(time: impl Into<String>) -> Self {
        Self(time.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bookable date and time pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub date: AppointmentDate,
    pub time: TimeSlot,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

#[cfg(test)]
pub(crate) fn date(s: &str) -> AppointmentDate {
    s.parse().expect("valid test date")
}
