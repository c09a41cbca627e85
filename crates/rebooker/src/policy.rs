//! Date selection policy.
//!
//! Pure and deterministic: no I/O, no clock. The polling loop feeds it the
//! dates fetched in the current cycle together with its `PollState`.

use crate::types::AppointmentDate;

/// Bounds applied on top of "strictly earlier than the held date".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateBounds {
    /// Candidates earlier than this are ignored
    pub min_date: Option<AppointmentDate>,
    /// Candidates later than this are ignored
    pub target_date: Option<AppointmentDate>,
}

/// Why a date was not eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotEarlierThanHeld,
    BeforeMinDate,
    AfterTargetDate,
}

/// Check a single date against the held date and bounds.
pub fn check(
    date: AppointmentDate,
    held: AppointmentDate,
    bounds: &DateBounds,
) -> Result<(), Rejection> {
    if date >= held {
        return Err(Rejection::NotEarlierThanHeld);
    }
    if bounds.min_date.is_some_and(|min| date < min) {
        return Err(Rejection::BeforeMinDate);
    }
    if bounds.target_date.is_some_and(|target| date > target) {
        return Err(Rejection::AfterTargetDate);
    }
    Ok(())
}

/// Pick the earliest eligible date, if any.
pub fn select(
    available: &[AppointmentDate],
    held: AppointmentDate,
    bounds: &DateBounds,
) -> Option<AppointmentDate> {
    available
        .iter()
        .copied()
        .filter(|date| check(*date, held, bounds).is_ok())
        .min()
}

/// Like [`select`], logging why each date was skipped.
pub fn select_logged(
    available: &[AppointmentDate],
    held: AppointmentDate,
    bounds: &DateBounds,
) -> Option<AppointmentDate> {
    for date in available {
        match check(*date, held, bounds) {
            Ok(()) => {}
            Err(Rejection::NotEarlierThanHeld) => {
                tracing::debug!("date {} is not earlier than current booking ({})", date, held)
            }
            Err(Rejection::BeforeMinDate) => {
                tracing::debug!("date {} is before minimum date", date)
            }
            Err(Rejection::AfterTargetDate) => {
                tracing::debug!("date {} is after target date", date)
            }
        }
    }

    let selected = select(available, held, bounds);
    match selected {
        Some(date) => tracing::info!("earliest eligible date: {}", date),
        None => tracing::info!("no good dates found after filtering"),
    }
    selected
}
