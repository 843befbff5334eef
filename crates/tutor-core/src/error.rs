//! Validation errors for schedule inputs.

use chrono::{NaiveDate, Weekday};
use thiserror::Error;

use crate::types::ValidationError;

/// Boxed error from a store or source implementation.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structural errors in a schedule request.
///
/// These are raised before any mutation takes place, so a caller receiving one
/// can be sure nothing was persisted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// A wall-clock time was not `HH:MM` (or legacy `HH:MM:SS`).
    #[error("invalid time {value:?}: expected HH:MM (24h)")]
    InvalidTime { value: String },

    /// A slot or pattern violated its invariants.
    #[error("invalid pattern: {reason}")]
    InvalidPattern { reason: String },

    /// The timezone name is not in the IANA database.
    #[error("unknown timezone: {name}")]
    UnknownTimezone { name: String },

    /// The effective date range is empty.
    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// A stored legacy pattern has days whose times were never recorded.
    #[error("pattern needs migration: no recorded times for {}", format_days(.days))]
    NeedsMigration { days: Vec<Weekday> },

    /// A field failed basic validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ScheduleError {
    pub(crate) fn pattern(reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            reason: reason.into(),
        }
    }
}

fn format_days(days: &[Weekday]) -> String {
    days.iter()
        .map(|day| crate::recurrence::weekday_label(*day))
        .collect::<Vec<_>>()
        .join(", ")
}
