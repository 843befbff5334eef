//! Classes, their schedules, and concrete session instances.

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::recurrence::{RecurrencePattern, TimeSlot};
use crate::types::{ClassId, ClassStatus, SessionId, SessionStatus};

/// The scheduling-relevant part of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSchedule {
    pub timezone: Tz,
    /// First day of the effective range (inclusive).
    pub start_date: NaiveDate,
    /// Last day of the effective range (inclusive).
    pub end_date: NaiveDate,
    pub recurrence: RecurrencePattern,
}

impl ClassSchedule {
    /// Checks the invariants that must hold before anything is materialized.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.end_date < self.start_date {
            return Err(ScheduleError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.recurrence.is_empty() {
            return Err(ScheduleError::InvalidPattern {
                reason: "pattern has no scheduled days".to_string(),
            });
        }
        Ok(())
    }
}

/// A recurring class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub description: Option<String>,
    pub status: ClassStatus,
    pub schedule: ClassSchedule,
}

/// Input for creating a class.
#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: String,
    pub description: Option<String>,
    pub schedule: ClassSchedule,
}

/// A requested change to a class. `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ClassEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ClassStatus>,
    pub timezone: Option<Tz>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Replaces the whole pattern.
    pub recurrence: Option<RecurrencePattern>,
    /// Per-day times laid over the (new or current) pattern.
    pub day_times: Vec<(Weekday, TimeSlot)>,
}

impl ClassEdit {
    /// The schedule that results from applying this edit to `current`.
    pub fn effective_schedule(&self, current: &ClassSchedule) -> ClassSchedule {
        let base = self.recurrence.as_ref().unwrap_or(&current.recurrence);
        ClassSchedule {
            timezone: self.timezone.unwrap_or(current.timezone),
            start_date: self.start_date.unwrap_or(current.start_date),
            end_date: self.end_date.unwrap_or(current.end_date),
            recurrence: base.overlay(&self.day_times),
        }
    }

    /// The class after this edit, with `schedule` already resolved.
    pub fn apply(&self, current: &Class, schedule: ClassSchedule) -> Class {
        Class {
            id: current.id.clone(),
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            description: self
                .description
                .clone()
                .or_else(|| current.description.clone()),
            status: self.status.unwrap_or(current.status),
            schedule,
        }
    }

    /// Whether any non-scheduling field is set.
    pub const fn touches_details(&self) -> bool {
        self.name.is_some() || self.description.is_some() || self.status.is_some()
    }
}

/// A session produced by the materializer, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedSession {
    /// Local calendar date the session belongs to.
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One dated occurrence of a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInstance {
    pub id: SessionId,
    pub class_id: ClassId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: SessionStatus,
}

impl SessionInstance {
    /// Past sessions are history and never regenerated.
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.end < now
    }
}
