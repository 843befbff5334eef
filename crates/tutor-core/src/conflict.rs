//! Conflict detection for candidate schedules.
//!
//! A candidate (pattern + timezone + date range) is checked for one
//! participant against two things:
//!
//! - **Schedule**: the participant's other future sessions. Each session's
//!   recurring slot is taken from its owning class and re-expressed in the
//!   candidate's timezone on the session's own date, so classes in different
//!   zones are compared in one frame and DST is applied per date.
//! - **Availability** (teachers only): the teacher's weekly windows, stored as
//!   UTC times of day. A candidate slot must fit inside one window.
//!
//! Overlap uses half-open intervals: back-to-back slots do not conflict.
//!
//! Infrastructure failures follow a [`FailurePolicy`]: fail-open (the default)
//! reports no conflict and logs a warning; fail-closed returns the error.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::class::{Class, ClassSchedule, SessionInstance};
use crate::error::{ScheduleError, StoreError};
use crate::recurrence::{
    RecurrencePattern, TimeSlot, WEEKDAYS, spans_overlap, weekday_label, weekday_name,
};
use crate::time_codec::{
    convert_local_between_zones, format_time, instant_to_local_datetime, minutes_of_day,
};
use crate::types::{ClassId, ClassStatus, FailurePolicy, ParticipantId, Role, SessionStatus};

const MINUTES_PER_DAY: i64 = 24 * 60;

/// A teacher's weekly availability, as UTC times of day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityWindow {
    slots: [Vec<TimeSlot>; 7],
}

impl AvailabilityWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, day: Weekday, slot: TimeSlot) {
        self.slots[day.num_days_from_monday() as usize].push(slot);
    }

    pub fn get(&self, day: Weekday) -> &[TimeSlot] {
        &self.slots[day.num_days_from_monday() as usize]
    }

    /// All slots, Monday first.
    pub fn iter(&self) -> impl Iterator<Item = (Weekday, &TimeSlot)> {
        WEEKDAYS
            .into_iter()
            .zip(self.slots.iter())
            .flat_map(|(day, slots)| slots.iter().map(move |slot| (day, slot)))
    }
}

/// A participant's sessions plus the classes they belong to.
#[derive(Debug, Clone, Default)]
pub struct ParticipantSessions {
    pub classes: HashMap<ClassId, Class>,
    pub sessions: Vec<SessionInstance>,
}

/// Read access to the data a conflict check needs.
pub trait ScheduleSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Every session, in any class, the participant is assigned to.
    fn participant_sessions(
        &self,
        participant_id: &ParticipantId,
        role: Role,
    ) -> Result<ParticipantSessions, Self::Error>;

    /// `None` when the teacher never configured availability.
    fn availability(
        &self,
        teacher_id: &ParticipantId,
    ) -> Result<Option<AvailabilityWindow>, Self::Error>;
}

/// A proposed schedule to check.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub pattern: RecurrencePattern,
    pub timezone: Tz,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// The class being edited, whose own sessions are not conflicts.
    pub exclude_class: Option<ClassId>,
}

impl Candidate {
    /// The candidate an existing or planned class schedule represents.
    pub fn from_schedule(schedule: &ClassSchedule, exclude_class: Option<ClassId>) -> Self {
        Self {
            pattern: schedule.recurrence.clone(),
            timezone: schedule.timezone,
            start_date: schedule.start_date,
            end_date: schedule.end_date,
            exclude_class,
        }
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.end_date < self.start_date {
            return Err(ScheduleError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        Ok(())
    }

    fn in_range(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// First date in range falling on `day`.
    fn first_date_on(&self, day: Weekday) -> Option<NaiveDate> {
        let offset = (7 + day.num_days_from_monday()
            - self.start_date.weekday().num_days_from_monday())
            % 7;
        self.start_date
            .checked_add_days(Days::new(u64::from(offset)))
            .filter(|date| *date <= self.end_date)
    }
}

/// The source of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Overlaps another session.
    Schedule,
    /// Falls outside the teacher's availability.
    Availability,
}

impl ConflictKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Availability => "availability",
        }
    }
}

/// One detected conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    #[serde(serialize_with = "serialize_weekday")]
    pub day: Weekday,
    pub message: String,
    /// Existing session or availability time(s), in the candidate's timezone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<ClassId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// First date on which the conflict occurs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

#[expect(
    clippy::trivially_copy_pass_by_ref,
    reason = "serialize_with passes by reference"
)]
fn serialize_weekday<S: Serializer>(day: &Weekday, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(weekday_name(*day))
}

/// Conflict check result for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub participant_id: ParticipantId,
    pub role: Role,
    pub has_conflict: bool,
    pub conflicts: Vec<Conflict>,
    /// The check could not fetch its data and failed open.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl ConflictReport {
    fn new(participant_id: ParticipantId, role: Role, conflicts: Vec<Conflict>) -> Self {
        Self {
            participant_id,
            role,
            has_conflict: !conflicts.is_empty(),
            conflicts,
            degraded: false,
        }
    }

    fn degraded(participant_id: ParticipantId, role: Role) -> Self {
        Self {
            degraded: true,
            ..Self::new(participant_id, role, Vec::new())
        }
    }
}

/// Conflict check errors.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The candidate itself is malformed. Never downgraded by the failure policy.
    #[error(transparent)]
    Invalid(#[from] ScheduleError),

    /// Data could not be fetched and the policy is fail-closed.
    #[error("conflict check unavailable for {participant_id}")]
    Unavailable {
        participant_id: ParticipantId,
        #[source]
        source: StoreError,
    },
}

/// Settings shared by every participant in one check.
#[derive(Debug, Clone, Copy)]
pub struct CheckOptions {
    /// Sessions ending before this instant are history and never conflict.
    pub now: chrono::DateTime<Utc>,
    pub policy: FailurePolicy,
}

/// A time span in minutes from midnight of some reference date.
#[derive(Debug, Clone, Copy)]
struct MinuteSpan {
    start: i64,
    end: i64,
}

impl MinuteSpan {
    fn between(origin: NaiveDate, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let midnight = origin.and_time(NaiveTime::MIN);
        Self {
            start: (start - midnight).num_minutes(),
            end: (end - midnight).num_minutes(),
        }
    }

    fn of_slot(slot: &TimeSlot) -> Self {
        Self {
            start: i64::from(slot.start_minutes()),
            end: i64::from(slot.end_minutes()),
        }
    }

    const fn shifted(self, minutes: i64) -> Self {
        Self {
            start: self.start + minutes,
            end: self.end + minutes,
        }
    }

    fn overlaps(self, other: Self) -> bool {
        spans_overlap((self.start, self.end), (other.start, other.end))
    }

    const fn contains(self, other: Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

fn format_span(start: NaiveDateTime, end: NaiveDateTime) -> String {
    format!("{}-{}", format_time(start.time()), format_time(end.time()))
}

/// Start and end of a session's recurring slot, in its owning class's zone.
fn recurring_local_span(
    session: &SessionInstance,
    class: &Class,
) -> (NaiveDate, NaiveTime, NaiveDate, NaiveTime) {
    let tz = class.schedule.timezone;
    let local_start = instant_to_local_datetime(session.start, tz);
    let date = local_start.date();
    match class.schedule.recurrence.get(date.weekday()) {
        Some(slot) => {
            let end_date = if slot.ends_at_midnight() {
                date.succ_opt().unwrap_or(date)
            } else {
                date
            };
            (date, slot.start(), end_date, slot.end())
        }
        // The pattern no longer covers this weekday; fall back to the stored instants.
        None => {
            let local_end = instant_to_local_datetime(session.end, tz);
            (date, local_start.time(), local_end.date(), local_end.time())
        }
    }
}

/// Overlaps between the candidate and a participant's existing sessions.
///
/// One conflict is reported per (class, weekday, time range); its `date` is
/// the first date the overlap happens.
pub fn check_schedule(
    existing: &ParticipantSessions,
    candidate: &Candidate,
    now: chrono::DateTime<Utc>,
) -> Vec<Conflict> {
    let mut sessions: Vec<&SessionInstance> = existing
        .sessions
        .iter()
        .filter(|s| s.status != SessionStatus::Cancelled && !s.is_past(now))
        .collect();
    sessions.sort_by_key(|s| s.start);

    let mut conflicts = Vec::new();
    let mut seen: HashSet<(ClassId, Weekday, String, String)> = HashSet::new();

    for session in sessions {
        if candidate.exclude_class.as_ref() == Some(&session.class_id) {
            continue;
        }
        let Some(class) = existing.classes.get(&session.class_id) else {
            tracing::warn!(
                session_id = %session.id,
                class_id = %session.class_id,
                "session without class metadata"
            );
            continue;
        };
        if class.status != ClassStatus::Active {
            continue;
        }

        let owning_tz = class.schedule.timezone;
        let (start_date, start_time, end_date, end_time) = recurring_local_span(session, class);
        let start =
            convert_local_between_zones(start_date, start_time, owning_tz, candidate.timezone);
        let end = convert_local_between_zones(end_date, end_time, owning_tz, candidate.timezone);
        let existing_time = format_span(start, end);

        // The session can spill past midnight in the candidate's zone, so test
        // both the day it starts on and the next one.
        let base = start.date();
        let span = MinuteSpan::between(base, start, end);
        for (shift, day_offset) in [(0, 0_u64), (-MINUTES_PER_DAY, 1)] {
            let Some(date) = base.checked_add_days(Days::new(day_offset)) else {
                continue;
            };
            if !candidate.in_range(date) {
                continue;
            }
            let span = span.shifted(shift);
            if span.end <= 0 {
                continue;
            }
            let weekday = date.weekday();
            let Some(slot) = candidate.pattern.get(weekday) else {
                continue;
            };
            if !span.overlaps(MinuteSpan::of_slot(slot)) {
                continue;
            }
            let new_time = slot.to_string();
            let key = (class.id.clone(), weekday, existing_time.clone(), new_time.clone());
            if !seen.insert(key) {
                continue;
            }
            conflicts.push(Conflict {
                kind: ConflictKind::Schedule,
                day: weekday,
                message: format!(
                    "overlaps {} on {} ({existing_time} vs {new_time})",
                    class.name,
                    weekday_label(weekday)
                ),
                existing_time: Some(existing_time.clone()),
                new_time: Some(new_time),
                class_id: Some(class.id.clone()),
                class_name: Some(class.name.clone()),
                date: Some(date),
            });
        }
    }

    conflicts
}

/// Candidate slots that fall outside the teacher's availability.
///
/// `None` means availability was never configured, which skips the check.
pub fn check_availability(
    window: Option<&AvailabilityWindow>,
    candidate: &Candidate,
) -> Vec<Conflict> {
    let Some(window) = window else {
        return Vec::new();
    };

    let mut conflicts = Vec::new();
    for (day, slot) in candidate.pattern.iter() {
        let Some(anchor) = candidate.first_date_on(day) else {
            continue;
        };
        let new_time = slot.to_string();
        let available = window.get(day);
        if available.is_empty() {
            conflicts.push(Conflict {
                kind: ConflictKind::Availability,
                day,
                message: "no availability set for this day".to_string(),
                existing_time: None,
                new_time: Some(new_time),
                class_id: None,
                class_name: None,
                date: Some(anchor),
            });
            continue;
        }

        let converted: Vec<(MinuteSpan, String)> = available
            .iter()
            .map(|window_slot| utc_slot_in_zone(window_slot, anchor, candidate.timezone))
            .collect();
        let wanted = MinuteSpan::of_slot(slot);
        let fits = converted.iter().any(|(span, _)| {
            span.contains(wanted) || span.shifted(-MINUTES_PER_DAY).contains(wanted)
        });
        if !fits {
            let existing = converted
                .iter()
                .map(|(_, text)| text.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            conflicts.push(Conflict {
                kind: ConflictKind::Availability,
                day,
                message: format!(
                    "{new_time} is outside availability on {} ({existing})",
                    weekday_label(day)
                ),
                existing_time: Some(existing),
                new_time: Some(new_time),
                class_id: None,
                class_name: None,
                date: Some(anchor),
            });
        }
    }
    conflicts
}

/// Converts a UTC availability slot to `tz` as a time-of-day span.
///
/// Only the time of day survives: the weekday key is the one the teacher
/// declared. A span that wraps past midnight after conversion is extended
/// into the next day; callers also test it shifted back one day so the
/// after-midnight part covers early slots on the same key.
fn utc_slot_in_zone(slot: &TimeSlot, anchor: NaiveDate, tz: Tz) -> (MinuteSpan, String) {
    let start = convert_local_between_zones(anchor, slot.start(), chrono_tz::UTC, tz).time();
    let end = convert_local_between_zones(anchor, slot.end(), chrono_tz::UTC, tz).time();
    let start_minutes = i64::from(minutes_of_day(start));
    let mut end_minutes = i64::from(minutes_of_day(end));
    if end_minutes <= start_minutes {
        end_minutes += MINUTES_PER_DAY;
    }
    (
        MinuteSpan {
            start: start_minutes,
            end: end_minutes,
        },
        format!("{}-{}", format_time(start), format_time(end)),
    )
}

/// Runs every check that applies to `role`.
///
/// Teachers get schedule and availability checks; students only schedule.
pub fn check_all<S: ScheduleSource>(
    source: &S,
    participant_id: &ParticipantId,
    role: Role,
    candidate: &Candidate,
    options: CheckOptions,
) -> Result<ConflictReport, ConflictError> {
    candidate.validate()?;

    let fetched = source
        .participant_sessions(participant_id, role)
        .and_then(|sessions| match role {
            Role::Teacher => source
                .availability(participant_id)
                .map(|window| (sessions, window)),
            Role::Student => Ok((sessions, None)),
        });

    let (sessions, window) = match fetched {
        Ok(data) => data,
        Err(err) => {
            return match options.policy {
                FailurePolicy::Open => {
                    tracing::warn!(
                        %participant_id,
                        error = %err,
                        "conflict check unavailable; reporting no conflict"
                    );
                    Ok(ConflictReport::degraded(participant_id.clone(), role))
                }
                FailurePolicy::Closed => Err(ConflictError::Unavailable {
                    participant_id: participant_id.clone(),
                    source: Box::new(err),
                }),
            };
        }
    };

    let mut conflicts = check_schedule(&sessions, candidate, options.now);
    if role == Role::Teacher {
        conflicts.extend(check_availability(window.as_ref(), candidate));
    }
    tracing::debug!(
        %participant_id,
        role = role.as_str(),
        conflicts = conflicts.len(),
        "checked conflicts"
    );
    Ok(ConflictReport::new(participant_id.clone(), role, conflicts))
}

/// Checks many participants in parallel. Results keep the input order.
pub fn check_participants<S>(
    source: &S,
    participants: &[(ParticipantId, Role)],
    candidate: &Candidate,
    options: CheckOptions,
) -> Vec<Result<ConflictReport, ConflictError>>
where
    S: ScheduleSource + Sync,
{
    participants
        .par_iter()
        .map(|(participant_id, role)| check_all(source, participant_id, *role, candidate, options))
        .collect()
}
