//! Class creation and schedule regeneration.
//!
//! Regeneration replaces a class's future sessions after a schedule edit while
//! leaving history alone:
//!
//! 1. Load the class and resolve the effective schedule.
//! 2. Skip session work entirely when the schedule is unchanged.
//! 3. Split existing sessions into past (`end < now`) and future.
//! 4. Delete future sessions; the store cascades their attendance.
//! 5. Materialize from `now`.
//! 6. Persist the new sessions and the updated class.
//! 7. Seed `expected` attendance for the current roster.
//!
//! Steps 4-6 are all-or-nothing from the caller's point of view: a failure is
//! reported as [`RegenerationError::PartialFailure`] and the store is expected
//! to roll back. Step 7 is best-effort.

use chrono::{DateTime, Utc, Weekday};
use thiserror::Error;

use crate::attendance::{AttendanceRecord, Roster, seed_records};
use crate::class::{Class, ClassEdit, NewClass, PlannedSession, SessionInstance};
use crate::error::{ScheduleError, StoreError};
use crate::materialize::materialize_schedule;
use crate::types::{ClassId, SessionId};

/// A class as read back from storage.
#[derive(Debug, Clone)]
pub struct StoredClass {
    pub class: Class,
    /// Days whose stored times were legacy placeholders.
    pub defaulted_days: Vec<Weekday>,
}

/// Persistence operations needed for creation and regeneration.
///
/// Implementations should run a whole [`regenerate`] call inside one
/// transaction so that a fatal error leaves nothing half-applied.
pub trait ScheduleStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn load_class(&self, class_id: &ClassId) -> Result<Option<StoredClass>, Self::Error>;

    /// Inserts a new class and returns it with its assigned ID.
    fn insert_class(&mut self, class: &NewClass) -> Result<Class, Self::Error>;

    fn update_class(&mut self, class: &Class) -> Result<(), Self::Error>;

    fn class_sessions(&self, class_id: &ClassId) -> Result<Vec<SessionInstance>, Self::Error>;

    /// Deletes sessions ending at or after `cutoff`, with their attendance.
    fn delete_future_sessions(
        &mut self,
        class_id: &ClassId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, Self::Error>;

    /// Inserts sessions and returns their IDs in input order.
    fn persist_sessions(
        &mut self,
        class_id: &ClassId,
        sessions: &[PlannedSession],
    ) -> Result<Vec<SessionId>, Self::Error>;

    fn roster(&self, class_id: &ClassId) -> Result<Roster, Self::Error>;

    /// Inserts attendance rows, leaving existing `(session, participant)` rows alone.
    fn seed_attendance(&mut self, records: &[AttendanceRecord]) -> Result<usize, Self::Error>;
}

/// Regeneration and creation errors.
#[derive(Debug, Error)]
pub enum RegenerationError {
    #[error("class not found: {0}")]
    ClassNotFound(ClassId),

    /// The request was rejected before any mutation.
    #[error(transparent)]
    Invalid(#[from] ScheduleError),

    /// Reading the current state failed; nothing was changed.
    #[error("failed to load class {class_id}")]
    Load {
        class_id: ClassId,
        #[source]
        source: StoreError,
    },

    /// Inserting a new class failed; nothing was written.
    #[error("failed to create class {name:?}")]
    Create {
        name: String,
        #[source]
        source: StoreError,
    },

    /// A mutation step failed. Future sessions may be gone without
    /// replacements unless the store rolled back.
    #[error("regeneration of class {class_id} failed during {step}")]
    PartialFailure {
        class_id: ClassId,
        step: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Summary of a regeneration or creation.
#[derive(Debug, Clone)]
pub struct RegenerationOutcome {
    pub class: Class,
    /// False when the edit left the schedule unchanged.
    pub regenerated: bool,
    pub preserved_past: usize,
    pub deleted_future: usize,
    pub created: Vec<SessionId>,
    pub attendance_seeded: usize,
    /// Set when attendance seeding failed; the sessions themselves are fine.
    pub attendance_error: Option<String>,
}

/// Creates a class and materializes its whole range.
pub fn create_class<S: ScheduleStore>(
    store: &mut S,
    new_class: &NewClass,
) -> Result<RegenerationOutcome, RegenerationError> {
    new_class.schedule.validate()?;
    let planned = materialize_schedule(&new_class.schedule, None)?;

    let class = store
        .insert_class(new_class)
        .map_err(|err| RegenerationError::Create {
            name: new_class.name.clone(),
            source: Box::new(err),
        })?;
    let created = store
        .persist_sessions(&class.id, &planned)
        .map_err(|err| partial(class.id.clone(), "session insert", err))?;

    tracing::info!(class_id = %class.id, sessions = created.len(), "created class");

    let (attendance_seeded, attendance_error) = seed(store, &class.id, &created);
    Ok(RegenerationOutcome {
        class,
        regenerated: true,
        preserved_past: 0,
        deleted_future: 0,
        created,
        attendance_seeded,
        attendance_error,
    })
}

/// Applies `edit` to a class, regenerating future sessions when the schedule changed.
pub fn regenerate<S: ScheduleStore>(
    store: &mut S,
    class_id: &ClassId,
    edit: &ClassEdit,
    now: DateTime<Utc>,
) -> Result<RegenerationOutcome, RegenerationError> {
    let stored = store
        .load_class(class_id)
        .map_err(|err| load(class_id, err))?
        .ok_or_else(|| RegenerationError::ClassNotFound(class_id.clone()))?;
    let current = &stored.class;

    let schedule = edit.effective_schedule(&current.schedule);
    let updated = edit.apply(current, schedule);

    if updated.schedule == current.schedule {
        if edit.touches_details() {
            store
                .update_class(&updated)
                .map_err(|err| partial(class_id.clone(), "class update", err))?;
        }
        tracing::debug!(%class_id, "schedule unchanged; sessions left as is");
        return Ok(RegenerationOutcome {
            class: updated,
            regenerated: false,
            preserved_past: 0,
            deleted_future: 0,
            created: Vec::new(),
            attendance_seeded: 0,
            attendance_error: None,
        });
    }

    updated.schedule.validate()?;
    if edit.recurrence.is_none() && !stored.defaulted_days.is_empty() {
        let explicit: Vec<Weekday> = edit.day_times.iter().map(|(day, _)| *day).collect();
        let pending: Vec<Weekday> = stored
            .defaulted_days
            .iter()
            .copied()
            .filter(|day| {
                !explicit.contains(day) && updated.schedule.recurrence.get(*day).is_some()
            })
            .collect();
        if !pending.is_empty() {
            return Err(ScheduleError::NeedsMigration { days: pending }.into());
        }
    }
    let planned = materialize_schedule(&updated.schedule, Some(now))?;

    let existing = store
        .class_sessions(class_id)
        .map_err(|err| load(class_id, err))?;
    let preserved_past = existing.iter().filter(|s| s.is_past(now)).count();

    let deleted_future = store
        .delete_future_sessions(class_id, now)
        .map_err(|err| partial(class_id.clone(), "future session delete", err))?;
    let created = store
        .persist_sessions(class_id, &planned)
        .map_err(|err| partial(class_id.clone(), "session insert", err))?;
    store
        .update_class(&updated)
        .map_err(|err| partial(class_id.clone(), "class update", err))?;

    tracing::info!(
        %class_id,
        preserved_past,
        deleted_future,
        created = created.len(),
        "regenerated class sessions"
    );

    let (attendance_seeded, attendance_error) = seed(store, class_id, &created);
    Ok(RegenerationOutcome {
        class: updated,
        regenerated: true,
        preserved_past,
        deleted_future,
        created,
        attendance_seeded,
        attendance_error,
    })
}

fn seed<S: ScheduleStore>(
    store: &mut S,
    class_id: &ClassId,
    sessions: &[SessionId],
) -> (usize, Option<String>) {
    if sessions.is_empty() {
        return (0, None);
    }
    let result = store
        .roster(class_id)
        .and_then(|roster| store.seed_attendance(&seed_records(sessions, &roster)));
    match result {
        Ok(seeded) => (seeded, None),
        Err(err) => {
            tracing::warn!(%class_id, error = %err, "attendance seeding failed; sessions kept");
            (0, Some(err.to_string()))
        }
    }
}

fn load<E>(class_id: &ClassId, err: E) -> RegenerationError
where
    E: std::error::Error + Send + Sync + 'static,
{
    RegenerationError::Load {
        class_id: class_id.clone(),
        source: Box::new(err),
    }
}

fn partial<E>(class_id: ClassId, step: &'static str, err: E) -> RegenerationError
where
    E: std::error::Error + Send + Sync + 'static,
{
    RegenerationError::PartialFailure {
        class_id,
        step,
        source: Box::new(err),
    }
}
