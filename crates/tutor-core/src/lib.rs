//! Core scheduling logic for recurring tutoring classes.
//!
//! This crate contains the fundamental types and logic for:
//! - Time codec: wall-clock times, IANA zones and DST resolution
//! - Recurrence: weekly patterns and legacy pattern normalization
//! - Materialization: expanding a pattern into dated sessions
//! - Regeneration: replacing future sessions after an edit
//! - Conflict detection: schedule overlaps and teacher availability
//! - Attendance: seeding `expected` records from a roster
//!
//! Storage is abstracted behind [`ScheduleStore`] and [`ScheduleSource`].

pub mod attendance;
pub mod class;
pub mod conflict;
mod error;
mod materialize;
pub mod recurrence;
mod regenerate;
pub mod time_codec;
pub mod types;

pub use attendance::{AttendanceRecord, Roster, seed_records};
pub use class::{Class, ClassEdit, ClassSchedule, NewClass, PlannedSession, SessionInstance};
pub use conflict::{
    AvailabilityWindow, Candidate, CheckOptions, Conflict, ConflictError, ConflictKind,
    ConflictReport, ParticipantSessions, ScheduleSource, check_all, check_availability,
    check_participants, check_schedule,
};
pub use error::{ScheduleError, StoreError};
pub use materialize::{materialize, materialize_schedule};
pub use recurrence::{
    NormalizedPattern, RecurrencePattern, TimeSlot, normalize_pattern, normalize_pattern_text,
    parse_weekday, weekday_label, weekday_name,
};
pub use regenerate::{
    RegenerationError, RegenerationOutcome, ScheduleStore, StoredClass, create_class, regenerate,
};
pub use time_codec::{format_time, parse_time, parse_timezone};
pub use types::{
    AttendanceStatus, ClassId, ClassStatus, FailurePolicy, ParticipantId, Role, SessionId,
    SessionStatus, ValidationError,
};
