//! Storage layer for the tutoring scheduler.
//!
//! Persists classes, sessions, rosters, attendance and teacher availability
//! using `rusqlite`, and implements the
//! [`ScheduleStore`](tutor_core::ScheduleStore) and [`ScheduleSource`]
//! collaborators the core pipeline runs against.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved between threads but cannot be shared across them.
//! Parallel conflict checks go through [`SharedDatabase`], which serializes
//! access with a `Mutex`.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Session instants are stored as TEXT in RFC 3339 UTC with millisecond
//! precision (e.g., `2024-03-04T15:00:00.000Z`), so lexicographic order matches
//! chronological order. Class dates are `YYYY-MM-DD`.
//!
//! ## Recurrence Storage
//!
//! The `recurrence` column holds a JSON object keyed by lowercase weekday:
//! `{"monday": {"start": "09:00", "end": "10:00"}, "tuesday": null, ...}`.
//! Older rows may hold a comma-separated weekday list or an array of
//! `{day, start_time, end_time}` objects. Those are normalized on read and left
//! as stored until the pattern is next changed.

mod store;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tutor_core::{
    AttendanceRecord, AttendanceStatus, AvailabilityWindow, ClassEdit, ClassId, NewClass,
    ParticipantId, ParticipantSessions, RegenerationError, RegenerationOutcome, Role, Roster,
    ScheduleSource, SessionId, SessionInstance, SessionStatus, StoredClass, ValidationError,
};

pub use store::Store;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp or date.
    #[error("invalid timestamp for {record_id}: {timestamp}")]
    TimestampParse {
        record_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row could not be turned back into a domain value.
    #[error("invalid stored data for {record_id}: {message}")]
    InvalidRecord { record_id: String, message: String },
    /// A stored identifier or enum value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Failed to encode a recurrence pattern.
    #[error("failed to serialize recurrence: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("class not found: {0}")]
    ClassNotFound(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// Attendance was marked for someone with no place in the class.
    #[error("{participant_id} is not enrolled in class {class_id}")]
    NotEnrolled {
        class_id: String,
        participant_id: String,
    },
    /// Another thread panicked while holding the shared connection.
    #[error("database lock poisoned")]
    LockPoisoned,
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// One participant's place in a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub class_id: ClassId,
    pub participant_id: ParticipantId,
    pub role: Role,
    /// Attendance rows seeded for the class's upcoming sessions.
    pub attendance_seeded: usize,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS classes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                timezone TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                recurrence TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS class_participants (
                class_id TEXT NOT NULL,
                participant_id TEXT NOT NULL,
                role TEXT NOT NULL,
                enrolled_at TEXT NOT NULL,
                PRIMARY KEY (class_id, participant_id),
                FOREIGN KEY (class_id) REFERENCES classes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_class_participants_participant
                ON class_participants(participant_id);

            -- start_at/end_at: RFC 3339 UTC with milliseconds
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                class_id TEXT NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'scheduled',
                created_at TEXT NOT NULL,
                FOREIGN KEY (class_id) REFERENCES classes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_class ON sessions(class_id, start_at);

            CREATE TABLE IF NOT EXISTS attendance (
                session_id TEXT NOT NULL,
                participant_id TEXT NOT NULL,
                role TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'expected',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (session_id, participant_id),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            -- A profile row means the teacher configured availability, even with no slots.
            CREATE TABLE IF NOT EXISTS availability_profiles (
                teacher_id TEXT PRIMARY KEY,
                updated_at TEXT NOT NULL
            );

            -- weekday: 0 = Monday; times are UTC HH:MM
            CREATE TABLE IF NOT EXISTS availability_slots (
                teacher_id TEXT NOT NULL,
                weekday INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                FOREIGN KEY (teacher_id) REFERENCES availability_profiles(teacher_id) ON DELETE CASCADE
            );
            ",
        )?;
        Ok(())
    }

    /// Creates a class and materializes its sessions in one transaction.
    pub fn create_class(
        &mut self,
        new_class: &NewClass,
    ) -> Result<RegenerationOutcome, RegenerationError> {
        self.create_class_at(new_class, Utc::now())
    }

    fn create_class_at(
        &mut self,
        new_class: &NewClass,
        now: DateTime<Utc>,
    ) -> Result<RegenerationOutcome, RegenerationError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|err| RegenerationError::Create {
                name: new_class.name.clone(),
                source: Box::new(DbError::from(err)),
            })?;
        let outcome = tutor_core::create_class(&mut Store::new(&tx, now), new_class)?;
        tx.commit()
            .map_err(|err| commit_failed(&outcome.class.id, err))?;
        Ok(outcome)
    }

    /// Applies an edit, regenerating future sessions when the schedule changed.
    ///
    /// Runs in one transaction: on any fatal error nothing is written.
    pub fn edit_class(
        &mut self,
        class_id: &ClassId,
        edit: &ClassEdit,
    ) -> Result<RegenerationOutcome, RegenerationError> {
        self.edit_class_at(class_id, edit, Utc::now())
    }

    fn edit_class_at(
        &mut self,
        class_id: &ClassId,
        edit: &ClassEdit,
        now: DateTime<Utc>,
    ) -> Result<RegenerationOutcome, RegenerationError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|err| RegenerationError::Load {
                class_id: class_id.clone(),
                source: Box::new(DbError::from(err)),
            })?;
        let outcome = tutor_core::regenerate(&mut Store::new(&tx, now), class_id, edit, now)?;
        tx.commit().map_err(|err| commit_failed(class_id, err))?;
        Ok(outcome)
    }

    pub fn get_class(&self, class_id: &ClassId) -> Result<Option<StoredClass>, DbError> {
        store::load_class(&self.conn, class_id)
    }

    /// Lists classes ordered by name then ID.
    pub fn list_classes(&self) -> Result<Vec<StoredClass>, DbError> {
        store::list_classes(&self.conn)
    }

    /// Adds a participant to a class, or changes their role.
    ///
    /// Seeds `expected` attendance for the class's sessions that have not
    /// ended yet.
    pub fn enroll(
        &mut self,
        class_id: &ClassId,
        participant_id: &ParticipantId,
        role: Role,
    ) -> Result<Enrollment, DbError> {
        self.enroll_at(class_id, participant_id, role, Utc::now())
    }

    fn enroll_at(
        &mut self,
        class_id: &ClassId,
        participant_id: &ParticipantId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, DbError> {
        if store::load_class(&self.conn, class_id)?.is_none() {
            return Err(DbError::ClassNotFound(class_id.to_string()));
        }
        let tx = self.conn.transaction()?;
        tx.execute(
            "
            INSERT INTO class_participants (class_id, participant_id, role, enrolled_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(class_id, participant_id) DO UPDATE SET role = excluded.role
            ",
            params![
                class_id.as_str(),
                participant_id.as_str(),
                role.as_str(),
                format_timestamp(now),
            ],
        )?;
        let upcoming: Vec<AttendanceRecord> = store::class_sessions(&tx, class_id)?
            .into_iter()
            .filter(|session| !session.is_past(now) && session.status == SessionStatus::Scheduled)
            .map(|session| AttendanceRecord::expected(session.id, participant_id.clone(), role))
            .collect();
        let attendance_seeded = store::insert_attendance(&tx, &upcoming, now)?;
        tx.commit()?;

        tracing::info!(
            %class_id,
            %participant_id,
            role = role.as_str(),
            attendance_seeded,
            "enrolled participant"
        );
        Ok(Enrollment {
            class_id: class_id.clone(),
            participant_id: participant_id.clone(),
            role,
            attendance_seeded,
        })
    }

    /// Removes a participant from a class roster. Attendance history is kept.
    ///
    /// Returns `false` if the participant was not enrolled.
    pub fn unenroll(
        &mut self,
        class_id: &ClassId,
        participant_id: &ParticipantId,
    ) -> Result<bool, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM class_participants WHERE class_id = ? AND participant_id = ?",
            params![class_id.as_str(), participant_id.as_str()],
        )?;
        Ok(removed > 0)
    }

    pub fn roster(&self, class_id: &ClassId) -> Result<Roster, DbError> {
        store::roster(&self.conn, class_id)
    }

    /// Lists a class's sessions in start order.
    pub fn list_sessions(&self, class_id: &ClassId) -> Result<Vec<SessionInstance>, DbError> {
        store::class_sessions(&self.conn, class_id)
    }

    pub fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionInstance>, DbError> {
        store::get_session(&self.conn, session_id)
    }

    /// Moves a session to a new lifecycle state. Attendance is not touched.
    pub fn set_session_status(
        &mut self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE sessions SET status = ? WHERE id = ?",
            params![status.as_str(), session_id.as_str()],
        )?;
        if updated == 0 {
            return Err(DbError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Replaces a teacher's weekly availability. Slots are UTC times of day.
    pub fn set_availability(
        &mut self,
        teacher_id: &ParticipantId,
        window: &AvailabilityWindow,
    ) -> Result<usize, DbError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "
            INSERT INTO availability_profiles (teacher_id, updated_at) VALUES (?, ?)
            ON CONFLICT(teacher_id) DO UPDATE SET updated_at = excluded.updated_at
            ",
            params![teacher_id.as_str(), format_timestamp(Utc::now())],
        )?;
        tx.execute(
            "DELETE FROM availability_slots WHERE teacher_id = ?",
            [teacher_id.as_str()],
        )?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO availability_slots (teacher_id, weekday, start_time, end_time)
                VALUES (?, ?, ?, ?)
                ",
            )?;
            for (day, slot) in window.iter() {
                inserted += stmt.execute(params![
                    teacher_id.as_str(),
                    day.num_days_from_monday(),
                    tutor_core::format_time(slot.start()),
                    tutor_core::format_time(slot.end()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Forgets a teacher's availability, which disables availability checks.
    pub fn clear_availability(&mut self, teacher_id: &ParticipantId) -> Result<bool, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM availability_profiles WHERE teacher_id = ?",
            [teacher_id.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// `None` when the teacher never configured availability.
    pub fn availability(
        &self,
        teacher_id: &ParticipantId,
    ) -> Result<Option<AvailabilityWindow>, DbError> {
        store::availability(&self.conn, teacher_id)
    }

    /// Records attendance, overwriting any previous status.
    ///
    /// The participant must be on the class roster or already have an
    /// attendance row for the session.
    pub fn mark_attendance(
        &mut self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        status: AttendanceStatus,
    ) -> Result<AttendanceRecord, DbError> {
        let session = store::get_session(&self.conn, session_id)?
            .ok_or_else(|| DbError::SessionNotFound(session_id.to_string()))?;
        let role: Option<String> = self
            .conn
            .query_row(
                "
                SELECT role FROM class_participants WHERE class_id = ?1 AND participant_id = ?2
                UNION ALL
                SELECT role FROM attendance WHERE session_id = ?3 AND participant_id = ?2
                LIMIT 1
                ",
                params![
                    session.class_id.as_str(),
                    participant_id.as_str(),
                    session_id.as_str()
                ],
                |row| row.get(0),
            )
            .optional()?;
        let Some(role) = role else {
            return Err(DbError::NotEnrolled {
                class_id: session.class_id.to_string(),
                participant_id: participant_id.to_string(),
            });
        };
        let role: Role = role.parse()?;

        self.conn.execute(
            "
            INSERT INTO attendance (session_id, participant_id, role, status, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id, participant_id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            ",
            params![
                session_id.as_str(),
                participant_id.as_str(),
                role.as_str(),
                status.as_str(),
                format_timestamp(Utc::now()),
            ],
        )?;
        Ok(AttendanceRecord {
            session_id: session_id.clone(),
            participant_id: participant_id.clone(),
            role,
            status,
        })
    }

    /// Lists attendance for a session, teachers first.
    pub fn list_attendance(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<AttendanceRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT participant_id, role, status
            FROM attendance
            WHERE session_id = ?
            ORDER BY CASE role WHEN 'teacher' THEN 0 ELSE 1 END, participant_id ASC
            ",
        )?;
        let rows = stmt.query_map([session_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (participant_id, role, status) = row?;
            records.push(AttendanceRecord {
                session_id: session_id.clone(),
                participant_id: ParticipantId::new(participant_id)?,
                role: role.parse()?,
                status: status.parse()?,
            });
        }
        Ok(records)
    }
}

impl ScheduleSource for Database {
    type Error = DbError;

    fn participant_sessions(
        &self,
        participant_id: &ParticipantId,
        role: Role,
    ) -> Result<ParticipantSessions, DbError> {
        store::participant_sessions(&self.conn, participant_id, role)
    }

    fn availability(
        &self,
        teacher_id: &ParticipantId,
    ) -> Result<Option<AvailabilityWindow>, DbError> {
        store::availability(&self.conn, teacher_id)
    }
}

/// A [`Database`] that can be shared across threads.
///
/// Used to fan conflict checks out over many participants.
pub struct SharedDatabase {
    inner: Mutex<Database>,
}

impl SharedDatabase {
    pub const fn new(db: Database) -> Self {
        Self {
            inner: Mutex::new(db),
        }
    }

    pub fn into_inner(self) -> Result<Database, DbError> {
        self.inner.into_inner().map_err(|_| DbError::LockPoisoned)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, DbError> {
        self.inner.lock().map_err(|_| DbError::LockPoisoned)
    }
}

impl ScheduleSource for SharedDatabase {
    type Error = DbError;

    fn participant_sessions(
        &self,
        participant_id: &ParticipantId,
        role: Role,
    ) -> Result<ParticipantSessions, DbError> {
        self.lock()?.participant_sessions(participant_id, role)
    }

    fn availability(
        &self,
        teacher_id: &ParticipantId,
    ) -> Result<Option<AvailabilityWindow>, DbError> {
        ScheduleSource::availability(&*self.lock()?, teacher_id)
    }
}

fn commit_failed(class_id: &ClassId, err: rusqlite::Error) -> RegenerationError {
    RegenerationError::PartialFailure {
        class_id: class_id.clone(),
        step: "commit",
        source: Box::new(DbError::from(err)),
    }
}

fn parse_timestamp(timestamp: &str, record_id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            record_id: record_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
