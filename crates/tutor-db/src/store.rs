//! Row mapping and the collaborator traits over a borrowed connection.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use rusqlite::{Connection, OptionalExtension, params};
use tutor_core::{
    AttendanceRecord, AvailabilityWindow, Class, ClassId, ClassSchedule, ClassStatus, NewClass,
    ParticipantId, ParticipantSessions, PlannedSession, Role, Roster, ScheduleSource,
    ScheduleStore, SessionId, SessionInstance, SessionStatus, StoredClass, TimeSlot,
    normalize_pattern_text, parse_timezone,
};
use uuid::Uuid;

use crate::{DbError, format_timestamp, parse_timestamp};

/// Schedule storage bound to one connection or open transaction.
///
/// [`Database`](crate::Database) wraps a transaction in a `Store` for each
/// create or edit, so everything the core pipeline writes commits together.
pub struct Store<'c> {
    conn: &'c Connection,
    now: DateTime<Utc>,
}

impl<'c> Store<'c> {
    /// `now` stamps `created_at`/`updated_at` columns.
    pub const fn new(conn: &'c Connection, now: DateTime<Utc>) -> Self {
        Self { conn, now }
    }
}

struct ClassRow {
    id: String,
    name: String,
    description: Option<String>,
    timezone: String,
    start_date: String,
    end_date: String,
    recurrence: String,
    status: String,
}

impl ClassRow {
    const COLUMNS: &'static str =
        "id, name, description, timezone, start_date, end_date, recurrence, status";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            timezone: row.get(3)?,
            start_date: row.get(4)?,
            end_date: row.get(5)?,
            recurrence: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn into_stored(self) -> Result<StoredClass, DbError> {
        let invalid = |message: String| DbError::InvalidRecord {
            record_id: self.id.clone(),
            message,
        };
        let timezone = parse_timezone(&self.timezone).map_err(|err| invalid(err.to_string()))?;
        let normalized =
            normalize_pattern_text(&self.recurrence).map_err(|err| invalid(err.to_string()))?;
        if normalized.needs_migration() {
            tracing::warn!(
                class_id = %self.id,
                days = ?normalized.defaulted_days,
                "stored pattern has days without times; defaulted to 00:00-01:00"
            );
        }
        let status = self.status.parse::<ClassStatus>()?;
        let class = Class {
            id: ClassId::new(self.id.clone())?,
            schedule: ClassSchedule {
                timezone,
                start_date: parse_date(&self.start_date, &self.id)?,
                end_date: parse_date(&self.end_date, &self.id)?,
                recurrence: normalized.pattern,
            },
            name: self.name,
            description: self.description,
            status,
        };
        Ok(StoredClass {
            class,
            defaulted_days: normalized.defaulted_days,
        })
    }
}

fn parse_date(value: &str, record_id: &str) -> Result<NaiveDate, DbError> {
    value
        .parse::<NaiveDate>()
        .map_err(|source| DbError::TimestampParse {
            record_id: record_id.to_string(),
            timestamp: value.to_string(),
            source,
        })
}

pub(crate) fn load_class(
    conn: &Connection,
    class_id: &ClassId,
) -> Result<Option<StoredClass>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM classes WHERE id = ?", ClassRow::COLUMNS),
            [class_id.as_str()],
            ClassRow::from_row,
        )
        .optional()?;
    row.map(ClassRow::into_stored).transpose()
}

pub(crate) fn list_classes(conn: &Connection) -> Result<Vec<StoredClass>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM classes ORDER BY name ASC, id ASC",
        ClassRow::COLUMNS
    ))?;
    let rows = stmt.query_map([], ClassRow::from_row)?;
    let mut classes = Vec::new();
    for row in rows {
        classes.push(row?.into_stored()?);
    }
    Ok(classes)
}

const SESSION_COLUMNS: &str = "id, class_id, start_at, end_at, status";

type SessionRow = (String, String, String, String, String);

fn session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_session(row: SessionRow) -> Result<SessionInstance, DbError> {
    let (id, class_id, start_at, end_at, status) = row;
    let status = status.parse::<SessionStatus>()?;
    Ok(SessionInstance {
        start: parse_timestamp(&start_at, &id)?,
        end: parse_timestamp(&end_at, &id)?,
        class_id: ClassId::new(class_id)?,
        id: SessionId::new(id)?,
        status,
    })
}

pub(crate) fn get_session(
    conn: &Connection,
    session_id: &SessionId,
) -> Result<Option<SessionInstance>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"),
            [session_id.as_str()],
            session_row,
        )
        .optional()?;
    row.map(into_session).transpose()
}

pub(crate) fn class_sessions(
    conn: &Connection,
    class_id: &ClassId,
) -> Result<Vec<SessionInstance>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE class_id = ? ORDER BY start_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map([class_id.as_str()], session_row)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(into_session(row?)?);
    }
    Ok(sessions)
}

pub(crate) fn roster(conn: &Connection, class_id: &ClassId) -> Result<Roster, DbError> {
    let mut stmt = conn.prepare(
        "
        SELECT participant_id, role
        FROM class_participants
        WHERE class_id = ?
        ORDER BY enrolled_at ASC, participant_id ASC
        ",
    )?;
    let rows = stmt.query_map([class_id.as_str()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut roster = Roster::default();
    for row in rows {
        let (participant_id, role) = row?;
        let role: Role = role.parse()?;
        let participant_id = ParticipantId::new(participant_id)?;
        match role {
            Role::Teacher => roster.teachers.push(participant_id),
            Role::Student => roster.students.push(participant_id),
        }
    }
    Ok(roster)
}

pub(crate) fn insert_attendance(
    conn: &Connection,
    records: &[AttendanceRecord],
    now: DateTime<Utc>,
) -> Result<usize, DbError> {
    let updated_at = format_timestamp(now);
    let mut stmt = conn.prepare(
        "
        INSERT OR IGNORE INTO attendance (session_id, participant_id, role, status, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ",
    )?;
    let mut inserted = 0;
    for record in records {
        inserted += stmt.execute(params![
            record.session_id.as_str(),
            record.participant_id.as_str(),
            record.role.as_str(),
            record.status.as_str(),
            updated_at,
        ])?;
    }
    Ok(inserted)
}

pub(crate) fn participant_sessions(
    conn: &Connection,
    participant_id: &ParticipantId,
    role: Role,
) -> Result<ParticipantSessions, DbError> {
    let mut stmt = conn.prepare(
        "
        SELECT s.id, s.class_id, s.start_at, s.end_at, s.status
        FROM sessions s
        JOIN class_participants p ON p.class_id = s.class_id
        WHERE p.participant_id = ? AND p.role = ?
        ORDER BY s.start_at ASC, s.id ASC
        ",
    )?;
    let rows = stmt.query_map(params![participant_id.as_str(), role.as_str()], session_row)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(into_session(row?)?);
    }

    let mut classes = HashMap::new();
    for session in &sessions {
        if classes.contains_key(&session.class_id) {
            continue;
        }
        if let Some(stored) = load_class(conn, &session.class_id)? {
            classes.insert(session.class_id.clone(), stored.class);
        }
    }
    Ok(ParticipantSessions { classes, sessions })
}

pub(crate) fn availability(
    conn: &Connection,
    teacher_id: &ParticipantId,
) -> Result<Option<AvailabilityWindow>, DbError> {
    let configured: Option<String> = conn
        .query_row(
            "SELECT teacher_id FROM availability_profiles WHERE teacher_id = ?",
            [teacher_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    if configured.is_none() {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "
        SELECT weekday, start_time, end_time
        FROM availability_slots
        WHERE teacher_id = ?
        ORDER BY weekday ASC, start_time ASC
        ",
    )?;
    let rows = stmt.query_map([teacher_id.as_str()], |row| {
        Ok((
            row.get::<_, u8>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut window = AvailabilityWindow::new();
    for row in rows {
        let (weekday, start, end) = row?;
        let invalid = |message: String| DbError::InvalidRecord {
            record_id: teacher_id.to_string(),
            message,
        };
        let day = Weekday::try_from(weekday).map_err(|err| invalid(err.to_string()))?;
        let slot = TimeSlot::parse(&start, &end).map_err(|err| invalid(err.to_string()))?;
        window.add(day, slot);
    }
    Ok(Some(window))
}

/// Session IDs are stable for a given class, start and end instant.
fn deterministic_session_id(
    class_id: &ClassId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<SessionId, DbError> {
    let content = format!(
        "session|{class_id}|{}|{}",
        format_timestamp(start),
        format_timestamp(end)
    );
    Ok(SessionId::new(
        Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()).to_string(),
    )?)
}

impl ScheduleStore for Store<'_> {
    type Error = DbError;

    fn load_class(&self, class_id: &ClassId) -> Result<Option<StoredClass>, DbError> {
        load_class(self.conn, class_id)
    }

    fn insert_class(&mut self, class: &NewClass) -> Result<Class, DbError> {
        let id = ClassId::new(Uuid::new_v4().to_string())?;
        let now = format_timestamp(self.now);
        let schedule = &class.schedule;
        self.conn.execute(
            "
            INSERT INTO classes
            (id, name, description, timezone, start_date, end_date, recurrence, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)
            ",
            params![
                id.as_str(),
                class.name,
                class.description,
                schedule.timezone.name(),
                schedule.start_date.to_string(),
                schedule.end_date.to_string(),
                schedule.recurrence.to_json()?,
                now,
                now,
            ],
        )?;
        Ok(Class {
            id,
            name: class.name.clone(),
            description: class.description.clone(),
            status: ClassStatus::Active,
            schedule: schedule.clone(),
        })
    }

    fn update_class(&mut self, class: &Class) -> Result<(), DbError> {
        let stored = load_class(self.conn, &class.id)?
            .ok_or_else(|| DbError::ClassNotFound(class.id.to_string()))?;
        let schedule = &class.schedule;
        // Legacy text stays untouched until the pattern itself changes, so its
        // defaulted days remain flagged.
        let recurrence = if stored.class.schedule.recurrence == schedule.recurrence {
            None
        } else {
            Some(schedule.recurrence.to_json()?)
        };
        self.conn.execute(
            "
            UPDATE classes SET
                name = ?,
                description = ?,
                status = ?,
                timezone = ?,
                start_date = ?,
                end_date = ?,
                recurrence = COALESCE(?, recurrence),
                updated_at = ?
            WHERE id = ?
            ",
            params![
                class.name,
                class.description,
                class.status.as_str(),
                schedule.timezone.name(),
                schedule.start_date.to_string(),
                schedule.end_date.to_string(),
                recurrence,
                format_timestamp(self.now),
                class.id.as_str(),
            ],
        )?;
        Ok(())
    }

    fn class_sessions(&self, class_id: &ClassId) -> Result<Vec<SessionInstance>, DbError> {
        class_sessions(self.conn, class_id)
    }

    fn delete_future_sessions(
        &mut self,
        class_id: &ClassId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        let deleted = self.conn.execute(
            "DELETE FROM sessions WHERE class_id = ? AND end_at >= ?",
            params![class_id.as_str(), format_timestamp(cutoff)],
        )?;
        Ok(deleted)
    }

    fn persist_sessions(
        &mut self,
        class_id: &ClassId,
        sessions: &[PlannedSession],
    ) -> Result<Vec<SessionId>, DbError> {
        let created_at = format_timestamp(self.now);
        let mut stmt = self.conn.prepare(
            "
            INSERT INTO sessions (id, class_id, start_at, end_at, status, created_at)
            VALUES (?, ?, ?, ?, 'scheduled', ?)
            ",
        )?;
        let mut ids = Vec::with_capacity(sessions.len());
        for session in sessions {
            let id = deterministic_session_id(class_id, session.start, session.end)?;
            stmt.execute(params![
                id.as_str(),
                class_id.as_str(),
                format_timestamp(session.start),
                format_timestamp(session.end),
                created_at,
            ])?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn roster(&self, class_id: &ClassId) -> Result<Roster, DbError> {
        roster(self.conn, class_id)
    }

    fn seed_attendance(&mut self, records: &[AttendanceRecord]) -> Result<usize, DbError> {
        insert_attendance(self.conn, records, self.now)
    }
}

impl ScheduleSource for Store<'_> {
    type Error = DbError;

    fn participant_sessions(
        &self,
        participant_id: &ParticipantId,
        role: Role,
    ) -> Result<ParticipantSessions, DbError> {
        participant_sessions(self.conn, participant_id, role)
    }

    fn availability(
        &self,
        teacher_id: &ParticipantId,
    ) -> Result<Option<AvailabilityWindow>, DbError> {
        availability(self.conn, teacher_id)
    }
}
