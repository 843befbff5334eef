//! Attendance commands.

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use tutor_core::{AttendanceStatus, ParticipantId, SessionId};

use crate::Config;
use crate::commands::util::open_database;

#[derive(Debug, Subcommand)]
pub enum AttendanceAction {
    /// Record a participant's attendance at a session.
    Mark(MarkArgs),
    /// List attendance for a session.
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct MarkArgs {
    pub session_id: String,
    pub participant_id: String,

    /// present, absent, late or expected.
    pub status: AttendanceStatus,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    pub session_id: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, action: &AttendanceAction, config: &Config) -> Result<()> {
    match action {
        AttendanceAction::Mark(args) => mark(writer, args, config),
        AttendanceAction::List(args) => list(writer, args, config),
    }
}

fn mark<W: Write>(writer: &mut W, args: &MarkArgs, config: &Config) -> Result<()> {
    let session_id = SessionId::new(args.session_id.as_str())?;
    let participant_id = ParticipantId::new(args.participant_id.trim())?;

    let mut db = open_database(config)?;
    let record = db.mark_attendance(&session_id, &participant_id, args.status)?;
    writeln!(
        writer,
        "Marked {} ({}) {} for session {}",
        record.participant_id, record.role, record.status, record.session_id
    )?;
    Ok(())
}

fn list<W: Write>(writer: &mut W, args: &ListArgs, config: &Config) -> Result<()> {
    let session_id = SessionId::new(args.session_id.as_str())?;
    let db = open_database(config)?;
    let records = db.list_attendance(&session_id)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&records)?)?;
        return Ok(());
    }
    if records.is_empty() {
        writeln!(writer, "No attendance recorded for session {session_id}")?;
        return Ok(());
    }
    for record in &records {
        writeln!(
            writer,
            "{:<12}  {:<7}  {}",
            record.participant_id.as_str(),
            record.role.as_str(),
            record.status
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDate, Weekday};
    use insta::assert_snapshot;
    use tutor_core::{
        ClassSchedule, FailurePolicy, NewClass, RecurrencePattern, Role, parse_timezone,
    };
    use tutor_db::Database;

    fn setup(temp: &tempfile::TempDir) -> (Config, SessionId) {
        let db_path = temp.path().join("tutor.db");
        let mut db = Database::open(&db_path).unwrap();
        let class = db
            .create_class(&NewClass {
                name: "Biology".to_string(),
                description: None,
                schedule: ClassSchedule {
                    timezone: parse_timezone("UTC").unwrap(),
                    start_date: NaiveDate::from_ymd_opt(2030, 4, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2030, 4, 7).unwrap(),
                    recurrence: RecurrencePattern::new()
                        .with(Weekday::Wed, "15:00-16:00".parse().unwrap()),
                },
            })
            .unwrap()
            .class;
        db.enroll(&class.id, &ParticipantId::new("ms-lee").unwrap(), Role::Teacher)
            .unwrap();
        db.enroll(&class.id, &ParticipantId::new("sam").unwrap(), Role::Student)
            .unwrap();
        let session_id = db.list_sessions(&class.id).unwrap().remove(0).id;
        let config = Config {
            database_path: db_path,
            conflict_policy: FailurePolicy::Open,
            default_timezone: None,
        };
        (config, session_id)
    }

    #[test]
    fn mark_overwrites_seeded_status() {
        let temp = tempfile::tempdir().unwrap();
        let (config, session_id) = setup(&temp);

        let args = MarkArgs {
            session_id: session_id.to_string(),
            participant_id: "sam".to_string(),
            status: AttendanceStatus::Late,
        };
        let mut output = Vec::new();
        mark(&mut output, &args, &config).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("Marked sam (student) late for session {session_id}\n")
        );

        let list_args = ListArgs {
            session_id: session_id.to_string(),
            json: false,
        };
        let mut output = Vec::new();
        list(&mut output, &list_args, &config).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        ms-lee        teacher  expected
        sam           student  late
        ");
    }

    #[test]
    fn mark_rejects_unenrolled_participant() {
        let temp = tempfile::tempdir().unwrap();
        let (config, session_id) = setup(&temp);

        let args = MarkArgs {
            session_id: session_id.to_string(),
            participant_id: "stranger".to_string(),
            status: AttendanceStatus::Present,
        };
        assert!(mark(&mut std::io::sink(), &args, &config).is_err());
    }

    #[test]
    fn list_unknown_session_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let (config, _) = setup(&temp);

        let args = ListArgs {
            session_id: "nope".to_string(),
            json: false,
        };
        let mut output = Vec::new();
        list(&mut output, &args, &config).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "No attendance recorded for session nope\n"
        );
    }
}
