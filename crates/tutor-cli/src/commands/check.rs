//! Check command: conflict detection for a candidate schedule.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Args;
use tutor_core::{
    Candidate, CheckOptions, ClassId, ConflictReport, FailurePolicy, ParticipantId, Role,
    check_participants, weekday_label,
};
use tutor_db::{Database, SharedDatabase};

use crate::Config;
use crate::commands::util::{ScheduleArgs, open_database, participants};

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub schedule: ScheduleArgs,

    /// Teacher to check, repeatable.
    #[arg(long = "teacher", value_name = "ID")]
    pub teachers: Vec<String>,

    /// Student to check, repeatable.
    #[arg(long = "student", value_name = "ID")]
    pub students: Vec<String>,

    /// Ignore this class's own sessions (when checking an edit).
    #[arg(long, value_name = "CLASS_ID")]
    pub exclude_class: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &CheckArgs, config: &Config) -> Result<()> {
    let participants = participants(&args.teachers, &args.students)?;
    if participants.is_empty() {
        bail!("nothing to check: pass --teacher or --student");
    }
    let exclude_class = args.exclude_class.as_deref().map(ClassId::new).transpose()?;
    let candidate = Candidate::from_schedule(&args.schedule.schedule(config)?, exclude_class);

    let db = open_database(config)?;
    let (_, reports) = check_conflicts(db, &participants, &candidate, config.conflict_policy)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&reports)?)?;
        return Ok(());
    }
    write_reports(writer, &reports)
}

/// Checks every participant in parallel and hands the database back.
pub(crate) fn check_conflicts(
    db: Database,
    participants: &[(ParticipantId, Role)],
    candidate: &Candidate,
    policy: FailurePolicy,
) -> Result<(Database, Vec<ConflictReport>)> {
    let shared = SharedDatabase::new(db);
    let options = CheckOptions {
        now: Utc::now(),
        policy,
    };
    let reports = check_participants(&shared, participants, candidate, options)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .context("conflict check failed")?;
    let db = shared.into_inner()?;
    Ok((db, reports))
}

pub(crate) fn write_reports<W: Write>(writer: &mut W, reports: &[ConflictReport]) -> Result<()> {
    for report in reports {
        let who = format!("{} ({})", report.participant_id, report.role);
        if report.degraded {
            writeln!(writer, "{who}: check unavailable, assumed free")?;
        } else if report.conflicts.is_empty() {
            writeln!(writer, "{who}: no conflicts")?;
        } else {
            writeln!(writer, "{who}: {} conflict(s)", report.conflicts.len())?;
            for conflict in &report.conflicts {
                let since = conflict
                    .date
                    .map(|date| format!(" from {date}"))
                    .unwrap_or_default();
                writeln!(
                    writer,
                    "  - [{}] {}{since}: {}",
                    conflict.kind.as_str(),
                    weekday_label(conflict.day),
                    conflict.message
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDate, Weekday};
    use insta::assert_snapshot;
    use tutor_core::{
        AvailabilityWindow, ClassSchedule, NewClass, RecurrencePattern, parse_timezone,
    };

    fn config(db_path: std::path::PathBuf) -> Config {
        Config {
            database_path: db_path,
            conflict_policy: FailurePolicy::Open,
            default_timezone: Some("UTC".to_string()),
        }
    }

    fn schedule_args(slot: &str, timezone: &str) -> ScheduleArgs {
        ScheduleArgs {
            slots: vec![slot.to_string()],
            timezone: Some(timezone.to_string()),
            start: NaiveDate::from_ymd_opt(2030, 4, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2030, 4, 30).unwrap(),
        }
    }

    fn seed_class(db: &mut Database, teacher: &str) -> ClassId {
        let class = db
            .create_class(&NewClass {
                name: "Piano".to_string(),
                description: None,
                schedule: ClassSchedule {
                    timezone: parse_timezone("America/Los_Angeles").unwrap(),
                    start_date: NaiveDate::from_ymd_opt(2030, 4, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2030, 4, 30).unwrap(),
                    recurrence: RecurrencePattern::new()
                        .with(Weekday::Tue, "11:30-12:30".parse().unwrap()),
                },
            })
            .unwrap()
            .class;
        db.enroll(&class.id, &ParticipantId::new(teacher).unwrap(), Role::Teacher)
            .unwrap();
        class.id
    }

    #[test]
    fn check_reports_cross_timezone_overlap() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("tutor.db");
        let mut db = Database::open(&db_path).unwrap();
        seed_class(&mut db, "t1");
        drop(db);

        let args = CheckArgs {
            schedule: schedule_args("tuesday=14:00-15:00", "America/New_York"),
            teachers: vec!["t1".to_string()],
            students: vec!["s1".to_string()],
            exclude_class: None,
            json: false,
        };
        let mut output = Vec::new();

        run(&mut output, &args, &config(db_path)).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        t1 (teacher): 1 conflict(s)
          - [schedule] Tuesday from 2030-04-02: overlaps Piano on Tuesday (14:30-15:30 vs 14:00-15:00)
        s1 (student): no conflicts
        ");
    }

    #[test]
    fn excluded_class_is_not_a_conflict() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("tutor.db");
        let mut db = Database::open(&db_path).unwrap();
        let class_id = seed_class(&mut db, "t1");
        drop(db);

        let args = CheckArgs {
            schedule: schedule_args("tuesday=14:00-15:00", "America/New_York"),
            teachers: vec!["t1".to_string()],
            students: Vec::new(),
            exclude_class: Some(class_id.to_string()),
            json: false,
        };
        let mut output = Vec::new();

        run(&mut output, &args, &config(db_path)).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @"t1 (teacher): no conflicts");
    }

    #[test]
    fn check_reports_missing_availability_day_as_json() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("tutor.db");
        let mut db = Database::open(&db_path).unwrap();
        let mut window = AvailabilityWindow::new();
        window.add(Weekday::Mon, "13:00-22:00".parse().unwrap());
        db.set_availability(&ParticipantId::new("t2").unwrap(), &window)
            .unwrap();
        drop(db);

        let args = CheckArgs {
            schedule: schedule_args("sunday=10:00-11:00", "America/Toronto"),
            teachers: vec!["t2".to_string()],
            students: Vec::new(),
            exclude_class: None,
            json: true,
        };
        let mut output = Vec::new();

        run(&mut output, &args, &config(db_path)).unwrap();

        let reports: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(reports[0]["has_conflict"], true);
        assert_eq!(reports[0]["conflicts"][0]["type"], "availability");
        assert_eq!(
            reports[0]["conflicts"][0]["message"],
            "no availability set for this day"
        );
    }

    #[test]
    fn check_requires_participants() {
        let temp = tempfile::tempdir().unwrap();
        let args = CheckArgs {
            schedule: schedule_args("tuesday=14:00-15:00", "UTC"),
            teachers: Vec::new(),
            students: Vec::new(),
            exclude_class: None,
            json: false,
        };
        let mut output = Vec::new();

        let err = run(&mut output, &args, &config(temp.path().join("tutor.db"))).unwrap_err();
        assert!(err.to_string().contains("nothing to check"));
    }
}
