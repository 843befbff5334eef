//! Class commands: create, edit, inspect and manage rosters.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use tutor_core::{
    Candidate, ClassEdit, ClassId, ClassStatus, NewClass, ParticipantId, RecurrencePattern,
    RegenerationOutcome, Role, Roster, StoredClass, parse_timezone, weekday_label,
};
use tutor_db::Database;

use crate::Config;
use crate::commands::check::{check_conflicts, write_reports};
use crate::commands::util::{
    ScheduleArgs, build_pattern, open_database, parse_day_slots, participants,
};

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Class name.
    pub name: String,

    #[arg(long)]
    pub description: Option<String>,

    #[command(flatten)]
    pub schedule: ScheduleArgs,

    /// Teacher to enroll, repeatable.
    #[arg(long = "teacher", value_name = "ID")]
    pub teachers: Vec<String>,

    /// Student to enroll, repeatable.
    #[arg(long = "student", value_name = "ID")]
    pub students: Vec<String>,

    /// Create the class even if participants have conflicts.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub class_id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// New status (active, completed, cancelled).
    #[arg(long)]
    pub status: Option<ClassStatus>,

    #[arg(long)]
    pub timezone: Option<String>,

    #[arg(long)]
    pub start: Option<NaiveDate>,

    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Set one day's times, keeping the other days. Repeatable.
    #[arg(long = "slot", value_name = "DAY=HH:MM-HH:MM")]
    pub slots: Vec<String>,

    /// Replace the whole weekly pattern with the given slots.
    #[arg(long, requires = "slots")]
    pub replace: bool,

    /// Apply the edit even if participants have conflicts.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    pub class_id: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct EnrollArgs {
    pub class_id: String,
    pub participant_id: String,

    /// Role in the class (teacher or student).
    #[arg(long, default_value = "student")]
    pub role: Role,

    /// Enroll even if the participant has conflicts.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct UnenrollArgs {
    pub class_id: String,
    pub participant_id: String,
}

#[derive(Serialize)]
struct ClassView<'a> {
    id: &'a ClassId,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    status: ClassStatus,
    timezone: &'static str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    recurrence: &'a RecurrencePattern,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    needs_migration: Vec<&'static str>,
}

impl<'a> ClassView<'a> {
    fn new(stored: &'a StoredClass) -> Self {
        let class = &stored.class;
        Self {
            id: &class.id,
            name: &class.name,
            description: class.description.as_deref(),
            status: class.status,
            timezone: class.schedule.timezone.name(),
            start_date: class.schedule.start_date,
            end_date: class.schedule.end_date,
            recurrence: &class.schedule.recurrence,
            needs_migration: stored
                .defaulted_days
                .iter()
                .map(|day| weekday_label(*day))
                .collect(),
        }
    }
}

fn load_class(db: &Database, class_id: &ClassId) -> Result<StoredClass> {
    db.get_class(class_id)?
        .with_context(|| format!("class not found: {class_id}"))
}

/// Refuses to continue when any participant has a conflict, unless forced.
fn guard_conflicts<W: Write>(
    writer: &mut W,
    db: Database,
    participants: &[(ParticipantId, Role)],
    candidate: &Candidate,
    config: &Config,
    force: bool,
) -> Result<Database> {
    if participants.is_empty() {
        return Ok(db);
    }
    let (db, reports) = check_conflicts(db, participants, candidate, config.conflict_policy)?;
    if reports.iter().any(|report| report.has_conflict) {
        write_reports(writer, &reports)?;
        if !force {
            bail!("schedule conflicts found; re-run with --force to continue anyway");
        }
    }
    Ok(db)
}

fn roster_participants(roster: &Roster) -> Vec<(ParticipantId, Role)> {
    roster
        .participants()
        .into_iter()
        .map(|(id, role)| (id.clone(), role))
        .collect()
}

fn write_attendance_warning<W: Write>(writer: &mut W, outcome: &RegenerationOutcome) -> Result<()> {
    if let Some(err) = &outcome.attendance_error {
        writeln!(writer, "  warning: attendance was not seeded: {err}")?;
    }
    Ok(())
}

pub fn create<W: Write>(writer: &mut W, args: &CreateArgs, config: &Config) -> Result<()> {
    let name = args.name.trim();
    if name.is_empty() {
        bail!("class name cannot be empty");
    }
    let schedule = args.schedule.schedule(config)?;
    let participants = participants(&args.teachers, &args.students)?;

    let db = open_database(config)?;
    let candidate = Candidate::from_schedule(&schedule, None);
    let mut db = guard_conflicts(writer, db, &participants, &candidate, config, args.force)?;

    let outcome = db
        .create_class(&NewClass {
            name: name.to_string(),
            description: args.description.clone(),
            schedule,
        })
        .context("failed to create class")?;
    for (participant_id, role) in &participants {
        db.enroll(&outcome.class.id, participant_id, *role)?;
    }

    let class = &outcome.class;
    writeln!(writer, "Created class {} ({})", class.name, class.id)?;
    writeln!(
        writer,
        "  {} sessions from {} to {} ({})",
        outcome.created.len(),
        class.schedule.start_date,
        class.schedule.end_date,
        class.schedule.timezone.name()
    )?;
    if !participants.is_empty() {
        writeln!(writer, "  enrolled {} participant(s)", participants.len())?;
    }
    write_attendance_warning(writer, &outcome)
}

pub fn edit<W: Write>(writer: &mut W, args: &EditArgs, config: &Config) -> Result<()> {
    let class_id = ClassId::new(args.class_id.as_str())?;
    let (recurrence, day_times) = if args.replace {
        (Some(build_pattern(&args.slots)?), Vec::new())
    } else {
        (None, parse_day_slots(&args.slots)?)
    };
    let edit = ClassEdit {
        name: args.name.clone(),
        description: args.description.clone(),
        status: args.status,
        timezone: args.timezone.as_deref().map(parse_timezone).transpose()?,
        start_date: args.start,
        end_date: args.end,
        recurrence,
        day_times,
    };

    let db = open_database(config)?;
    let current = load_class(&db, &class_id)?;
    let schedule = edit.effective_schedule(&current.class.schedule);
    let mut db = if schedule == current.class.schedule {
        db
    } else {
        let participants = roster_participants(&db.roster(&class_id)?);
        let candidate = Candidate::from_schedule(&schedule, Some(class_id.clone()));
        guard_conflicts(writer, db, &participants, &candidate, config, args.force)?
    };

    let outcome = db
        .edit_class(&class_id, &edit)
        .with_context(|| format!("failed to edit class {class_id}"))?;
    if outcome.regenerated {
        writeln!(writer, "Updated class {class_id}")?;
        writeln!(
            writer,
            "  kept {} past session(s), replaced {} upcoming with {}",
            outcome.preserved_past,
            outcome.deleted_future,
            outcome.created.len()
        )?;
    } else {
        writeln!(writer, "Updated class {class_id} (schedule unchanged)")?;
    }
    write_attendance_warning(writer, &outcome)
}

pub fn show<W: Write>(writer: &mut W, args: &ShowArgs, config: &Config) -> Result<()> {
    let class_id = ClassId::new(args.class_id.as_str())?;
    let db = open_database(config)?;
    let stored = load_class(&db, &class_id)?;

    if args.json {
        writeln!(
            writer,
            "{}",
            serde_json::to_string_pretty(&ClassView::new(&stored))?
        )?;
        return Ok(());
    }

    let class = &stored.class;
    let roster = db.roster(&class_id)?;
    let sessions = db.list_sessions(&class_id)?;
    let now = Utc::now();
    let upcoming = sessions.iter().filter(|s| !s.is_past(now)).count();
    let join = |ids: &[ParticipantId]| {
        if ids.is_empty() {
            "-".to_string()
        } else {
            ids.iter().map(ParticipantId::as_str).collect::<Vec<_>>().join(", ")
        }
    };

    writeln!(writer, "{} ({})", class.name, class.id)?;
    if let Some(description) = &class.description {
        writeln!(writer, "  {description}")?;
    }
    writeln!(writer, "  status:   {}", class.status)?;
    writeln!(writer, "  timezone: {}", class.schedule.timezone.name())?;
    writeln!(
        writer,
        "  dates:    {} to {}",
        class.schedule.start_date, class.schedule.end_date
    )?;
    writeln!(writer, "  pattern:  {}", class.schedule.recurrence)?;
    writeln!(writer, "  teachers: {}", join(&roster.teachers))?;
    writeln!(writer, "  students: {}", join(&roster.students))?;
    writeln!(
        writer,
        "  sessions: {} ({upcoming} upcoming)",
        sessions.len()
    )?;
    if !stored.defaulted_days.is_empty() {
        let days: Vec<&str> = stored.defaulted_days.iter().map(|d| weekday_label(*d)).collect();
        writeln!(
            writer,
            "  needs migration: no recorded times for {}",
            days.join(", ")
        )?;
    }
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, args: &ListArgs, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let classes = db.list_classes()?;

    if args.json {
        let views: Vec<ClassView<'_>> = classes.iter().map(ClassView::new).collect();
        writeln!(writer, "{}", serde_json::to_string_pretty(&views)?)?;
        return Ok(());
    }

    if classes.is_empty() {
        writeln!(writer, "No classes.")?;
        return Ok(());
    }
    for stored in &classes {
        let class = &stored.class;
        writeln!(
            writer,
            "{}  {}  [{}]  {} to {}  {} ({})",
            class.id,
            class.name,
            class.status,
            class.schedule.start_date,
            class.schedule.end_date,
            class.schedule.recurrence,
            class.schedule.timezone.name()
        )?;
    }
    Ok(())
}

pub fn enroll<W: Write>(writer: &mut W, args: &EnrollArgs, config: &Config) -> Result<()> {
    let class_id = ClassId::new(args.class_id.as_str())?;
    let participant_id = ParticipantId::new(args.participant_id.trim())?;

    let db = open_database(config)?;
    let stored = load_class(&db, &class_id)?;
    let candidate = Candidate::from_schedule(&stored.class.schedule, Some(class_id.clone()));
    let participants = [(participant_id.clone(), args.role)];
    let mut db = guard_conflicts(writer, db, &participants, &candidate, config, args.force)?;

    let enrollment = db.enroll(&class_id, &participant_id, args.role)?;
    writeln!(
        writer,
        "Enrolled {participant_id} as {} in {} ({} upcoming session(s))",
        enrollment.role, stored.class.name, enrollment.attendance_seeded
    )?;
    Ok(())
}

pub fn unenroll<W: Write>(writer: &mut W, args: &UnenrollArgs, config: &Config) -> Result<()> {
    let class_id = ClassId::new(args.class_id.as_str())?;
    let participant_id = ParticipantId::new(args.participant_id.trim())?;

    let mut db = open_database(config)?;
    if !db.unenroll(&class_id, &participant_id)? {
        bail!("{participant_id} is not enrolled in class {class_id}");
    }
    writeln!(writer, "Removed {participant_id} from class {class_id}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use tutor_core::FailurePolicy;

    fn config(temp: &tempfile::TempDir) -> Config {
        Config {
            database_path: temp.path().join("tutor.db"),
            conflict_policy: FailurePolicy::Open,
            default_timezone: Some("America/Toronto".to_string()),
        }
    }

    fn create_args(name: &str, slot: &str) -> CreateArgs {
        CreateArgs {
            name: name.to_string(),
            description: None,
            schedule: ScheduleArgs {
                slots: vec![slot.to_string()],
                timezone: None,
                start: NaiveDate::from_ymd_opt(2030, 4, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2030, 4, 30).unwrap(),
            },
            teachers: vec!["t1".to_string()],
            students: Vec::new(),
            force: false,
        }
    }

    fn create_algebra(config: &Config) {
        let args = create_args("Algebra", "monday=10:00-11:00");
        create(&mut std::io::sink(), &args, config).unwrap();
    }

    fn only_class(config: &Config) -> StoredClass {
        let db = open_database(config).unwrap();
        let mut classes = db.list_classes().unwrap();
        assert_eq!(classes.len(), 1);
        classes.remove(0)
    }

    fn edit_args(class_id: &ClassId) -> EditArgs {
        EditArgs {
            class_id: class_id.to_string(),
            name: None,
            description: None,
            status: None,
            timezone: None,
            start: None,
            end: None,
            slots: Vec::new(),
            replace: false,
            force: false,
        }
    }

    #[test]
    fn create_materializes_and_enrolls() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        let mut output = Vec::new();

        create(&mut output, &create_args("Algebra", "monday=10:00-11:00"), &config).unwrap();

        let stored = only_class(&config);
        let output = String::from_utf8(output).unwrap();
        let output = output.replace(stored.class.id.as_str(), "[ID]");
        assert_snapshot!(output, @r"
        Created class Algebra ([ID])
          5 sessions from 2030-04-01 to 2030-04-30 (America/Toronto)
          enrolled 1 participant(s)
        ");

        let db = open_database(&config).unwrap();
        let roster = db.roster(&stored.class.id).unwrap();
        assert_eq!(roster.teachers.len(), 1);
    }

    #[test]
    fn create_refuses_conflicts_without_force() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        create_algebra(&config);

        let mut output = Vec::new();
        let err = create(&mut output, &create_args("Geometry", "mon=10:30-11:30"), &config)
            .unwrap_err();

        assert!(err.to_string().contains("--force"));
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("t1 (teacher): 1 conflict(s)"));
        assert!(output.contains("overlaps Algebra on Monday"));

        let mut forced = create_args("Geometry", "mon=10:30-11:30");
        forced.force = true;
        create(&mut std::io::sink(), &forced, &config).unwrap();
        assert_eq!(open_database(&config).unwrap().list_classes().unwrap().len(), 2);
    }

    #[test]
    fn edit_regenerates_upcoming_sessions() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        create_algebra(&config);
        let class_id = only_class(&config).class.id;

        let mut args = edit_args(&class_id);
        args.slots = vec!["wednesday=16:00-17:00".to_string()];
        args.replace = true;
        let mut output = Vec::new();
        edit(&mut output, &args, &config).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(class_id.as_str(), "[ID]");
        assert_snapshot!(output, @r"
        Updated class [ID]
          kept 0 past session(s), replaced 5 upcoming with 4
        ");
        let stored = only_class(&config);
        assert_eq!(stored.class.schedule.recurrence.to_string(), "Wed 16:00-17:00");
    }

    #[test]
    fn edit_with_details_only_keeps_sessions() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        create_algebra(&config);
        let class_id = only_class(&config).class.id;

        let mut args = edit_args(&class_id);
        args.description = Some("Bring a calculator".to_string());
        let mut output = Vec::new();
        edit(&mut output, &args, &config).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.ends_with("(schedule unchanged)\n"));
        let stored = only_class(&config);
        assert_eq!(
            stored.class.description.as_deref(),
            Some("Bring a calculator")
        );
        let db = open_database(&config).unwrap();
        assert_eq!(db.list_sessions(&class_id).unwrap().len(), 5);
    }

    #[test]
    fn show_renders_roster_and_pattern() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        create_algebra(&config);
        let class_id = only_class(&config).class.id;
        let enroll_args = EnrollArgs {
            class_id: class_id.to_string(),
            participant_id: "s1".to_string(),
            role: Role::Student,
            force: false,
        };
        enroll(&mut std::io::sink(), &enroll_args, &config).unwrap();

        let mut output = Vec::new();
        let args = ShowArgs {
            class_id: class_id.to_string(),
            json: false,
        };
        show(&mut output, &args, &config).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(class_id.as_str(), "[ID]");
        assert_snapshot!(output, @r"
        Algebra ([ID])
          status:   active
          timezone: America/Toronto
          dates:    2030-04-01 to 2030-04-30
          pattern:  Mon 10:00-11:00
          teachers: t1
          students: s1
          sessions: 5 (5 upcoming)
        ");
    }

    #[test]
    fn list_json_includes_pattern() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        create_algebra(&config);

        let mut output = Vec::new();
        list(&mut output, &ListArgs { json: true }, &config).unwrap();

        let classes: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(classes[0]["name"], "Algebra");
        assert_eq!(classes[0]["timezone"], "America/Toronto");
        assert_eq!(classes[0]["recurrence"]["monday"]["start"], "10:00");
        assert!(classes[0]["recurrence"]["tuesday"].is_null());
    }

    #[test]
    fn unenroll_unknown_participant_fails() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        create_algebra(&config);
        let class_id = only_class(&config).class.id;

        let args = UnenrollArgs {
            class_id: class_id.to_string(),
            participant_id: "nobody".to_string(),
        };
        let err = unenroll(&mut std::io::sink(), &args, &config).unwrap_err();
        assert!(err.to_string().contains("not enrolled"));
    }
}
