//! Shared utilities for CLI commands.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use clap::Args;
use tutor_core::time_codec::instant_to_local_datetime;
use tutor_core::{
    ClassSchedule, ParticipantId, RecurrencePattern, Role, TimeSlot, parse_timezone,
    parse_weekday, weekday_label,
};
use tutor_db::Database;

use crate::Config;

/// A weekly schedule given on the command line.
#[derive(Debug, Clone, Args)]
pub struct ScheduleArgs {
    /// Weekly slot, repeatable (e.g. `monday=09:00-10:00`).
    #[arg(long = "slot", value_name = "DAY=HH:MM-HH:MM", required = true)]
    pub slots: Vec<String>,

    /// IANA timezone the slots are in. Defaults to the configured zone.
    #[arg(long)]
    pub timezone: Option<String>,

    /// First date (YYYY-MM-DD).
    #[arg(long)]
    pub start: NaiveDate,

    /// Last date, inclusive (YYYY-MM-DD).
    #[arg(long)]
    pub end: NaiveDate,
}

impl ScheduleArgs {
    pub fn schedule(&self, config: &Config) -> Result<ClassSchedule> {
        let schedule = ClassSchedule {
            timezone: resolve_timezone(self.timezone.as_deref(), config)?,
            start_date: self.start,
            end_date: self.end,
            recurrence: build_pattern(&self.slots)?,
        };
        schedule.validate()?;
        Ok(schedule)
    }
}

/// Parses `DAY=HH:MM-HH:MM`.
pub fn parse_day_slot(value: &str) -> Result<(Weekday, TimeSlot)> {
    let Some((day, times)) = value.split_once('=') else {
        bail!("invalid slot {value:?}: expected DAY=HH:MM-HH:MM");
    };
    let day = parse_weekday(day.trim())?;
    let slot: TimeSlot = times
        .trim()
        .parse()
        .with_context(|| format!("invalid slot {value:?}"))?;
    Ok((day, slot))
}

/// Parses every slot, rejecting a day given twice.
pub fn parse_day_slots(values: &[String]) -> Result<Vec<(Weekday, TimeSlot)>> {
    let mut slots: Vec<(Weekday, TimeSlot)> = Vec::with_capacity(values.len());
    for value in values {
        let (day, slot) = parse_day_slot(value)?;
        if slots.iter().any(|(seen, _)| *seen == day) {
            bail!("{} given more than once", weekday_label(day));
        }
        slots.push((day, slot));
    }
    Ok(slots)
}

pub fn build_pattern(values: &[String]) -> Result<RecurrencePattern> {
    Ok(RecurrencePattern::new().overlay(&parse_day_slots(values)?))
}

pub fn resolve_timezone(name: Option<&str>, config: &Config) -> Result<Tz> {
    match name {
        Some(name) => Ok(parse_timezone(name)?),
        None => Ok(config.timezone()?),
    }
}

/// Teachers then students, as conflict-check participants.
pub fn participants(
    teachers: &[String],
    students: &[String],
) -> Result<Vec<(ParticipantId, Role)>> {
    let mut participants = Vec::with_capacity(teachers.len() + students.len());
    for id in teachers {
        participants.push((ParticipantId::new(id.trim())?, Role::Teacher));
    }
    for id in students {
        participants.push((ParticipantId::new(id.trim())?, Role::Student));
    }
    Ok(participants)
}

/// Opens the configured database, creating its parent directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// `2030-03-04 Mon 10:00-11:00` in the given zone.
pub fn format_local_span(start: DateTime<Utc>, end: DateTime<Utc>, tz: Tz) -> String {
    let start = instant_to_local_datetime(start, tz);
    let end = instant_to_local_datetime(end, tz);
    format!(
        "{}-{}",
        start.format("%Y-%m-%d %a %H:%M"),
        end.format("%H:%M")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_day_slot_accepts_names_and_abbreviations() {
        let (day, slot) = parse_day_slot("monday=09:00-10:30").unwrap();
        assert_eq!(day, Weekday::Mon);
        assert_eq!(slot.to_string(), "09:00-10:30");

        let (day, _) = parse_day_slot("Fri=22:00-00:00").unwrap();
        assert_eq!(day, Weekday::Fri);
    }

    #[test]
    fn parse_day_slot_rejects_malformed_values() {
        assert!(parse_day_slot("monday").is_err());
        assert!(parse_day_slot("someday=09:00-10:00").is_err());
        assert!(parse_day_slot("monday=10:00-09:00").is_err());
    }

    #[test]
    fn duplicate_days_are_rejected() {
        let values = vec![
            "monday=09:00-10:00".to_string(),
            "mon=11:00-12:00".to_string(),
        ];
        let err = parse_day_slots(&values).unwrap_err();
        assert_eq!(err.to_string(), "Monday given more than once");
    }

    #[test]
    fn participants_keep_teachers_first() {
        let teachers = vec!["t1".to_string()];
        let students = vec!["s1".to_string(), "s2".to_string()];
        let participants = participants(&teachers, &students).unwrap();
        let roles: Vec<Role> = participants.iter().map(|(_, role)| *role).collect();
        assert_eq!(roles, vec![Role::Teacher, Role::Student, Role::Student]);
    }
}
