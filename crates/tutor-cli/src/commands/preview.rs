//! Preview command: materialize a schedule without saving it.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use tutor_core::materialize_schedule;

use crate::Config;
use crate::commands::util::{ScheduleArgs, format_local_span};

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub schedule: ScheduleArgs,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &PreviewArgs, config: &Config) -> Result<()> {
    let schedule = args.schedule.schedule(config)?;
    let sessions = materialize_schedule(&schedule, None)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&sessions)?)?;
        return Ok(());
    }

    for session in &sessions {
        writeln!(
            writer,
            "{}  [{}-{} UTC]",
            format_local_span(session.start, session.end, schedule.timezone),
            session.start.format("%H:%M"),
            session.end.format("%H:%M"),
        )?;
    }
    writeln!(
        writer,
        "{} sessions in {}",
        sessions.len(),
        schedule.timezone.name()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use insta::assert_snapshot;
    use tutor_core::FailurePolicy;

    fn config() -> Config {
        Config {
            database_path: "unused.db".into(),
            conflict_policy: FailurePolicy::Open,
            default_timezone: Some("UTC".to_string()),
        }
    }

    fn args(
        slots: &[&str],
        timezone: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PreviewArgs {
        PreviewArgs {
            schedule: ScheduleArgs {
                slots: slots.iter().map(ToString::to_string).collect(),
                timezone: timezone.map(str::to_string),
                start,
                end,
            },
            json: false,
        }
    }

    #[test]
    fn preview_follows_daylight_saving() {
        let args = args(
            &["monday=10:00-11:00"],
            Some("America/Toronto"),
            NaiveDate::from_ymd_opt(2030, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2030, 3, 31).unwrap(),
        );
        let mut output = Vec::new();

        run(&mut output, &args, &config()).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        2030-03-04 Mon 10:00-11:00  [15:00-16:00 UTC]
        2030-03-11 Mon 10:00-11:00  [14:00-15:00 UTC]
        2030-03-18 Mon 10:00-11:00  [14:00-15:00 UTC]
        2030-03-25 Mon 10:00-11:00  [14:00-15:00 UTC]
        4 sessions in America/Toronto
        ");
    }

    #[test]
    fn preview_uses_configured_timezone() {
        let args = args(
            &["fri=22:00-00:00"],
            None,
            NaiveDate::from_ymd_opt(2030, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2030, 3, 7).unwrap(),
        );
        let mut output = Vec::new();

        run(&mut output, &args, &config()).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        2030-03-01 Fri 22:00-00:00  [22:00-00:00 UTC]
        1 sessions in UTC
        ");
    }

    #[test]
    fn preview_rejects_inverted_range() {
        let args = args(
            &["monday=10:00-11:00"],
            None,
            NaiveDate::from_ymd_opt(2030, 3, 31).unwrap(),
            NaiveDate::from_ymd_opt(2030, 3, 1).unwrap(),
        );
        let mut output = Vec::new();

        let err = run(&mut output, &args, &config()).unwrap_err();
        assert!(err.to_string().contains("invalid date range"));
    }
}
