//! Sessions command: list a class's materialized sessions.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use tutor_core::ClassId;

use crate::Config;
use crate::commands::util::{format_local_span, open_database};

#[derive(Debug, Args)]
pub struct SessionsArgs {
    pub class_id: String,

    /// Only sessions that have not ended yet.
    #[arg(long)]
    pub upcoming: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &SessionsArgs, config: &Config) -> Result<()> {
    let class_id = ClassId::new(args.class_id.as_str())?;
    let db = open_database(config)?;
    let stored = db
        .get_class(&class_id)?
        .with_context(|| format!("class not found: {class_id}"))?;

    let now = Utc::now();
    let mut sessions = db.list_sessions(&class_id)?;
    if args.upcoming {
        sessions.retain(|session| !session.is_past(now));
    }

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&sessions)?)?;
        return Ok(());
    }

    let tz = stored.class.schedule.timezone;
    for session in &sessions {
        writeln!(
            writer,
            "{}  [{} UTC]  {:<9}  {}",
            format_local_span(session.start, session.end, tz),
            session.start.format("%H:%M"),
            session.status.as_str(),
            session.id
        )?;
    }
    writeln!(
        writer,
        "{} sessions for {} ({})",
        sessions.len(),
        stored.class.name,
        tz.name()
    )?;
    Ok(())
}
