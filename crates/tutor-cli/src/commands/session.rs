//! Session commands: lifecycle changes to a single session.

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use tutor_core::{SessionId, SessionStatus};

use crate::Config;
use crate::commands::util::open_database;

#[derive(Debug, Subcommand)]
pub enum SessionAction {
    /// Set a session's status (scheduled, completed or cancelled).
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    pub session_id: String,
    pub status: SessionStatus,
}

pub fn run<W: Write>(writer: &mut W, action: &SessionAction, config: &Config) -> Result<()> {
    match action {
        SessionAction::Status(args) => status(writer, args, config),
    }
}

fn status<W: Write>(writer: &mut W, args: &StatusArgs, config: &Config) -> Result<()> {
    let session_id = SessionId::new(args.session_id.as_str())?;
    let mut db = open_database(config)?;
    db.set_session_status(&session_id, args.status)?;
    writeln!(writer, "Session {session_id} is now {}", args.status)?;
    Ok(())
}
