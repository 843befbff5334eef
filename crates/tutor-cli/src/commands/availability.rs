//! Availability commands: a teacher's weekly free time, in UTC.

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use tutor_core::{AvailabilityWindow, ParticipantId, weekday_label};

use crate::Config;
use crate::commands::util::{open_database, parse_day_slot};

#[derive(Debug, Subcommand)]
pub enum AvailabilityAction {
    /// Replace a teacher's weekly availability.
    Set(SetArgs),
    /// Show a teacher's weekly availability.
    Show(TeacherArgs),
    /// Remove a teacher's availability entirely.
    Clear(TeacherArgs),
}

#[derive(Debug, Args)]
pub struct SetArgs {
    pub teacher_id: String,

    /// UTC window, repeatable; a day may have several.
    #[arg(long = "slot", value_name = "DAY=HH:MM-HH:MM")]
    pub slots: Vec<String>,
}

#[derive(Debug, Args)]
pub struct TeacherArgs {
    pub teacher_id: String,
}

pub fn run<W: Write>(writer: &mut W, action: &AvailabilityAction, config: &Config) -> Result<()> {
    match action {
        AvailabilityAction::Set(args) => set(writer, args, config),
        AvailabilityAction::Show(args) => show(writer, args, config),
        AvailabilityAction::Clear(args) => clear(writer, args, config),
    }
}

fn set<W: Write>(writer: &mut W, args: &SetArgs, config: &Config) -> Result<()> {
    let teacher_id = ParticipantId::new(args.teacher_id.trim())?;
    let mut window = AvailabilityWindow::new();
    for value in &args.slots {
        let (day, slot) = parse_day_slot(value)?;
        window.add(day, slot);
    }

    let mut db = open_database(config)?;
    let count = db.set_availability(&teacher_id, &window)?;
    if count == 0 {
        writeln!(
            writer,
            "Availability for {teacher_id} set with no windows; every class will conflict"
        )?;
    } else {
        writeln!(writer, "Availability for {teacher_id} set ({count} window(s))")?;
    }
    Ok(())
}

fn show<W: Write>(writer: &mut W, args: &TeacherArgs, config: &Config) -> Result<()> {
    let teacher_id = ParticipantId::new(args.teacher_id.trim())?;
    let db = open_database(config)?;
    let Some(window) = db.availability(&teacher_id)? else {
        writeln!(writer, "No availability set for {teacher_id}")?;
        return Ok(());
    };

    writeln!(writer, "Availability for {teacher_id} (UTC):")?;
    let mut any = false;
    for (day, slot) in window.iter() {
        writeln!(writer, "  {:<9}  {slot}", weekday_label(day))?;
        any = true;
    }
    if !any {
        writeln!(writer, "  (none)")?;
    }
    Ok(())
}

fn clear<W: Write>(writer: &mut W, args: &TeacherArgs, config: &Config) -> Result<()> {
    let teacher_id = ParticipantId::new(args.teacher_id.trim())?;
    let mut db = open_database(config)?;
    if db.clear_availability(&teacher_id)? {
        writeln!(writer, "Cleared availability for {teacher_id}")?;
    } else {
        writeln!(writer, "No availability set for {teacher_id}")?;
    }
    Ok(())
}
