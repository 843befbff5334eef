//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::attendance::AttendanceAction;
use crate::commands::availability::AvailabilityAction;
use crate::commands::check::CheckArgs;
use crate::commands::class::{
    CreateArgs, EditArgs, EnrollArgs, ListArgs, ShowArgs, UnenrollArgs,
};
use crate::commands::preview::PreviewArgs;
use crate::commands::session::SessionAction;
use crate::commands::sessions::SessionsArgs;

/// Tutoring class scheduler.
///
/// Turns weekly class patterns into dated sessions across timezones and
/// checks teachers and students for double bookings.
#[derive(Debug, Parser)]
#[command(name = "tutor", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create, edit and inspect classes.
    #[command(subcommand)]
    Class(ClassAction),

    /// List a class's sessions.
    Sessions(SessionsArgs),

    /// Show the sessions a schedule would produce, without saving anything.
    Preview(PreviewArgs),

    /// Check participants for conflicts with a proposed schedule.
    Check(CheckArgs),

    /// Manage teacher availability.
    #[command(subcommand)]
    Availability(AvailabilityAction),

    /// Record and list attendance.
    #[command(subcommand)]
    Attendance(AttendanceAction),

    /// Change a single session.
    #[command(subcommand)]
    Session(SessionAction),
}

/// Class subcommands.
#[derive(Debug, Subcommand)]
pub enum ClassAction {
    /// Create a class and materialize its sessions.
    Create(CreateArgs),

    /// Edit a class; schedule changes regenerate upcoming sessions.
    Edit(EditArgs),

    /// Show one class.
    Show(ShowArgs),

    /// List all classes.
    List(ListArgs),

    /// Add a participant to a class.
    Enroll(EnrollArgs),

    /// Remove a participant from a class.
    Unenroll(UnenrollArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_class_create() {
        let cli = Cli::try_parse_from([
            "tutor",
            "class",
            "create",
            "Algebra",
            "--slot",
            "monday=10:00-11:00",
            "--slot",
            "wed=10:00-11:00",
            "--timezone",
            "America/Toronto",
            "--start",
            "2030-04-01",
            "--end",
            "2030-06-30",
            "--teacher",
            "t1",
        ])
        .unwrap();

        let Some(Commands::Class(ClassAction::Create(args))) = cli.command else {
            panic!("expected class create");
        };
        assert_eq!(args.name, "Algebra");
        assert_eq!(args.schedule.slots.len(), 2);
        assert_eq!(args.teachers, vec!["t1".to_string()]);
        assert!(!args.force);
    }

    #[test]
    fn replace_requires_slots() {
        let result = Cli::try_parse_from(["tutor", "class", "edit", "abc", "--replace"]);
        assert!(result.is_err());
    }

    #[test]
    fn enroll_role_defaults_to_student() {
        let cli = Cli::try_parse_from(["tutor", "class", "enroll", "abc", "s1"]).unwrap();
        let Some(Commands::Class(ClassAction::Enroll(args))) = cli.command else {
            panic!("expected class enroll");
        };
        assert_eq!(args.role, tutor_core::Role::Student);
    }

    #[test]
    fn attendance_status_is_validated() {
        let result =
            Cli::try_parse_from(["tutor", "attendance", "mark", "sess", "s1", "sleeping"]);
        assert!(result.is_err());
    }
}
