use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tutor_cli::commands::{attendance, availability, check, class, preview, session, sessions};
use tutor_cli::{ClassAction, Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut out = io::stdout().lock();
    match command {
        Commands::Class(action) => match action {
            ClassAction::Create(args) => class::create(&mut out, args, &config)?,
            ClassAction::Edit(args) => class::edit(&mut out, args, &config)?,
            ClassAction::Show(args) => class::show(&mut out, args, &config)?,
            ClassAction::List(args) => class::list(&mut out, args, &config)?,
            ClassAction::Enroll(args) => class::enroll(&mut out, args, &config)?,
            ClassAction::Unenroll(args) => class::unenroll(&mut out, args, &config)?,
        },
        Commands::Sessions(args) => sessions::run(&mut out, args, &config)?,
        Commands::Preview(args) => preview::run(&mut out, args, &config)?,
        Commands::Check(args) => check::run(&mut out, args, &config)?,
        Commands::Availability(action) => availability::run(&mut out, action, &config)?,
        Commands::Attendance(action) => attendance::run(&mut out, action, &config)?,
        Commands::Session(action) => session::run(&mut out, action, &config)?,
    }

    Ok(())
}
