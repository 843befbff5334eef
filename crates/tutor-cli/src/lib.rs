//! Tutoring scheduler CLI library.
//!
//! This crate provides the `tutor` command-line interface on top of
//! `tutor-core` and `tutor-db`.

mod cli;
pub mod commands;
mod config;

pub use cli::{ClassAction, Cli, Commands};
pub use config::Config;
