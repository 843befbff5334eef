//! CLI subcommand implementations.

pub mod attendance;
pub mod availability;
pub mod check;
pub mod class;
pub mod preview;
pub mod session;
pub mod sessions;
pub mod util;
