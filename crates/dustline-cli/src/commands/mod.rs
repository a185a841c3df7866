//! Command implementations for the CLI.

mod config;
mod simulation;
mod status;
mod watch;

pub use config::cmd_config;
pub use simulation::cmd_simulation;
pub use status::{StatusReport, cmd_status};
pub use watch::{WatchArgs, cmd_watch};
