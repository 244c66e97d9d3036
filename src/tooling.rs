//! Tooling Layer
//!
//! Command-line interface, terminal formatting and watch mode on top of the
//! runtime.

pub mod cli;
pub mod format;
pub mod watch;

pub use cli::{Cli, CliContext, Commands};
pub use watch::{WatchConfig, WatchDaemon};
