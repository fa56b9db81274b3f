//! Command-line interface for evalforge.
//!
//! Provides the worker loop plus commands to submit jobs and inspect or
//! cancel runs.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
