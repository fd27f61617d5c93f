//! FocusGuard CLI library.
//!
//! This crate provides the `fg` command-line interface: argument parsing,
//! configuration and the subcommand implementations.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, SitesAction, StatsAction};
pub use config::Config;
