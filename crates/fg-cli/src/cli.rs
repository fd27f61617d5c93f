//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Focus session timer.
///
/// Blocks distracting sites through the hosts file while a session runs and
/// keeps a history of finished sessions for streaks and statistics.
#[derive(Debug, Parser)]
#[command(name = "fg", version, about, long_about = None)]
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
    /// Run a focus session in the foreground.
    ///
    /// Type `done`, `abort` or `status` on stdin while the session runs.
    Start {
        /// Session length in minutes. Defaults to the mode's configured length.
        #[arg(short, long)]
        minutes: Option<u64>,

        /// Session mode (e.g., pomodoro, deepwork).
        #[arg(long)]
        mode: Option<String>,
    },

    /// Show whether the hosts file currently blocks any sites.
    Status,

    /// Remove the block region from the hosts file.
    Unblock,

    /// Manage the sites blocked during sessions.
    #[command(subcommand)]
    Sites(SitesAction),

    /// Record an attempt to visit a blocked site.
    Attempt {
        /// The site that was visited.
        url: String,
    },

    /// Show focus statistics.
    #[command(subcommand)]
    Stats(StatsAction),
}

/// Block list management.
#[derive(Debug, Subcommand)]
pub enum SitesAction {
    /// List all sites.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Add a site.
    Add {
        /// Domain or URL to block (e.g., reddit.com).
        url: String,

        /// Category label.
        #[arg(long, default_value = "custom")]
        category: String,
    },
    /// Remove a site by ID.
    Remove { id: i64 },
    /// Include a site in future sessions.
    Enable { id: i64 },
    /// Exclude a site from future sessions without removing it.
    Disable { id: i64 },
}

/// Statistics views.
#[derive(Debug, Subcommand)]
pub enum StatsAction {
    /// Totals for the last N days.
    Overview {
        #[arg(long, default_value_t = 7)]
        days: u32,

        #[arg(long)]
        json: bool,
    },
    /// Sessions and minutes per day.
    Daily {
        #[arg(long, default_value_t = 30)]
        days: u32,

        #[arg(long)]
        json: bool,
    },
    /// Current and best streaks of focused days.
    Streaks {
        #[arg(long)]
        json: bool,
    },
    /// Most recent sessions.
    History {
        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },
}
