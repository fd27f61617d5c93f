//! Stats command for focus statistics.
//!
//! Implements `fg stats overview|daily|streaks|history`, each with a
//! human-readable table and a `--json` form.

use std::fmt::{Display, Write as _};
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use fg_core::{Analytics, DailyStat, Overview, SessionRecord, Streaks};
use serde::Serialize;

use super::open_database;
use crate::{Config, StatsAction};

// ========== Human-Readable Output ==========

/// Format the overview for human-readable output.
pub fn format_overview(overview: &Overview) -> String {
    let mut output = String::new();

    writeln!(output, "FOCUS OVERVIEW (last {} days)", overview.period_days).unwrap();
    writeln!(output).unwrap();
    writeln!(
        output,
        "Sessions:        {} ({} completed, {:.1}%)",
        overview.total_sessions, overview.completed_sessions, overview.completion_rate_percent
    )
    .unwrap();
    writeln!(output, "Focus time:      {:.2} min", overview.total_minutes).unwrap();
    writeln!(
        output,
        "Average session: {:.2} min",
        overview.average_session_minutes
    )
    .unwrap();
    writeln!(output, "Block attempts:  {}", overview.block_attempts).unwrap();

    output
}

/// Format the per-day breakdown for human-readable output.
pub fn format_daily(days: &[DailyStat], window_days: u32) -> String {
    let mut output = String::new();

    writeln!(output, "DAILY FOCUS (last {window_days} days)").unwrap();
    writeln!(output).unwrap();

    if days.is_empty() {
        writeln!(output, "No sessions in this period.").unwrap();
        return output;
    }

    writeln!(output, "{:<10}  {:>8}  {:>8}", "Date", "Sessions", "Minutes").unwrap();
    writeln!(output, "──────────  ────────  ────────").unwrap();
    for day in days {
        writeln!(
            output,
            "{:<10}  {:>8}  {:>8.2}",
            day.date.format("%Y-%m-%d").to_string(),
            day.sessions,
            day.minutes
        )
        .unwrap();
    }

    output
}

pub fn format_streaks(streaks: &Streaks) -> String {
    let mut output = String::new();
    writeln!(output, "Current streak:     {} day(s)", streaks.current).unwrap();
    writeln!(output, "Best streak:        {} day(s)", streaks.best).unwrap();
    writeln!(output, "Completed sessions: {}", streaks.total).unwrap();
    output
}

/// Format session history with start times shown in `tz`.
pub fn format_history<Tz>(sessions: &[SessionRecord], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut output = String::new();

    if sessions.is_empty() {
        writeln!(output, "No sessions recorded yet.").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "Hint: Run 'fg start' to begin a focus session.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<16}  {:<12}  {:>7}  {:>7}  Result",
        "Started", "Mode", "Planned", "Minutes"
    )
    .unwrap();
    writeln!(
        output,
        "────────────────  ────────────  ───────  ───────  ─────────"
    )
    .unwrap();
    for session in sessions {
        writeln!(
            output,
            "{:<16}  {:<12}  {:>7}  {:>7.2}  {}",
            session
                .started_at
                .with_timezone(tz)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            session.mode,
            session.planned_duration_seconds / 60,
            session.completed_minutes,
            if session.completed {
                "completed"
            } else {
                "aborted"
            }
        )
        .unwrap();
    }

    output
}

// ========== JSON Output ==========

#[derive(Debug, Serialize)]
struct JsonDaily<'a> {
    period_days: u32,
    days: &'a [DailyStat],
}

#[derive(Debug, Serialize)]
struct JsonHistory<'a> {
    sessions: &'a [SessionRecord],
}

// ========== Public Interface ==========

/// Runs the stats command.
pub fn run<W: Write>(writer: &mut W, action: &StatsAction, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let analytics = Analytics::new(&db);

    match action {
        StatsAction::Overview { days, json } => {
            let overview = analytics
                .overview(*days)
                .context("failed to compute overview")?;
            if *json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&overview)?)?;
            } else {
                write!(writer, "{}", format_overview(&overview))?;
            }
        }
        StatsAction::Daily { days, json } => {
            let daily = analytics
                .daily_breakdown(*days)
                .context("failed to compute daily breakdown")?;
            if *json {
                let payload = JsonDaily {
                    period_days: *days,
                    days: &daily,
                };
                writeln!(writer, "{}", serde_json::to_string_pretty(&payload)?)?;
            } else {
                write!(writer, "{}", format_daily(&daily, *days))?;
            }
        }
        StatsAction::Streaks { json } => {
            let streaks = analytics.streaks().context("failed to compute streaks")?;
            if *json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&streaks)?)?;
            } else {
                write!(writer, "{}", format_streaks(&streaks))?;
            }
        }
        StatsAction::History { limit, json } => {
            let sessions = analytics
                .history(*limit)
                .context("failed to load session history")?;
            if *json {
                let payload = JsonHistory {
                    sessions: &sessions,
                };
                writeln!(writer, "{}", serde_json::to_string_pretty(&payload)?)?;
            } else {
                write!(writer, "{}", format_history(&sessions, &Local))?;
            }
        }
    }

    Ok(())
}
