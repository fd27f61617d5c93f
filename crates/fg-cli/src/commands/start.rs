//! Start command: runs a focus session in the foreground.
//!
//! The session blocks every active site, then waits for one of:
//! - the countdown expiring (the session is recorded as completed)
//! - `done` on stdin (stopped early, recorded as completed)
//! - `abort` on stdin or Ctrl-C (stopped early, recorded as not completed)
//!
//! A progress line is printed every progress interval. `status` prints the
//! session details and `status --json` prints them as one JSON line.
//! Closing stdin leaves the session running until it expires. If the process
//! is killed mid-session, `fg unblock` restores the hosts file.
//!
//! Only one `fg start` runs at a time: the session lock next to the database
//! is held for the whole session.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use fg_core::{
    BlockList, ClockError, EnforcementCoordinator, FinishedSession, FocusError, SessionClock,
    SessionStatus, SiteStore, StopOutcome,
};
use fg_db::Database;
use fs2::FileExt;

use super::open_database;
use super::util::format_clock;
use crate::Config;

/// Interval between progress lines in the foreground session.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(60);

/// File name of the lock that keeps two sessions from sharing a hosts file.
const SESSION_LOCK: &str = "session.lock";

/// Events the foreground loop reacts to.
enum Signal {
    Line(String),
    InputClosed,
    Interrupted,
    Expired(StopReport),
}

/// Aborts the running session from another thread, e.g. a Ctrl-C handler.
#[derive(Clone)]
pub struct InterruptHandle(Sender<Signal>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        // Nothing to abort once the foreground loop has returned.
        let _ = self.0.send(Signal::Interrupted);
    }
}

/// Owned summary of a [`StopOutcome`], sendable from the countdown thread.
#[derive(Debug)]
struct StopReport {
    session: FinishedSession,
    warnings: Vec<String>,
}

impl From<&StopOutcome> for StopReport {
    fn from(outcome: &StopOutcome) -> Self {
        let mut warnings = Vec::new();
        if let Some(err) = &outcome.unblock_error {
            warnings.push(format!("could not clear block list: {err}"));
        }
        if let Some(err) = &outcome.save_error {
            warnings.push(format!("session was not saved: {err}"));
        }
        Self {
            session: outcome.session.clone(),
            warnings,
        }
    }
}

/// Session length and mode chosen from arguments and config.
fn resolve_plan(minutes: Option<u64>, mode: Option<&str>, config: &Config) -> Result<(u64, String)> {
    let mode = mode.unwrap_or(&config.default_mode).trim().to_string();
    if mode.is_empty() {
        bail!("mode cannot be empty");
    }
    let minutes = match (minutes, config.minutes_for(&mode)) {
        (Some(minutes), _) | (None, Some(minutes)) => minutes,
        (None, None) => bail!(
            "unknown mode '{mode}'; pass --minutes or add it to [modes] in the config file"
        ),
    };
    Ok((minutes, mode))
}

fn session_lock_path(config: &Config) -> PathBuf {
    config
        .database_path
        .parent()
        .map_or_else(|| PathBuf::from(SESSION_LOCK), |dir| dir.join(SESSION_LOCK))
}

/// Takes the exclusive session lock; released when the file is dropped.
fn acquire_session_lock(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            Err(FocusError::from(ClockError::AlreadyActive))
                .with_context(|| format!("another fg session holds {}", path.display()))
        }
        Err(err) => Err(err).context("failed to lock session file"),
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    minutes: Option<u64>,
    mode: Option<&str>,
    config: &Config,
) -> Result<()> {
    let (minutes, mode) = resolve_plan(minutes, mode, config)?;
    let db: Arc<Database> = Arc::new(open_database(config)?);
    let _session_lock = acquire_session_lock(&session_lock_path(config))?;
    let coordinator = EnforcementCoordinator::new(
        Arc::new(SessionClock::new()),
        Arc::new(BlockList::new(&config.hosts_path)),
        Arc::clone(&db) as Arc<dyn fg_core::RecordStore>,
    );

    run_session(
        writer,
        &coordinator,
        db.as_ref(),
        minutes,
        &mode,
        BufReader::new(io::stdin()),
        PROGRESS_INTERVAL,
        |handle| {
            ctrlc::set_handler(move || handle.interrupt())
                .context("failed to install Ctrl-C handler")
        },
    )
}

/// Drives one session to its end, reading commands from `input`.
///
/// `on_interrupt` receives a handle that aborts the session; it runs before
/// anything is blocked.
#[allow(clippy::too_many_arguments)]
pub fn run_session<W, R, F>(
    writer: &mut W,
    coordinator: &EnforcementCoordinator,
    sites: &dyn SiteStore,
    minutes: u64,
    mode: &str,
    input: R,
    progress_interval: Duration,
    on_interrupt: F,
) -> Result<()>
where
    W: Write,
    R: BufRead + Send + 'static,
    F: FnOnce(InterruptHandle) -> Result<()>,
{
    let (tx, rx) = mpsc::channel();
    on_interrupt(InterruptHandle(tx.clone()))?;
    let expired_tx = tx.clone();
    coordinator.set_expiry_listener(move |outcome| {
        // The receiver is gone once the foreground loop has returned.
        let _ = expired_tx.send(Signal::Expired(StopReport::from(outcome)));
    });

    let started = coordinator
        .start_with_sites(minutes, mode, sites)
        .context("failed to start focus session")?;
    let blocked = coordinator.block_list().blocked_sites().unwrap_or_default();
    writeln!(
        writer,
        "Focus session started: {} for {} min, blocking {} site(s)",
        started.mode,
        minutes,
        blocked.len()
    )?;
    writeln!(writer, "Commands: done, abort, status, status --json")?;
    spawn_input_reader(input, tx).context("failed to read commands from stdin")?;

    loop {
        match rx.recv_timeout(progress_interval) {
            Ok(Signal::Expired(report)) => {
                writeln!(writer, "Time's up!")?;
                write_report(writer, &report)?;
                return Ok(());
            }
            Ok(Signal::Line(line)) => match line.trim() {
                "" => {}
                "status" => write_status(writer, &coordinator.status())?,
                "status --json" => {
                    writeln!(writer, "{}", serde_json::to_string(&coordinator.status())?)?;
                }
                command @ ("done" | "abort") => {
                    if stop_session(writer, coordinator, command == "done")? {
                        return Ok(());
                    }
                }
                other => writeln!(
                    writer,
                    "Unknown command: {other} (expected done, abort or status)"
                )?,
            },
            Ok(Signal::Interrupted) => {
                writeln!(writer, "Interrupted.")?;
                if stop_session(writer, coordinator, false)? {
                    return Ok(());
                }
            }
            Ok(Signal::InputClosed) => {
                tracing::debug!("stdin closed; waiting for the session to expire");
            }
            Err(RecvTimeoutError::Timeout) => write_progress(writer, &coordinator.status())?,
            Err(RecvTimeoutError::Disconnected) => bail!("session event channel closed"),
        }
    }
}

/// Stops the session and prints the report. Returns `false` when the session
/// already expired and its expiry signal is still on the way.
fn stop_session<W: Write>(
    writer: &mut W,
    coordinator: &EnforcementCoordinator,
    mark_completed: bool,
) -> Result<bool> {
    match coordinator.stop(mark_completed) {
        Ok(outcome) => {
            write_report(writer, &StopReport::from(&outcome))?;
            Ok(true)
        }
        Err(FocusError::Clock(ClockError::NoActiveSession)) => Ok(false),
        Err(err) => Err(err).context("failed to stop focus session"),
    }
}

fn spawn_input_reader<R>(input: R, tx: Sender<Signal>) -> io::Result<()>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else { break };
                if tx.send(Signal::Line(line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(Signal::InputClosed);
        })?;
    Ok(())
}

fn write_progress<W: Write>(writer: &mut W, status: &SessionStatus) -> io::Result<()> {
    match &status.session {
        Some(active) => writeln!(
            writer,
            "[{}] {} remaining ({:.0}%)",
            active.mode,
            format_clock(active.remaining_seconds),
            active.progress_percent
        ),
        None => Ok(()),
    }
}

fn write_status<W: Write>(writer: &mut W, status: &SessionStatus) -> io::Result<()> {
    let Some(active) = &status.session else {
        return writeln!(writer, "No active session.");
    };
    writeln!(writer, "Session {} ({})", active.session_id, active.mode)?;
    writeln!(
        writer,
        "Started {}, planned {} min",
        active.started_at.to_rfc3339(),
        active.planned_duration_seconds / 60
    )?;
    write_progress(writer, status)
}

fn write_report<W: Write>(writer: &mut W, report: &StopReport) -> io::Result<()> {
    let session = &report.session;
    let verdict = if session.completed {
        "completed"
    } else {
        "aborted"
    };
    writeln!(
        writer,
        "Session {verdict}: {:.2} of {} min ({})",
        session.completed_minutes,
        session.planned_duration_seconds / 60,
        session.mode
    )?;
    for warning in &report.warnings {
        writeln!(writer, "Warning: {warning}")?;
    }
    Ok(())
}
