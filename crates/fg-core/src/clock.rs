//! Session state machine with a background countdown.
//!
//! The clock has two states, idle and active. All session state lives in one
//! mutex-guarded slot; every operation is a single critical section and the
//! active session is taken out of the slot whole when it ends.
//!
//! ## Countdown
//!
//! Each start spawns one countdown thread. It waits on a cancellation channel
//! with a one-tick timeout, so a stop wakes it immediately. Before every
//! decrement it re-checks under the lock that the slot still holds the session
//! it was armed for; a stopped (or replaced) session is never touched again.
//!
//! ```text
//! Idle --start--> Active --stop / expiry--> Idle
//! ```

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::session::{
    ActiveStatus, FinishedSession, SessionId, SessionStatus, StartedSession, elapsed_minutes,
    progress_percent,
};

/// Countdown granularity.
pub const TICK: Duration = Duration::from_secs(1);

/// Clock state errors.
#[derive(Debug, Error)]
pub enum ClockError {
    /// A start was requested while a session is running.
    #[error("a focus session is already active")]
    AlreadyActive,
    /// A stop was requested while idle.
    #[error("no focus session is active")]
    NoActiveSession,
    /// The countdown thread could not be spawned.
    #[error("failed to spawn countdown thread")]
    Countdown(#[source] std::io::Error),
}

struct ActiveSession {
    id: SessionId,
    mode: String,
    planned_duration_seconds: u64,
    remaining_seconds: u64,
    started_at: DateTime<Utc>,
    // Dropped with the session, which disconnects the countdown's receiver.
    _cancel: Sender<()>,
}

impl ActiveSession {
    fn finish(self, completed: bool, ended_at: DateTime<Utc>) -> FinishedSession {
        FinishedSession {
            session_id: self.id,
            completed,
            completed_minutes: elapsed_minutes(self.started_at, ended_at),
            planned_duration_seconds: self.planned_duration_seconds,
            started_at: self.started_at,
            ended_at,
            mode: self.mode,
        }
    }

    fn status(&self) -> ActiveStatus {
        ActiveStatus {
            session_id: self.id,
            mode: self.mode.clone(),
            remaining_seconds: self.remaining_seconds,
            planned_duration_seconds: self.planned_duration_seconds,
            progress_percent: progress_percent(
                self.planned_duration_seconds,
                self.remaining_seconds,
            ),
            started_at: self.started_at,
        }
    }
}

type Slot = Arc<Mutex<Option<ActiveSession>>>;

fn lock(slot: &Mutex<Option<ActiveSession>>) -> MutexGuard<'_, Option<ActiveSession>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the single active focus session, if any.
pub struct SessionClock {
    slot: Slot,
    tick: Duration,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClock")
            .field("active", &self.is_active())
            .field("tick", &self.tick)
            .finish()
    }
}

impl SessionClock {
    /// Creates an idle clock counting down once per second.
    pub fn new() -> Self {
        Self::with_tick(TICK)
    }

    /// Creates an idle clock with a custom countdown interval.
    ///
    /// Elapsed time is still measured on the wall clock; only the countdown
    /// speed changes.
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            tick,
        }
    }

    /// Starts a session and arms its countdown.
    ///
    /// `on_expire` runs on the countdown thread, outside the clock lock, if the
    /// session runs out without being stopped first.
    pub fn start<F>(
        &self,
        duration_seconds: u64,
        mode: &str,
        on_expire: F,
    ) -> Result<StartedSession, ClockError>
    where
        F: FnOnce(FinishedSession) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let started = {
            let mut slot = lock(&self.slot);
            if slot.is_some() {
                return Err(ClockError::AlreadyActive);
            }
            let session = ActiveSession {
                id: SessionId::new(),
                mode: mode.to_string(),
                planned_duration_seconds: duration_seconds,
                remaining_seconds: duration_seconds,
                started_at: Utc::now(),
                _cancel: cancel_tx,
            };
            let started = StartedSession {
                session_id: session.id,
                mode: session.mode.clone(),
                planned_duration_seconds: duration_seconds,
                started_at: session.started_at,
            };
            *slot = Some(session);
            started
        };

        let slot = Arc::clone(&self.slot);
        let tick = self.tick;
        let id = started.session_id;
        let spawned = thread::Builder::new()
            .name("focus-countdown".to_string())
            .spawn(move || run_countdown(&slot, id, &cancel_rx, tick, on_expire));
        if let Err(err) = spawned {
            lock(&self.slot).take();
            return Err(ClockError::Countdown(err));
        }

        tracing::debug!(session_id = %id, duration_seconds, mode, "session clock started");
        Ok(started)
    }

    /// Stops the active session and returns it.
    pub fn stop(&self, mark_completed: bool) -> Result<FinishedSession, ClockError> {
        let active = lock(&self.slot)
            .take()
            .ok_or(ClockError::NoActiveSession)?;
        let finished = active.finish(mark_completed, Utc::now());
        tracing::debug!(
            session_id = %finished.session_id,
            completed = finished.completed,
            "session clock stopped"
        );
        Ok(finished)
    }

    /// Reads the current state without changing it.
    pub fn status(&self) -> SessionStatus {
        lock(&self.slot)
            .as_ref()
            .map_or_else(SessionStatus::idle, |active| SessionStatus {
                active: true,
                session: Some(active.status()),
            })
    }

    pub fn is_active(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

enum Countdown {
    Running,
    Expired(FinishedSession),
    Cancelled,
}

fn run_countdown<F>(
    slot: &Mutex<Option<ActiveSession>>,
    id: SessionId,
    cancel: &Receiver<()>,
    tick: Duration,
    on_expire: F,
) where
    F: FnOnce(FinishedSession),
{
    let mut decrement = false;
    loop {
        match advance(slot, id, decrement) {
            Countdown::Running => {}
            Countdown::Expired(finished) => {
                tracing::debug!(session_id = %id, "session expired");
                on_expire(finished);
                return;
            }
            Countdown::Cancelled => return,
        }
        if !matches!(cancel.recv_timeout(tick), Err(RecvTimeoutError::Timeout)) {
            return;
        }
        decrement = true;
    }
}

/// One countdown step, performed entirely under the clock lock.
fn advance(slot: &Mutex<Option<ActiveSession>>, id: SessionId, decrement: bool) -> Countdown {
    let mut guard = lock(slot);
    match guard.as_mut() {
        Some(active) if active.id == id => {
            if decrement {
                active.remaining_seconds = active.remaining_seconds.saturating_sub(1);
            }
            if active.remaining_seconds > 0 {
                return Countdown::Running;
            }
        }
        _ => return Countdown::Cancelled,
    }
    guard
        .take()
        .map_or(Countdown::Cancelled, |active| {
            Countdown::Expired(active.finish(true, Utc::now()))
        })
}
