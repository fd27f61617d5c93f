//! Sequences block-list updates and persistence around clock transitions.
//!
//! - start: apply the block list, then start the clock. A failed apply means
//!   no session.
//! - stop: stop the clock, clear the block list, save the record. Cleanup
//!   failures are reported in the [`StopOutcome`] but the session stays
//!   stopped.
//! - expiry: the countdown thread runs the same cleanup.
//!
//! Start, stop and expiry cleanup share a control lock. The clock's own lock
//! is never held across file or database I/O, so status reads stay cheap.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::blocklist::{BlockList, BlockListError};
use crate::clock::{ClockError, SessionClock};
use crate::session::{FinishedSession, SessionStatus, StartedSession};
use crate::store::{RecordStore, SiteStore, StoreError};

/// Errors surfaced by coordinator operations.
#[derive(Debug, Error)]
pub enum FocusError {
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error(transparent)]
    BlockList(#[from] BlockListError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A stopped or expired session together with its cleanup results.
#[derive(Debug)]
pub struct StopOutcome {
    pub session: FinishedSession,
    /// Set when the block list could not be cleared.
    pub unblock_error: Option<BlockListError>,
    /// Set when the finished record could not be saved.
    pub save_error: Option<StoreError>,
}

impl StopOutcome {
    pub const fn is_clean(&self) -> bool {
        self.unblock_error.is_none() && self.save_error.is_none()
    }
}

type ExpiryListener = Arc<dyn Fn(&StopOutcome) + Send + Sync>;

struct Enforcement {
    block_list: Arc<BlockList>,
    records: Arc<dyn RecordStore>,
    control: Mutex<()>,
    listener: Mutex<Option<ExpiryListener>>,
}

impl Enforcement {
    fn control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears blocking (when asked) and saves the record.
    fn finish(&self, session: FinishedSession, clear: bool) -> StopOutcome {
        let unblock_error = if clear {
            self.block_list.clear().err()
        } else {
            None
        };
        if let Some(err) = &unblock_error {
            tracing::warn!(session_id = %session.session_id, error = %err, "failed to clear block list");
        }

        let save_error = self.records.save_session(&session.to_record()).err();
        if let Some(err) = &save_error {
            tracing::error!(session_id = %session.session_id, error = %err, "failed to save session");
        }

        tracing::info!(
            session_id = %session.session_id,
            completed = session.completed,
            minutes = session.completed_minutes,
            "focus session ended"
        );
        StopOutcome {
            session,
            unblock_error,
            save_error,
        }
    }

    fn finish_expired(&self, clock: &SessionClock, session: FinishedSession) {
        let outcome = {
            let _control = self.control();
            // A session started after this one expired owns the block list now.
            let clear = !clock.is_active();
            self.finish(session, clear)
        };
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(&outcome);
        }
    }
}

/// Binds the session clock to the block list and the record store.
pub struct EnforcementCoordinator {
    clock: Arc<SessionClock>,
    shared: Arc<Enforcement>,
}

impl EnforcementCoordinator {
    pub fn new(
        clock: Arc<SessionClock>,
        block_list: Arc<BlockList>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            clock,
            shared: Arc::new(Enforcement {
                block_list,
                records,
                control: Mutex::new(()),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Registers a callback run after a session expires and has been cleaned up.
    ///
    /// Replaces any previously registered listener.
    pub fn set_expiry_listener<F>(&self, listener: F)
    where
        F: Fn(&StopOutcome) + Send + Sync + 'static,
    {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
    }

    /// Blocks `sites` and starts a session of `duration_minutes`.
    pub fn start<S: AsRef<str>>(
        &self,
        duration_minutes: u64,
        mode: &str,
        sites: &[S],
    ) -> Result<StartedSession, FocusError> {
        let _control = self.shared.control();
        if self.clock.is_active() {
            return Err(ClockError::AlreadyActive.into());
        }

        self.shared.block_list.apply(sites)?;

        let shared = Arc::clone(&self.shared);
        let clock = Arc::clone(&self.clock);
        let started = self.clock.start(
            duration_minutes.saturating_mul(60),
            mode,
            move |finished| shared.finish_expired(&clock, finished),
        );
        let started = match started {
            Ok(started) => started,
            Err(err) => {
                if let Err(clear_err) = self.shared.block_list.clear() {
                    tracing::warn!(error = %clear_err, "failed to roll back block list");
                }
                return Err(err.into());
            }
        };

        tracing::info!(
            session_id = %started.session_id,
            mode,
            duration_minutes,
            sites = sites.len(),
            "focus session started"
        );
        Ok(started)
    }

    /// Starts a session blocking every active site in `sites`.
    pub fn start_with_sites(
        &self,
        duration_minutes: u64,
        mode: &str,
        sites: &dyn SiteStore,
    ) -> Result<StartedSession, FocusError> {
        let urls = sites.list_active_urls()?;
        self.start(duration_minutes, mode, &urls)
    }

    /// Stops the active session, clears blocking and saves the record.
    pub fn stop(&self, mark_completed: bool) -> Result<StopOutcome, FocusError> {
        let _control = self.shared.control();
        let finished = self.clock.stop(mark_completed)?;
        Ok(self.shared.finish(finished, true))
    }

    pub fn status(&self) -> SessionStatus {
        self.clock.status()
    }

    pub fn block_list(&self) -> &BlockList {
        &self.shared.block_list
    }
}
