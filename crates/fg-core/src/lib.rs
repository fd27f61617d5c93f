//! Core engine for FocusGuard.
//!
//! This crate contains:
//! - Session clock: the idle/active state machine and its countdown
//! - Block list: idempotent patching of the hosts-file block region
//! - Coordinator: ordering of blocking, clock transitions and persistence
//! - Analytics: overview, daily totals, streaks and history

pub mod analytics;
pub mod blocklist;
pub mod clock;
pub mod coordinator;
pub mod session;
pub mod store;

pub use analytics::{Analytics, DailyStat, Overview, Streaks};
pub use blocklist::{BlockList, BlockListError, REDIRECT_IP};
pub use clock::{ClockError, SessionClock};
pub use coordinator::{EnforcementCoordinator, FocusError, StopOutcome};
pub use session::{
    ActiveStatus, FinishedSession, SessionId, SessionRecord, SessionStatus, StartedSession,
};
pub use store::{RecordStore, SiteStore, StoreError};
