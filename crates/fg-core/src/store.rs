//! Storage interfaces the engine depends on.
//!
//! Implementations must be shareable across threads: finished sessions are
//! saved from the countdown thread when a session expires naturally.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::session::SessionRecord;

/// Failure reported by a store implementation.
#[derive(Debug, Error)]
#[error("record store error: {source}")]
pub struct StoreError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl StoreError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Persisted session history and block-attempt events.
pub trait RecordStore: Send + Sync {
    /// Persists a finished session.
    fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Sessions dated on or after `start_date`, newest first.
    fn sessions_since(&self, start_date: NaiveDate) -> Result<Vec<SessionRecord>, StoreError>;

    /// Most recently started sessions first, optionally capped at `limit`.
    fn recent_sessions(&self, limit: Option<usize>) -> Result<Vec<SessionRecord>, StoreError>;

    /// Number of block-attempt events recorded at or after `since`.
    fn count_block_attempts_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Source of the sites to block.
pub trait SiteStore: Send + Sync {
    /// URLs of all sites currently marked active.
    fn list_active_urls(&self) -> Result<Vec<String>, StoreError>;
}
