//! Focus statistics derived from session history.
//!
//! The functions here are pure: they take the sessions and the reference
//! "today" explicitly. [`Analytics`] wires them to a [`RecordStore`] and the
//! local calendar.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, Local, NaiveDate, Utc};
use serde::Serialize;

use crate::session::SessionRecord;
use crate::store::{RecordStore, StoreError};

/// Aggregate numbers for a trailing window of days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_sessions: usize,
    pub completed_sessions: usize,
    pub total_minutes: f64,
    pub average_session_minutes: f64,
    pub completion_rate_percent: f64,
    pub block_attempts: u64,
    pub period_days: u32,
}

/// Sessions and minutes for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub sessions: usize,
    pub minutes: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Streaks {
    /// Consecutive days ending today with a completed session.
    pub current: u32,
    /// Longest run of consecutive days with a completed session.
    pub best: u32,
    /// Number of completed sessions (not days).
    pub total: usize,
}

/// First day included in a window of `window_days` ending today.
pub fn window_start(today: NaiveDate, window_days: u32) -> NaiveDate {
    today
        .checked_sub_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(NaiveDate::MIN)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[expect(
    clippy::cast_precision_loss,
    reason = "session counts are far below f64's exact integer range"
)]
fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

/// Totals over sessions dated within the window.
#[expect(
    clippy::cast_precision_loss,
    reason = "session counts are far below f64's exact integer range"
)]
pub fn overview(
    sessions: &[SessionRecord],
    block_attempts: u64,
    window_days: u32,
    today: NaiveDate,
) -> Overview {
    let start = window_start(today, window_days);
    let in_window: Vec<_> = sessions.iter().filter(|s| s.date >= start).collect();

    let total_sessions = in_window.len();
    let completed_sessions = in_window.iter().filter(|s| s.completed).count();
    let total_minutes: f64 = in_window.iter().map(|s| s.completed_minutes).sum();

    Overview {
        total_sessions,
        completed_sessions,
        total_minutes: round2(total_minutes),
        average_session_minutes: round2(ratio(total_minutes, total_sessions)),
        completion_rate_percent: round2(ratio(completed_sessions as f64 * 100.0, total_sessions)),
        block_attempts,
        period_days: window_days,
    }
}

/// One entry per date present within the window, oldest first.
pub fn daily_breakdown(
    sessions: &[SessionRecord],
    window_days: u32,
    today: NaiveDate,
) -> Vec<DailyStat> {
    let start = window_start(today, window_days);
    let mut by_date: BTreeMap<NaiveDate, (usize, f64)> = BTreeMap::new();
    for session in sessions.iter().filter(|s| s.date >= start) {
        let entry = by_date.entry(session.date).or_default();
        entry.0 += 1;
        entry.1 += session.completed_minutes;
    }
    by_date
        .into_iter()
        .map(|(date, (sessions, minutes))| DailyStat {
            date,
            sessions,
            minutes: round2(minutes),
        })
        .collect()
}

/// Current and best streaks of days with at least one completed session.
pub fn streaks(sessions: &[SessionRecord], today: NaiveDate) -> Streaks {
    let completed: Vec<_> = sessions.iter().filter(|s| s.completed).collect();
    let days: BTreeSet<NaiveDate> = completed.iter().map(|s| s.date).collect();
    if days.is_empty() {
        return Streaks {
            total: completed.len(),
            ..Streaks::default()
        };
    }

    let mut current = 0;
    let mut cursor = Some(today);
    while let Some(day) = cursor.filter(|day| days.contains(day)) {
        current += 1;
        cursor = day.pred_opt();
    }

    let descending: Vec<_> = days.iter().rev().collect();
    let mut best = 1;
    let mut run = 1;
    for pair in descending.windows(2) {
        if (*pair[0] - *pair[1]).num_days() == 1 {
            run += 1;
            best = best.max(run);
        } else {
            run = 1;
        }
    }

    Streaks {
        current,
        best: best.max(current),
        total: completed.len(),
    }
}

/// Store-backed statistics anchored to the local calendar.
pub struct Analytics<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> Analytics<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self { store }
    }

    pub fn overview(&self, window_days: u32) -> Result<Overview, StoreError> {
        let today = Local::now().date_naive();
        let sessions = self.store.sessions_since(window_start(today, window_days))?;
        let since = Utc::now() - Duration::days(i64::from(window_days));
        let attempts = self.store.count_block_attempts_since(since)?;
        Ok(overview(&sessions, attempts, window_days, today))
    }

    pub fn daily_breakdown(&self, window_days: u32) -> Result<Vec<DailyStat>, StoreError> {
        let today = Local::now().date_naive();
        let sessions = self.store.sessions_since(window_start(today, window_days))?;
        Ok(daily_breakdown(&sessions, window_days, today))
    }

    pub fn streaks(&self) -> Result<Streaks, StoreError> {
        let sessions = self.store.recent_sessions(None)?;
        Ok(streaks(&sessions, Local::now().date_naive()))
    }

    /// Up to `limit` sessions, most recently started first.
    pub fn history(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
        self.store.recent_sessions(Some(limit))
    }
}
