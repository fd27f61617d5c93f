//! Focus session values shared by the clock, the coordinator and storage.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Opaque identity of a focus session, generated when the session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Returned by a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub mode: String,
    pub planned_duration_seconds: u64,
    pub started_at: DateTime<Utc>,
}

/// A session that has left the clock, either stopped or expired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishedSession {
    pub session_id: SessionId,
    pub mode: String,
    pub completed: bool,
    /// Real elapsed wall-clock time, not planned minus remaining.
    pub completed_minutes: f64,
    pub planned_duration_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl FinishedSession {
    /// Builds the persisted form, dated by the local calendar day it started on.
    #[must_use]
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id,
            mode: self.mode.clone(),
            planned_duration_seconds: self.planned_duration_seconds,
            completed_minutes: self.completed_minutes,
            completed: self.completed,
            started_at: self.started_at,
            ended_at: self.ended_at,
            date: self.started_at.with_timezone(&Local).date_naive(),
        }
    }
}

/// Elapsed minutes between two instants, clamped at zero.
#[expect(
    clippy::cast_precision_loss,
    reason = "session lengths are far below f64's exact integer range"
)]
pub(crate) fn elapsed_minutes(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> f64 {
    let millis = (ended_at - started_at).num_milliseconds().max(0);
    millis as f64 / 60_000.0
}

/// Point-in-time view of the clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub session: Option<ActiveStatus>,
}

impl SessionStatus {
    pub(crate) const fn idle() -> Self {
        Self {
            active: false,
            session: None,
        }
    }
}

/// Details reported only while a session is active.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveStatus {
    pub session_id: SessionId,
    pub mode: String,
    pub remaining_seconds: u64,
    pub planned_duration_seconds: u64,
    pub progress_percent: f64,
    pub started_at: DateTime<Utc>,
}

/// Percentage of the planned duration already counted down.
///
/// Returns 0 for a zero-length plan.
#[expect(
    clippy::cast_precision_loss,
    reason = "second counts are far below f64's exact integer range"
)]
pub fn progress_percent(planned_seconds: u64, remaining_seconds: u64) -> f64 {
    if planned_seconds == 0 {
        return 0.0;
    }
    let elapsed = planned_seconds.saturating_sub(remaining_seconds);
    elapsed as f64 / planned_seconds as f64 * 100.0
}

/// A finished session as kept by the record store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub mode: String,
    pub planned_duration_seconds: u64,
    pub completed_minutes: f64,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Calendar day the session started on (local time).
    pub date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    #[test]
    fn progress_is_zero_for_empty_plan() {
        assert!(progress_percent(0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_tracks_counted_down_seconds() {
        assert!((progress_percent(200, 150) - 25.0).abs() < 1e-9);
        assert!((progress_percent(60, 0) - 100.0).abs() < 1e-9);
        assert!(progress_percent(60, 60).abs() < 1e-9);
    }

    #[test]
    fn elapsed_minutes_uses_wall_clock_difference() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 9, 1, 30).unwrap();
        assert!((elapsed_minutes(start, end) - 1.5).abs() < 1e-9);
        assert!(elapsed_minutes(end, start).abs() < f64::EPSILON);
    }

    #[test]
    fn session_id_round_trips_through_display() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn idle_status_serializes_without_session_fields() {
        let json = serde_json::to_value(SessionStatus::idle()).unwrap();
        assert_eq!(json, serde_json::json!({ "active": false }));
    }

    #[test]
    fn active_status_serializes_flat() {
        let status = SessionStatus {
            active: true,
            session: Some(ActiveStatus {
                session_id: SessionId::new(),
                mode: "pomodoro".to_string(),
                remaining_seconds: 30,
                planned_duration_seconds: 60,
                progress_percent: 50.0,
                started_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            }),
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["active"], true);
        assert_eq!(json["mode"], "pomodoro");
        assert_eq!(json["remaining_seconds"], 30);
        assert_eq!(json["progress_percent"], 50.0);
    }

    #[test]
    fn record_serializes_local_date_as_plain_day() {
        let started_at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let record = SessionRecord {
            session_id: SessionId::new(),
            mode: "deepwork".to_string(),
            planned_duration_seconds: 5400,
            completed_minutes: 90.0,
            completed: true,
            started_at,
            ended_at: started_at + chrono::Duration::minutes(90),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], "2024-01-15");
        assert_eq!(json["session_id"], record.session_id.to_string());
        assert_eq!(json["completed"], true);
    }
}
