//! Storage layer for FocusGuard.
//!
//! Provides persistence for finished sessions, blocked sites and block-attempt
//! events using `rusqlite`.
//!
//! # Thread Safety
//!
//! A `rusqlite::Connection` is `Send` but not `Sync`. [`Database`] keeps its
//! connection behind a `Mutex` so one instance can be shared between the
//! foreground command path and the countdown thread that saves expired
//! sessions. Every method holds the lock for a single statement or
//! transaction.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 UTC with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`), so lexicographic ordering matches
//! chronological ordering. Session dates are stored as `YYYY-MM-DD` in the
//! local calendar of the machine that recorded them.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use fg_core::{RecordStore, SessionId, SessionRecord, SiteStore, StoreError};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A site with this URL is already on the block list.
    #[error("site already blocked: {0}")]
    DuplicateSite(String),
    /// No site has this ID.
    #[error("site not found: {0}")]
    SiteNotFound(i64),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for {record_id}: {timestamp}")]
    TimestampParse {
        record_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row could not be turned back into a record.
    #[error("invalid record {record_id}: {message}")]
    InvalidRecord { record_id: String, message: String },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::new(err)
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Mutex<Connection>,
}

/// A site on the block list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteEntry {
    pub id: i64,
    pub url: String,
    pub category: String,
    pub added_at: DateTime<Utc>,
    pub active: bool,
}

/// Raw `sessions` row before parsing.
struct SessionRow {
    id: String,
    mode: String,
    planned_seconds: i64,
    completed_minutes: f64,
    completed: bool,
    started_at: String,
    ended_at: String,
    date: String,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = DbError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let session_id =
            row.id
                .parse::<SessionId>()
                .map_err(|err| DbError::InvalidRecord {
                    record_id: row.id.clone(),
                    message: err.to_string(),
                })?;
        let date = NaiveDate::parse_from_str(&row.date, DATE_FORMAT).map_err(|source| {
            DbError::TimestampParse {
                record_id: row.id.clone(),
                timestamp: row.date.clone(),
                source,
            }
        })?;
        Ok(Self {
            session_id,
            planned_duration_seconds: u64::try_from(row.planned_seconds).unwrap_or(0),
            completed_minutes: row.completed_minutes,
            completed: row.completed,
            started_at: parse_timestamp(&row.id, &row.started_at)?,
            ended_at: parse_timestamp(&row.id, &row.ended_at)?,
            date,
            mode: row.mode,
        })
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn().execute_batch(
            "
            -- Finished focus sessions
            -- started_at/ended_at: RFC 3339 UTC (e.g., '2024-01-15T10:30:00.000Z')
            -- date: local calendar day the session started on ('2024-01-15')
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                mode TEXT NOT NULL,
                planned_seconds INTEGER NOT NULL,
                completed_minutes REAL NOT NULL DEFAULT 0,
                completed INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                date TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_date ON sessions(date);
            CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);

            CREATE TABLE IF NOT EXISTS blocked_sites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL DEFAULT 'custom',
                added_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS block_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                during_session INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_block_attempts_timestamp ON block_attempts(timestamp);
            ",
        )?;
        Ok(())
    }

    /// Inserts a finished session.
    pub fn insert_session(&self, record: &SessionRecord) -> Result<(), DbError> {
        self.conn().execute(
            "
            INSERT INTO sessions
            (id, mode, planned_seconds, completed_minutes, completed, started_at, ended_at, date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                record.session_id.to_string(),
                record.mode,
                i64::try_from(record.planned_duration_seconds).unwrap_or(i64::MAX),
                record.completed_minutes,
                record.completed,
                format_timestamp(record.started_at),
                format_timestamp(record.ended_at),
                record.date.format(DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// Lists sessions dated on or after `start_date`, newest first.
    pub fn list_sessions_since(&self, start_date: NaiveDate) -> Result<Vec<SessionRecord>, DbError> {
        self.query_sessions(
            "
            SELECT id, mode, planned_seconds, completed_minutes, completed, started_at, ended_at, date
            FROM sessions
            WHERE date >= ?1
            ORDER BY started_at DESC, id ASC
            ",
            &start_date.format(DATE_FORMAT).to_string(),
        )
    }

    /// Lists sessions most recently started first.
    ///
    /// `None` returns every session.
    pub fn list_recent_sessions(&self, limit: Option<usize>) -> Result<Vec<SessionRecord>, DbError> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        self.query_sessions(
            "
            SELECT id, mode, planned_seconds, completed_minutes, completed, started_at, ended_at, date
            FROM sessions
            ORDER BY started_at DESC, id ASC
            LIMIT ?1
            ",
            &limit,
        )
    }

    fn query_sessions(
        &self,
        sql: &str,
        param: &dyn rusqlite::ToSql,
    ) -> Result<Vec<SessionRecord>, DbError> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([param], |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    mode: row.get(1)?,
                    planned_seconds: row.get(2)?,
                    completed_minutes: row.get(3)?,
                    completed: row.get(4)?,
                    started_at: row.get(5)?,
                    ended_at: row.get(6)?,
                    date: row.get(7)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        rows.into_iter().map(SessionRecord::try_from).collect()
    }

    /// Adds a site to the block list.
    pub fn add_site(&self, url: &str, category: &str) -> Result<SiteEntry, DbError> {
        let conn = self.conn();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM blocked_sites WHERE url = ?",
                [url],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(DbError::DuplicateSite(url.to_string()));
        }

        let added_at = Utc::now();
        conn.execute(
            "INSERT INTO blocked_sites (url, category, added_at, is_active) VALUES (?, ?, ?, 1)",
            params![url, category, format_timestamp(added_at)],
        )?;
        let id = conn.last_insert_rowid();
        tracing::debug!(id, url, category, "site added to block list");

        // Round-trip through the stored format so the value matches later reads.
        let added_at = parse_timestamp(url, &format_timestamp(added_at))?;
        Ok(SiteEntry {
            id,
            url: url.to_string(),
            category: category.to_string(),
            added_at,
            active: true,
        })
    }

    /// Removes a site from the block list.
    pub fn remove_site(&self, id: i64) -> Result<(), DbError> {
        let removed = self
            .conn()
            .execute("DELETE FROM blocked_sites WHERE id = ?", [id])?;
        if removed == 0 {
            return Err(DbError::SiteNotFound(id));
        }
        Ok(())
    }

    /// Marks a site active or inactive without removing it.
    pub fn set_site_active(&self, id: i64, active: bool) -> Result<(), DbError> {
        let updated = self.conn().execute(
            "UPDATE blocked_sites SET is_active = ? WHERE id = ?",
            params![active, id],
        )?;
        if updated == 0 {
            return Err(DbError::SiteNotFound(id));
        }
        Ok(())
    }

    /// Lists all sites ordered by ID.
    pub fn list_sites(&self) -> Result<Vec<SiteEntry>, DbError> {
        let rows: Vec<(i64, String, String, String, bool)> = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT id, url, category, added_at, is_active FROM blocked_sites ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };
        rows.into_iter()
            .map(|(id, url, category, added_at, active)| {
                Ok(SiteEntry {
                    id,
                    added_at: parse_timestamp(&url, &added_at)?,
                    url,
                    category,
                    active,
                })
            })
            .collect()
    }

    /// URLs of active sites ordered by ID.
    pub fn list_active_site_urls(&self) -> Result<Vec<String>, DbError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT url FROM blocked_sites WHERE is_active = 1 ORDER BY id ASC")?;
        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    /// Records an attempt to reach a blocked site.
    pub fn insert_block_attempt(
        &self,
        url: &str,
        during_session: bool,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.conn().execute(
            "INSERT INTO block_attempts (url, timestamp, during_session) VALUES (?, ?, ?)",
            params![url, format_timestamp(at), during_session],
        )?;
        Ok(())
    }

    /// Counts block attempts at or after `since`.
    pub fn count_block_attempts(&self, since: DateTime<Utc>) -> Result<u64, DbError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM block_attempts WHERE timestamp >= ?",
            [format_timestamp(since)],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl RecordStore for Database {
    fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        Ok(self.insert_session(record)?)
    }

    fn sessions_since(&self, start_date: NaiveDate) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.list_sessions_since(start_date)?)
    }

    fn recent_sessions(&self, limit: Option<usize>) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.list_recent_sessions(limit)?)
    }

    fn count_block_attempts_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.count_block_attempts(since)?)
    }
}

impl SiteStore for Database {
    fn list_active_urls(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.list_active_site_urls()?)
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(record_id: &str, timestamp: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            record_id: record_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};

    fn record(started_at: DateTime<Utc>, completed: bool) -> SessionRecord {
        SessionRecord {
            session_id: SessionId::new(),
            mode: "pomodoro".to_string(),
            planned_duration_seconds: 1500,
            completed_minutes: 24.5,
            completed,
            started_at,
            ended_at: started_at + Duration::minutes(25),
            date: started_at.date_naive(),
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn open_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focusguard.db");
        let db = Database::open(&path).unwrap();
        db.insert_session(&record(at(1, 9), true)).unwrap();
        drop(db);

        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_recent_sessions(None).unwrap().len(), 1);
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");
        let conn = db.conn();

        assert_eq!(
            table_columns(&conn, "sessions"),
            vec![
                "id",
                "mode",
                "planned_seconds",
                "completed_minutes",
                "completed",
                "started_at",
                "ended_at",
                "date",
            ]
        );
        assert_eq!(
            table_columns(&conn, "blocked_sites"),
            vec!["id", "url", "category", "added_at", "is_active"]
        );
        assert_eq!(
            table_columns(&conn, "block_attempts"),
            vec!["id", "url", "timestamp", "during_session"]
        );
    }

    #[test]
    fn session_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let original = record(at(3, 9), true);
        db.insert_session(&original).unwrap();

        let loaded = db.list_recent_sessions(None).unwrap();
        assert_eq!(loaded, vec![original]);
    }

    #[test]
    fn duplicate_session_id_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let original = record(at(3, 9), true);
        db.insert_session(&original).unwrap();
        assert!(matches!(
            db.insert_session(&original),
            Err(DbError::Sqlite(_))
        ));
    }

    #[test]
    fn recent_sessions_are_newest_first_and_limited() {
        let db = Database::open_in_memory().unwrap();
        for day in [2, 5, 3, 4] {
            db.insert_session(&record(at(day, 9), true)).unwrap();
        }

        let recent = db.list_recent_sessions(Some(2)).unwrap();
        let days: Vec<_> = recent.iter().map(|s| s.started_at).collect();
        assert_eq!(days, vec![at(5, 9), at(4, 9)]);
        assert_eq!(db.list_recent_sessions(None).unwrap().len(), 4);
    }

    #[test]
    fn sessions_since_filters_by_date() {
        let db = Database::open_in_memory().unwrap();
        for day in [1, 2, 3, 4] {
            db.insert_session(&record(at(day, 9), day % 2 == 0)).unwrap();
        }

        let since = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let sessions = db.list_sessions_since(since).unwrap();
        let dates: Vec<_> = sessions.iter().map(|s| s.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            ]
        );
    }

    #[test]
    fn sites_can_be_added_toggled_and_removed() {
        let db = Database::open_in_memory().unwrap();
        let facebook = db.add_site("facebook.com", "social").unwrap();
        let news = db.add_site("cnn.com", "news").unwrap();
        assert_eq!(facebook.category, "social");
        assert!(facebook.active);

        assert_eq!(
            db.list_active_site_urls().unwrap(),
            vec!["facebook.com", "cnn.com"]
        );

        db.set_site_active(news.id, false).unwrap();
        assert_eq!(db.list_active_site_urls().unwrap(), vec!["facebook.com"]);
        let sites = db.list_sites().unwrap();
        assert_eq!(sites.len(), 2);
        assert!(!sites[1].active);
        assert_eq!(sites[0], facebook);

        db.remove_site(facebook.id).unwrap();
        assert!(db.list_active_site_urls().unwrap().is_empty());
    }

    #[test]
    fn duplicate_site_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.add_site("reddit.com", "custom").unwrap();
        let err = db.add_site("reddit.com", "news").unwrap_err();
        assert!(matches!(err, DbError::DuplicateSite(url) if url == "reddit.com"));
    }

    #[test]
    fn unknown_site_ids_are_reported() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.remove_site(42), Err(DbError::SiteNotFound(42))));
        assert!(matches!(
            db.set_site_active(7, true),
            Err(DbError::SiteNotFound(7))
        ));
    }

    #[test]
    fn block_attempts_are_counted_since_timestamp() {
        let db = Database::open_in_memory().unwrap();
        db.insert_block_attempt("x.com", true, at(1, 9)).unwrap();
        db.insert_block_attempt("x.com", false, at(3, 9)).unwrap();
        db.insert_block_attempt("reddit.com", true, at(5, 9)).unwrap();

        assert_eq!(db.count_block_attempts(at(3, 9)).unwrap(), 2);
        assert_eq!(db.count_block_attempts(at(6, 0)).unwrap(), 0);
    }

    #[test]
    fn corrupt_timestamp_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO sessions VALUES (?, 'pomodoro', 60, 1.0, 1, 'yesterday', 'today', '2024-01-01')",
                [SessionId::new().to_string()],
            )
            .unwrap();
        let err = db.list_recent_sessions(None).unwrap_err();
        assert!(matches!(err, DbError::TimestampParse { .. }));
    }

    #[test]
    fn store_traits_delegate_to_database() {
        let db = Database::open_in_memory().unwrap();
        let store: &dyn RecordStore = &db;
        store.save_session(&record(at(2, 9), true)).unwrap();
        assert_eq!(store.recent_sessions(Some(10)).unwrap().len(), 1);
        assert_eq!(
            store
                .sessions_since(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
                .unwrap()
                .len(),
            1
        );

        db.add_site("x.com", "social").unwrap();
        let sites: &dyn SiteStore = &db;
        assert_eq!(sites.list_active_urls().unwrap(), vec!["x.com"]);
    }
}
