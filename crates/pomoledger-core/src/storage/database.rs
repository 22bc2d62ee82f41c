//! SQLite-based project and session ledger.
//!
//! Provides persistent storage for:
//! - Projects (unique name, active flag)
//! - Committed focus/break sessions
//! - All-time and weekly focus totals per project

use std::path::Path;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::{migrations, NewSession, ProjectStore, ProjectTotals, SessionRecord};
use crate::error::DatabaseError;
use crate::timer::StepType;

/// SQLite database holding the project/session ledger.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn project_id(&self, name: &str) -> Result<Option<i64>, DatabaseError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM projects WHERE name = ?1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Totals as of `now`; the week window is computed in `now`'s time zone.
    pub fn active_project_totals_at<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Result<Vec<ProjectTotals>, DatabaseError> {
        let (week_start, week_end) = week_bounds(now);
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name,
                    COALESCE(SUM(CASE WHEN s.step_type = 'focus' THEN s.duration END), 0),
                    COALESCE(SUM(CASE WHEN s.step_type = 'focus'
                                       AND s.start_time >= ?1 AND s.start_time < ?2
                                      THEN s.duration END), 0)
             FROM projects p
             LEFT JOIN sessions s ON s.project_id = p.id
             WHERE p.active = 1
             GROUP BY p.id, p.name
             ORDER BY p.name",
        )?;
        let rows = stmt.query_map(params![week_start, week_end], |row| {
            Ok(ProjectTotals {
                id: row.get(0)?,
                name: row.get(1)?,
                total_secs: row.get(2)?,
                week_secs: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Most recent sessions first.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.project_id, p.name, s.step_type, s.start_time, s.end_time, s.duration
             FROM sessions s
             JOIN projects p ON p.id = s.project_id
             ORDER BY s.start_time DESC, s.id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let step_type: String = row.get(3)?;
            let step_type = step_type.parse::<StepType>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
            })?;
            Ok(SessionRecord {
                id: row.get(0)?,
                project_id: row.get(1)?,
                project_name: row.get(2)?,
                step_type,
                started_at: from_unix(row.get(4)?),
                ended_at: from_unix(row.get(5)?),
                duration_secs: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn session_count(&self) -> Result<u64, DatabaseError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl ProjectStore for Database {
    fn resolve_or_create_project(&self, name: &str) -> Result<i64, DatabaseError> {
        if let Some(id) = self.project_id(name)? {
            return Ok(id);
        }
        self.conn
            .execute("INSERT INTO projects (name) VALUES (?1)", params![name])?;
        Ok(self.conn.last_insert_rowid())
    }

    fn add_project(&self, name: &str) -> Result<bool, DatabaseError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO projects (name) VALUES (?1)",
            params![name],
        )?;
        Ok(inserted == 1)
    }

    fn record_session(&self, session: &NewSession) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO sessions (project_id, start_time, end_time, duration, step_type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.project_id,
                session.started_at.timestamp(),
                session.ended_at.timestamp(),
                session.duration_secs,
                session.step_type.as_str(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn active_project_totals(&self) -> Result<Vec<ProjectTotals>, DatabaseError> {
        self.active_project_totals_at(&Local::now())
    }
}

/// Unix-second bounds `[start, end)` of the Monday-to-Monday week that
/// contains `now`, with both Mondays at 00:00 in `now`'s time zone.
pub fn week_bounds<Tz: TimeZone>(now: &DateTime<Tz>) -> (i64, i64) {
    let today = now.date_naive();
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let next_monday = monday + Duration::days(7);
    let tz = now.timezone();
    (local_midnight(&tz, monday), local_midnight(&tz, next_monday))
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> i64 {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.timestamp(),
        // Midnight skipped by a DST jump: the day starts at the gap's end,
        // at most an hour later.
        None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.timestamp())
            .unwrap_or_else(|| naive.and_utc().timestamp()),
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn session(project_id: i64, start: i64, duration_secs: u64) -> NewSession {
        NewSession {
            project_id,
            project_name: String::new(),
            step_type: StepType::Focus,
            started_at: from_unix(start),
            ended_at: from_unix(start + duration_secs as i64),
            duration_secs,
        }
    }

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    #[test]
    fn resolve_is_idempotent() {
        let db = Database::open_memory().unwrap();
        let first = db.resolve_or_create_project("Writing").unwrap();
        let second = db.resolve_or_create_project("Writing").unwrap();
        assert_eq!(first, second);
        assert_ne!(db.resolve_or_create_project("Reading").unwrap(), first);
    }

    #[test]
    fn add_project_reports_creation() {
        let db = Database::open_memory().unwrap();
        assert!(db.add_project("Writing").unwrap());
        assert!(!db.add_project("Writing").unwrap());
        assert_eq!(
            db.resolve_or_create_project("Writing").unwrap(),
            db.project_id("Writing").unwrap().unwrap()
        );
    }

    #[test]
    fn week_bounds_span_monday_to_monday() {
        // Wednesday 2024-05-15 10:30 at UTC+2.
        let (start, end) = week_bounds(&at("2024-05-15T10:30:00+02:00"));
        assert_eq!(start, at("2024-05-13T00:00:00+02:00").timestamp());
        assert_eq!(end, at("2024-05-20T00:00:00+02:00").timestamp());
    }

    #[test]
    fn week_bounds_on_monday_midnight_include_now() {
        let now = at("2024-05-13T00:00:00+00:00");
        let (start, end) = week_bounds(&now);
        assert_eq!(start, now.timestamp());
        assert_eq!(end - start, 7 * 24 * 3600);
    }

    #[test]
    fn totals_split_all_time_and_this_week() {
        let db = Database::open_memory().unwrap();
        let writing = db.resolve_or_create_project("Writing").unwrap();
        let now = at("2024-05-15T12:00:00+00:00");

        // Previous week.
        db.record_session(&session(writing, at("2024-05-10T09:00:00+00:00").timestamp(), 1500))
            .unwrap();
        // This week.
        db.record_session(&session(writing, at("2024-05-14T09:00:00+00:00").timestamp(), 600))
            .unwrap();

        let totals = db.active_project_totals_at(&now).unwrap();
        assert_eq!(
            totals,
            vec![ProjectTotals {
                id: writing,
                name: "Writing".into(),
                total_secs: 2100,
                week_secs: 600,
            }]
        );
    }

    #[test]
    fn week_total_resets_when_nothing_since_monday() {
        let db = Database::open_memory().unwrap();
        let id = db.resolve_or_create_project("Writing").unwrap();
        db.record_session(&session(id, at("2024-05-12T23:59:00+00:00").timestamp(), 3600))
            .unwrap();

        let totals = db
            .active_project_totals_at(&at("2024-05-13T08:00:00+00:00"))
            .unwrap();
        assert_eq!(totals[0].total_secs, 3600);
        assert_eq!(totals[0].week_secs, 0);
    }

    #[test]
    fn totals_skip_breaks_and_inactive_projects() {
        let db = Database::open_memory().unwrap();
        let writing = db.resolve_or_create_project("Writing").unwrap();
        let archived = db.resolve_or_create_project("Archived").unwrap();
        db.conn()
            .execute("UPDATE projects SET active = 0 WHERE id = ?1", [archived])
            .unwrap();

        let now = at("2024-05-15T12:00:00+00:00");
        let mut rest = session(writing, now.timestamp() - 600, 300);
        rest.step_type = StepType::Break;
        db.record_session(&rest).unwrap();
        db.record_session(&session(archived, now.timestamp() - 600, 900))
            .unwrap();

        let totals = db.active_project_totals_at(&now).unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].name, "Writing");
        assert_eq!(totals[0].total_secs, 0);
        assert_eq!(db.session_count().unwrap(), 2);
    }

    #[test]
    fn totals_are_ordered_by_name() {
        let db = Database::open_memory().unwrap();
        for name in ["Zeta", "Alpha", "Mid"] {
            db.add_project(name).unwrap();
        }
        let names: Vec<_> = db
            .active_project_totals()
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Mid", "Zeta"]);
    }

    #[test]
    fn recent_sessions_newest_first() {
        let db = Database::open_memory().unwrap();
        let id = db.resolve_or_create_project("Writing").unwrap();
        db.record_session(&session(id, 1_700_000_000, 60)).unwrap();
        db.record_session(&session(id, 1_700_010_000, 120)).unwrap();

        let recent = db.recent_sessions(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].duration_secs, 120);
        assert_eq!(recent[0].project_name, "Writing");
        assert_eq!(recent[0].started_at.timestamp(), 1_700_010_000);
    }

    #[test]
    fn on_disk_database_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.add_project("Writing").unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert!(db.project_id("Writing").unwrap().is_some());
    }

    #[test]
    fn unknown_step_type_is_reported() {
        let db = Database::open_memory().unwrap();
        let id = db.resolve_or_create_project("Writing").unwrap();
        db.conn()
            .execute(
                "INSERT INTO sessions (project_id, start_time, end_time, duration, step_type)
                 VALUES (?1, 1700000000, 1700000060, 60, 'nap')",
                [id],
            )
            .unwrap();

        let err = db.recent_sessions(10).unwrap_err();
        assert!(matches!(err, DatabaseError::QueryFailed(ref msg) if msg.contains("nap")));
    }

    #[test]
    fn recording_for_unknown_project_fails() {
        let db = Database::open_memory().unwrap();
        let err = db.record_session(&session(42, 1_700_000_000, 10)).unwrap_err();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
    }
}
