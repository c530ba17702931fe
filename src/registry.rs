//! Job Registry - SQLite-backed progress store shared across processes.
//!
//! One row per tracked job in the `processes` table. Every write is a single
//! SQL statement, so concurrently running engines (threads or separate OS
//! processes pointed at the same database file) cannot interleave partial
//! updates. Readers only ever see complete rows.

use crate::engine::{NewJob, ProgressSink, TIMESTAMP_FORMAT};
use crate::error::{Result, SalesError};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, ErrorCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// One row of the progress store, plus the derived `time_taken` seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRow {
    pub process_id: String,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub description: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub percentage: Option<f64>,
    pub time_taken: f64,
}

pub struct JobRegistry {
    conn: Mutex<Connection>,
}

impl JobRegistry {
    /// Open (or create) the store at `path` and ensure the table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Private store that lives only as long as this handle. Used in tests
    /// and wherever persistence is not wanted.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Writers in other processes hold the file lock briefly; wait
        // instead of failing the statement.
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS processes (
                process_id TEXT NOT NULL UNIQUE,
                file_name TEXT DEFAULT NULL,
                file_path TEXT DEFAULT NULL,
                description TEXT DEFAULT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT DEFAULT NULL,
                percentage REAL DEFAULT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create the row for a new job. `percentage` and `end_time` start
    /// unset. A duplicate `process_id` is a contract violation and surfaces
    /// as `SalesError::DuplicateJob`, never as a generic storage error.
    pub fn insert_job(&self, job: &NewJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO processes (process_id, file_name, file_path, description, start_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job.process_id,
                job.file_name,
                job.file_path,
                job.description,
                job.start_time
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
                SalesError::DuplicateJob(job.process_id.clone())
            }
            other => other.into(),
        })?;
        Ok(())
    }

    /// Overwrite the completion percentage of an existing job. An unknown
    /// `process_id` surfaces as `SalesError::UnknownJob`.
    pub fn set_percentage(&self, process_id: &str, percentage: f64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE processes SET percentage = ?1 WHERE process_id = ?2",
            params![percentage, process_id],
        )?;
        if updated == 0 {
            return Err(SalesError::UnknownJob(process_id.to_string()));
        }
        Ok(())
    }

    /// Record the end time of an existing job.
    pub fn set_end_time(&self, process_id: &str, end_time: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE processes SET end_time = ?1 WHERE process_id = ?2",
            params![end_time, process_id],
        )?;
        if updated == 0 {
            return Err(SalesError::UnknownJob(process_id.to_string()));
        }
        Ok(())
    }

    /// Every row in insertion order, each with `time_taken` derived from its
    /// timestamps (0 while the job is still running).
    pub fn read_all(&self) -> Result<Vec<JobRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT process_id, file_name, file_path, description, start_time, end_time, percentage
             FROM processes ORDER BY rowid",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(JobRow {
                process_id: row.get(0)?,
                file_name: row.get(1)?,
                file_path: row.get(2)?,
                description: row.get(3)?,
                start_time: row.get(4)?,
                end_time: row.get(5)?,
                percentage: row.get(6)?,
                time_taken: 0.0,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            let mut job = row?;
            job.time_taken = time_taken_seconds(&job.start_time, job.end_time.as_deref());
            out.push(job);
        }
        Ok(out)
    }
}

impl ProgressSink for JobRegistry {
    fn insert(&self, job: &NewJob) -> Result<()> {
        self.insert_job(job)
    }

    fn update_percentage(&self, process_id: &str, percentage: f64) -> Result<()> {
        self.set_percentage(process_id, percentage)
    }

    fn update_end_time(&self, process_id: &str, end_time: &str) -> Result<()> {
        self.set_end_time(process_id, end_time)
    }
}

/// Seconds between two store timestamps. Zero when the end is missing or
/// either timestamp fails to parse.
fn time_taken_seconds(start_time: &str, end_time: Option<&str>) -> f64 {
    let Some(end_time) = end_time else {
        return 0.0;
    };
    match (
        NaiveDateTime::parse_from_str(start_time, TIMESTAMP_FORMAT),
        NaiveDateTime::parse_from_str(end_time, TIMESTAMP_FORMAT),
    ) {
        (Ok(start), Ok(end)) => (end - start).num_seconds() as f64,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(process_id: &str, start_time: &str) -> NewJob {
        NewJob {
            process_id: process_id.to_string(),
            start_time: start_time.to_string(),
            file_name: Some("sales_2020.csv".to_string()),
            file_path: Some("/data/sales_2020.csv".to_string()),
            description: Some("aggregate_total".to_string()),
        }
    }

    #[test]
    fn test_insert_then_read_all_round_trip() {
        let registry = JobRegistry::open_in_memory().unwrap();
        registry
            .insert_job(&new_job("p-1", "2020-01-01 10:00:00"))
            .unwrap();

        let rows = registry.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].process_id, "p-1");
        assert_eq!(rows[0].file_name.as_deref(), Some("sales_2020.csv"));
        assert_eq!(rows[0].percentage, None);
        assert_eq!(rows[0].end_time, None);
        assert_eq!(rows[0].time_taken, 0.0);
    }

    #[test]
    fn test_percentage_and_end_time_updates() {
        let registry = JobRegistry::open_in_memory().unwrap();
        registry
            .insert_job(&new_job("p-1", "2020-01-01 10:00:00"))
            .unwrap();

        registry.set_percentage("p-1", 42.5).unwrap();
        let rows = registry.read_all().unwrap();
        assert_eq!(rows[0].percentage, Some(42.5));
        assert_eq!(rows[0].time_taken, 0.0);

        registry.set_end_time("p-1", "2020-01-01 10:01:30").unwrap();
        let rows = registry.read_all().unwrap();
        assert_eq!(rows[0].end_time.as_deref(), Some("2020-01-01 10:01:30"));
        assert_eq!(rows[0].time_taken, 90.0);
    }

    #[test]
    fn test_duplicate_insert_is_a_distinct_error() {
        let registry = JobRegistry::open_in_memory().unwrap();
        registry
            .insert_job(&new_job("p-1", "2020-01-01 10:00:00"))
            .unwrap();

        let err = registry
            .insert_job(&new_job("p-1", "2020-01-01 11:00:00"))
            .unwrap_err();
        assert!(matches!(err, SalesError::DuplicateJob(id) if id == "p-1"));
    }

    #[test]
    fn test_unknown_job_updates_are_distinct_errors() {
        let registry = JobRegistry::open_in_memory().unwrap();

        let err = registry.set_percentage("ghost", 10.0).unwrap_err();
        assert!(matches!(err, SalesError::UnknownJob(id) if id == "ghost"));

        let err = registry
            .set_end_time("ghost", "2020-01-01 10:00:00")
            .unwrap_err();
        assert!(matches!(err, SalesError::UnknownJob(_)));
    }

    #[test]
    fn test_read_all_preserves_insertion_order() {
        let registry = JobRegistry::open_in_memory().unwrap();
        for id in ["a", "b", "c"] {
            registry
                .insert_job(&new_job(id, "2020-01-01 10:00:00"))
                .unwrap();
        }

        let ids: Vec<_> = registry
            .read_all()
            .unwrap()
            .into_iter()
            .map(|row| row.process_id)
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_shared_file_store_is_visible_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("processes.sqlite");

        let writer = JobRegistry::open(&db_path).unwrap();
        writer
            .insert_job(&new_job("p-1", "2020-01-01 10:00:00"))
            .unwrap();

        // A second handle, as another worker process would open one.
        let reader = JobRegistry::open(&db_path).unwrap();
        let rows = reader.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].process_id, "p-1");
    }
}
