//! SQLite-backed job store.
//!
//! The connection sits behind `Arc<Mutex>` and every operation runs on
//! tokio's blocking pool via `spawn_blocking`, keeping synchronous SQLite
//! I/O off the async worker threads.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{JobRecord, JobStatus, JobStore};
use crate::error::StorageError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS job_records (
    id TEXT PRIMARY KEY,
    prompt TEXT NOT NULL,
    project_path TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    output TEXT NOT NULL DEFAULT '',
    error TEXT NOT NULL DEFAULT '',
    user_id TEXT NOT NULL DEFAULT '',
    user_name TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    duration_ms INTEGER
);

CREATE INDEX IF NOT EXISTS idx_job_status ON job_records(status);
CREATE INDEX IF NOT EXISTS idx_job_created_at ON job_records(created_at DESC);
";

const RECORD_COLUMNS: &str = "id, prompt, project_path, status, output, error, \
     user_id, user_name, created_at, started_at, completed_at, duration_ms";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema. Parent
    /// directories are created as needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| StorageError::Open {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::init(conn, path)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Open {
            path: ":memory:".to_string(),
            reason: e.to_string(),
        })?;
        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on a blocking thread.
    async fn call<F, R>(&self, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&Connection) -> Result<R, StorageError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|e| StorageError::Task {
                reason: format!("connection lock poisoned: {e}"),
            })?;
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Task {
            reason: e.to_string(),
        })?
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let status: String = row.get("status")?;
    Ok(JobRecord {
        id: row.get("id")?,
        prompt: row.get("prompt")?,
        project_path: row.get("project_path")?,
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
        output: row.get("output")?,
        error: row.get("error")?,
        user_id: row.get("user_id")?,
        user_name: row.get("user_name")?,
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        duration_ms: row.get("duration_ms")?,
    })
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn create(&self, record: &JobRecord) -> Result<(), StorageError> {
        let record = record.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO job_records \
                     (id, prompt, project_path, status, user_id, user_name, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.prompt,
                    record.project_path,
                    record.status.as_str(),
                    record.user_id,
                    record.user_name,
                    record.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn transition_status(&self, id: &str, status: JobStatus) -> Result<(), StorageError> {
        let id = id.to_string();
        self.call(move |conn| {
            let now = Utc::now();
            match status {
                JobStatus::Running => {
                    conn.execute(
                        "UPDATE job_records SET status = ?1, started_at = ?2 WHERE id = ?3",
                        params![status.as_str(), now, id],
                    )?;
                }
                JobStatus::Completed | JobStatus::Failed => {
                    let started_at: Option<DateTime<Utc>> = conn
                        .query_row(
                            "SELECT started_at FROM job_records WHERE id = ?1",
                            params![id],
                            |row| row.get(0),
                        )
                        .optional()?
                        .flatten();

                    let duration_ms =
                        started_at.map(|s| now.signed_duration_since(s).num_milliseconds());

                    conn.execute(
                        "UPDATE job_records \
                             SET status = ?1, completed_at = ?2, duration_ms = ?3 \
                         WHERE id = ?4",
                        params![status.as_str(), now, duration_ms, id],
                    )?;
                }
                JobStatus::Pending => {
                    conn.execute(
                        "UPDATE job_records SET status = ?1 WHERE id = ?2",
                        params![status.as_str(), id],
                    )?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn set_result(&self, id: &str, output: &str, error: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        let output = output.to_string();
        let error = error.to_string();
        self.call(move |conn| {
            conn.execute(
                "UPDATE job_records SET output = ?1, error = ?2 WHERE id = ?3",
                params![output, error, id],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>, StorageError> {
        let id = id.to_string();
        self.call(move |conn| {
            let record = conn
                .query_row(
                    &format!("SELECT {RECORD_COLUMNS} FROM job_records WHERE id = ?1"),
                    params![id],
                    row_to_record,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn list(
        &self,
        limit: usize,
        offset: usize,
        status: Option<JobStatus>,
    ) -> Result<Vec<JobRecord>, StorageError> {
        self.call(move |conn| {
            let mut records = Vec::new();
            match status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {RECORD_COLUMNS} FROM job_records \
                         WHERE status = ?1 \
                         ORDER BY created_at DESC, id ASC \
                         LIMIT ?2 OFFSET ?3"
                    ))?;
                    let rows = stmt.query_map(
                        params![status.as_str(), limit as i64, offset as i64],
                        row_to_record,
                    )?;
                    for row in rows {
                        records.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {RECORD_COLUMNS} FROM job_records \
                         ORDER BY created_at DESC, id ASC \
                         LIMIT ?1 OFFSET ?2"
                    ))?;
                    let rows =
                        stmt.query_map(params![limit as i64, offset as i64], row_to_record)?;
                    for row in rows {
                        records.push(row?);
                    }
                }
            }
            Ok(records)
        })
        .await
    }
}
