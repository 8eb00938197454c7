//! Durable job records.
//!
//! The store is the exchange medium between synchronous callers (the HTTP
//! surface) and asynchronous workers: workers write transitions, callers
//! poll. Records are append-plus-update; the core never deletes them.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Lifecycle state of a job.
///
/// Legal transitions: `Pending → Running → {Completed, Failed}`. Jobs
/// rejected before any agent run go straight from `Pending` to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the job table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_path: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at − started_at` in milliseconds, when both exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl JobRecord {
    /// Fresh pending record, `created_at` = now.
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        project_path: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            project_path: project_path.into(),
            status: JobStatus::Pending,
            output: String::new(),
            error: String::new(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

/// Job store abstraction.
///
/// Held as `Arc<dyn JobStore>` so the executor depends on these five
/// operations rather than on the storage engine. Every operation is atomic;
/// the engine must tolerate one concurrent writer per worker.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a pending record. Idempotent on id: a record that already
    /// exists is left untouched (the API ingress pre-creates records that
    /// the executor then creates again).
    async fn create(&self, record: &JobRecord) -> Result<(), StorageError>;

    /// Move a job to a new status. Entering `Running` stamps `started_at`;
    /// entering a terminal status stamps `completed_at` and computes the
    /// duration when `started_at` exists.
    async fn transition_status(&self, id: &str, status: JobStatus) -> Result<(), StorageError>;

    /// Record the collected output and error text for a job.
    async fn set_result(&self, id: &str, output: &str, error: &str) -> Result<(), StorageError>;

    /// Fetch one record. Absence is `Ok(None)`, not an error.
    async fn get(&self, id: &str) -> Result<Option<JobRecord>, StorageError>;

    /// Page through records, newest first, ties broken by id.
    async fn list(
        &self,
        limit: usize,
        offset: usize,
        status: Option<JobStatus>,
    ) -> Result<Vec<JobRecord>, StorageError>;
}
