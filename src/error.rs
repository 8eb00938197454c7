//! Error types, one enum per area.

use std::process::ExitStatus;

/// Errors raised while loading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing or empty.
    #[error("{name} is not set")]
    MissingEnv { name: &'static str },
}

/// Errors from the job record store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The database file could not be opened or initialized.
    #[error("failed to open database at {path}: {reason}")]
    Open { path: String, reason: String },

    /// A query failed.
    #[error("database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// The blocking database task panicked or was cancelled.
    #[error("database task failed: {reason}")]
    Task { reason: String },
}

/// Terminal outcomes of a supervised agent run.
///
/// `DeadlineExceeded` and `ExitNonZero` carry whatever output the agent
/// produced before it stopped; the executor decides user-visible messaging.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent binary could not be spawned or waited on.
    #[error("failed to start agent: {reason}")]
    StartFailed { reason: String },

    /// The run outlived the wall-clock deadline and the process group was
    /// killed.
    #[error("agent run exceeded the {} minute deadline", crate::agent::AGENT_TIMEOUT.as_secs() / 60)]
    DeadlineExceeded { output: String },

    /// The agent exited on its own with a non-zero status.
    #[error("agent exited with {status}")]
    ExitNonZero { status: ExitStatus, output: String },
}

impl AgentError {
    /// Output captured before the run ended, when any exists.
    pub fn output(&self) -> Option<&str> {
        match self {
            AgentError::StartFailed { .. } => None,
            AgentError::DeadlineExceeded { output } => Some(output),
            AgentError::ExitNonZero { output, .. } => Some(output),
        }
    }
}

/// Errors from submitting to the shared job queue.
///
/// Always recoverable: the producer logs and moves on, because the HTTP
/// response has already been sent by the time a submit can fail.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue was closed by the shutdown sequence.
    #[error("job queue is closed")]
    Closed,
}

/// Fatal startup errors for the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured port is held by another process.
    #[error("port {port} is already in use")]
    PortInUse { port: u16 },

    /// Binding the listener failed for some other reason.
    #[error("failed to bind server: {0}")]
    Bind(#[from] std::io::Error),
}
