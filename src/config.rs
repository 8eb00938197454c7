//! Process-wide configuration.
//!
//! Everything is read once from the environment at startup. The project
//! path is the only runtime-mutable field: it lives behind a reader-writer
//! lock, and workers snapshot it by value at executor entry so a concurrent
//! `set-path` never changes the directory of a job already in flight.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::RwLock;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_WORKERS: usize = 3;
pub const DEFAULT_CLI_PATH: &str = "cursor-agent";
pub const DEFAULT_DB_PATH: &str = "./data/jobs.db";

/// Hostnames allowed to receive delayed responses (SSRF allow-list).
pub const ALLOWED_RESPONSE_DOMAINS: &[&str] = &["hooks.slack.com"];

#[derive(Clone)]
pub struct AppConfig {
    /// Slack signing secret, never logged.
    pub signing_secret: SecretString,
    pub port: u16,
    pub cursor_cli_path: String,
    pub db_path: String,
    pub max_workers: usize,
    pub auto_kill_port: bool,
    project_path: Arc<RwLock<Option<String>>>,
}

impl AppConfig {
    pub fn new(signing_secret: SecretString, initial_project_path: Option<String>) -> Self {
        Self {
            signing_secret,
            port: DEFAULT_PORT,
            cursor_cli_path: DEFAULT_CLI_PATH.to_string(),
            db_path: DEFAULT_DB_PATH.to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            auto_kill_port: false,
            project_path: Arc::new(RwLock::new(
                initial_project_path.filter(|p| !p.trim().is_empty()),
            )),
        }
    }

    /// Build the configuration from the environment.
    ///
    /// `SLACK_SIGNING_SECRET` is required; everything else falls back to a
    /// default, with a warning when a value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let signing_secret = std::env::var("SLACK_SIGNING_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingEnv {
                name: "SLACK_SIGNING_SECRET",
            })?;

        let mut config = Self::new(
            SecretString::new(signing_secret),
            std::env::var("CURSOR_PROJECT_PATH").ok(),
        );

        if let Ok(raw) = std::env::var("PORT") {
            match raw.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => tracing::warn!(value = %raw, "invalid PORT, using {}", DEFAULT_PORT),
            }
        }

        if let Ok(path) = std::env::var("CURSOR_CLI_PATH") {
            if !path.is_empty() {
                config.cursor_cli_path = path;
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            if !path.is_empty() {
                config.db_path = path;
            }
        }

        if let Ok(raw) = std::env::var("MAX_WORKERS") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.max_workers = n,
                _ => tracing::warn!(value = %raw, "invalid MAX_WORKERS, using {}", DEFAULT_MAX_WORKERS),
            }
        }

        config.auto_kill_port = std::env::var("AUTO_KILL_PORT").as_deref() == Ok("true");

        Ok(config)
    }

    /// Queue capacity is twice the worker count.
    pub fn queue_capacity(&self) -> usize {
        self.max_workers * 2
    }

    /// Snapshot of the current project path, `None` when unset.
    pub async fn project_path(&self) -> Option<String> {
        self.project_path.read().await.clone()
    }

    pub async fn set_project_path(&self, path: String) {
        *self.project_path.write().await = Some(path);
    }
}
