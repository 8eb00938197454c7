//! Queued job description.

use chrono::{DateTime, Utc};

/// A single submitted instruction plus its routing metadata. Immutable once
/// enqueued.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    /// Raw instruction text as submitted; the executor trims it.
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    /// Webhook to deliver results to, when the submitter supplied one.
    pub response_url: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            user_id: String::new(),
            user_name: String::new(),
            response_url: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self.user_name = user_name.into();
        self
    }

    /// Attach a response URL; empty strings are treated as absent.
    pub fn with_response_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.response_url = if url.is_empty() { None } else { Some(url) };
        self
    }
}
