//! Delivery of delayed responses to Slack response URLs.
//!
//! Every outbound URL is validated before dialing: https only, hostname on
//! the allow-list. Violations and transport errors are logged and dropped;
//! by the time delivery runs, the job record has already been persisted.

use std::time::Duration;

use serde::Serialize;

use super::format::split_message;

/// Pause between consecutive chunks of one logical message (response-URL
/// rate limit).
const INTER_CHUNK_DELAY: Duration = Duration::from_millis(500);

/// JSON body of a response-URL POST.
#[derive(Debug, Serialize)]
struct DelayedResponse<'a> {
    text: &'a str,
    response_type: &'static str,
}

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    allowed_domains: Vec<String>,
}

impl Notifier {
    pub fn new(allowed_domains: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            allowed_domains,
        }
    }

    /// POST one message to a response URL.
    pub async fn send(&self, response_url: &str, text: &str) {
        let url = match reqwest::Url::parse(response_url) {
            Ok(url) => url,
            Err(_) => {
                tracing::warn!(url = %response_url, "dropping response: invalid URL");
                return;
            }
        };
        if !self.allowed(&url) {
            tracing::warn!(url = %response_url, "dropping response: URL not on the allow-list");
            return;
        }

        let payload = DelayedResponse {
            text,
            response_type: "in_channel",
        };
        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if !resp.status().is_success() => {
                tracing::warn!(status = %resp.status(), "response URL returned non-success");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to deliver delayed response: {e}"),
        }
    }

    /// Split a long message and send every chunk, pausing between them.
    pub async fn send_chunked(&self, response_url: &str, message: &str) {
        let chunks = split_message(message);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            tracing::debug!(chunk = i + 1, total, bytes = chunk.len(), "sending delayed response");
            self.send(response_url, chunk).await;
            if i + 1 < total {
                tokio::time::sleep(INTER_CHUNK_DELAY).await;
            }
        }
    }

    /// Scheme must be https; the hostname must equal an allowed domain or
    /// end in `.<domain>`.
    fn allowed(&self, url: &reqwest::Url) -> bool {
        if url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        self.allowed_domains
            .iter()
            .any(|d| host == d || host.ends_with(&format!(".{d}")))
    }
}
