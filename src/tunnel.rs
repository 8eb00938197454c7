//! Optional ngrok tunnel exposing the local server publicly.
//!
//! Absence of the binary is informational, never fatal: the server keeps
//! running local-only.

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::{Child, Command};

/// Local ngrok agent API.
const NGROK_API: &str = "http://127.0.0.1:4040/api/tunnels";

/// How long to wait for the tunnel to come up.
const STARTUP_ATTEMPTS: u32 = 10;

#[derive(Debug, Deserialize)]
struct TunnelInfo {
    public_url: String,
    proto: String,
}

#[derive(Debug, Deserialize)]
struct TunnelList {
    tunnels: Vec<TunnelInfo>,
}

pub struct TunnelManager {
    child: Child,
    public_url: String,
}

impl TunnelManager {
    /// Spawn `ngrok http <port>` and wait for its https tunnel. Returns
    /// `None` when ngrok is missing or never reports a tunnel.
    pub async fn start(port: u16) -> Option<Self> {
        let mut child = match Command::new("ngrok")
            .arg("http")
            .arg(port.to_string())
            .arg("--log=stdout")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::info!("ngrok not started ({e}); server is local-only");
                return None;
            }
        };

        let client = reqwest::Client::new();
        for _ in 0..STARTUP_ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if let Some(url) = query_public_url(&client).await {
                tracing::info!(%url, "ngrok tunnel ready");
                return Some(Self {
                    child,
                    public_url: url,
                });
            }
        }

        tracing::warn!("ngrok started but no https tunnel appeared; continuing without it");
        let _ = child.kill().await;
        None
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Kill the ngrok child. Part of the drain sequence.
    pub async fn stop(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!("failed to stop ngrok: {e}");
        }
    }
}

async fn query_public_url(client: &reqwest::Client) -> Option<String> {
    let resp = client.get(NGROK_API).send().await.ok()?;
    let list: TunnelList = resp.json().await.ok()?;
    list.tunnels
        .into_iter()
        .find(|t| t.proto == "https")
        .map(|t| t.public_url)
}
