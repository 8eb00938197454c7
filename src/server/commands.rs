//! Inline slash sub-commands.
//!
//! These answer synchronously from the ephemeral response; no job is
//! enqueued.

use super::AppState;
use crate::store::{JobRecord, JobStore};

/// Words recognized as sub-commands when they lead the instruction text.
const SUB_COMMANDS: &[&str] = &[
    "help", "?", "list", "jobs", "show", "result", "path", "get-path", "set-path",
];

/// How many characters of a prompt the job list shows.
const LIST_PROMPT_WIDTH: usize = 48;

/// How much output `show` echoes back.
const SHOW_OUTPUT_LIMIT: usize = 3_000;

pub fn is_sub_command(word: &str) -> bool {
    SUB_COMMANDS.contains(&word)
}

/// Handle one sub-command and return the ephemeral response text.
pub async fn handle(state: &AppState, word: &str, rest: &str) -> String {
    match word {
        "help" | "?" => usage(),
        "list" | "jobs" => list_jobs(state).await,
        "show" | "result" => show_job(state, rest.trim()).await,
        "path" | "get-path" => get_path(state).await,
        "set-path" => set_path(state, rest.trim()).await,
        _ => usage(),
    }
}

fn usage() -> String {
    "*Usage*\n\
     • `/cursor <prompt>` — run the agent with a natural-language instruction\n\
     • `/cursor list` — recent jobs\n\
     • `/cursor show <job-id>` — one job's result (8-char prefix works)\n\
     • `/cursor path` — show the project path\n\
     • `/cursor set-path <path>` — set the project path"
        .to_string()
}

async fn list_jobs(state: &AppState) -> String {
    match state.store.list(10, 0, None).await {
        Ok(jobs) if jobs.is_empty() => "no jobs yet".to_string(),
        Ok(jobs) => {
            let mut out = String::from("*Recent jobs*\n");
            for job in jobs {
                out.push_str(&format!(
                    "• `{}` {} — {}\n",
                    short_id(&job.id),
                    job.status,
                    truncate(&job.prompt, LIST_PROMPT_WIDTH),
                ));
            }
            out
        }
        Err(e) => {
            tracing::error!("failed to list jobs: {e}");
            "⚠️ failed to list jobs".to_string()
        }
    }
}

async fn show_job(state: &AppState, id: &str) -> String {
    if id.is_empty() {
        return "usage: `/cursor show <job-id>`".to_string();
    }
    match resolve(state, id).await {
        Ok(Some(job)) => {
            let mut out = format!(
                "*Job `{}`* — {}\n📝 {}\n🕐 created {}",
                short_id(&job.id),
                job.status,
                job.prompt,
                job.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            );
            if let Some(ms) = job.duration_ms {
                out.push_str(&format!(", took {:.1}s", ms as f64 / 1000.0));
            }
            if !job.error.is_empty() {
                out.push_str(&format!("\n🚨 {}", job.error));
            }
            if !job.output.is_empty() {
                out.push_str(&format!(
                    "\n```\n{}\n```",
                    truncate(&job.output, SHOW_OUTPUT_LIMIT)
                ));
            }
            out
        }
        Ok(None) => format!("no job found for `{id}`"),
        Err(e) => {
            tracing::error!("failed to look up job: {e}");
            "⚠️ failed to look up job".to_string()
        }
    }
}

/// Accept a full id, or an id prefix resolved against recent jobs.
async fn resolve(
    state: &AppState,
    id: &str,
) -> Result<Option<JobRecord>, crate::error::StorageError> {
    if let Some(job) = state.store.get(id).await? {
        return Ok(Some(job));
    }
    let recent = state.store.list(100, 0, None).await?;
    Ok(recent.into_iter().find(|j| j.id.starts_with(id)))
}

async fn get_path(state: &AppState) -> String {
    match state.config.project_path().await {
        Some(path) => format!("project path: `{path}`"),
        None => "project path is not set; use `/cursor set-path <path>`".to_string(),
    }
}

async fn set_path(state: &AppState, path: &str) -> String {
    if path.is_empty() {
        return "usage: `/cursor set-path /path/to/project`".to_string();
    }
    state.config.set_project_path(path.to_string()).await;
    tracing::info!(%path, "project path set via slash command");
    format!("✅ project path set to `{path}`\nyou can now run `/cursor <prompt>`")
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(limit).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use secrecy::SecretString;

    use super::*;
    use crate::config::AppConfig;
    use crate::store::{JobStore, SqliteStore};
    use crate::worker::JobQueue;

    fn state() -> AppState {
        let (queue, _rx) = JobQueue::new(2);
        AppState {
            config: AppConfig::new(SecretString::new("s".to_string()), None),
            store: Arc::new(SqliteStore::open_in_memory().unwrap()),
            queue,
        }
    }

    #[test]
    fn recognizes_sub_commands_only() {
        for word in ["help", "?", "list", "jobs", "show", "result", "path", "get-path", "set-path"]
        {
            assert!(is_sub_command(word), "{word} should be a sub-command");
        }
        assert!(!is_sub_command("fix"));
        assert!(!is_sub_command("Help"));
    }

    #[tokio::test]
    async fn set_then_get_path() {
        let state = state();

        let reply = handle(&state, "set-path", " /tmp/project ").await;
        assert!(reply.contains("/tmp/project"));

        let reply = handle(&state, "path", "").await;
        assert!(reply.contains("/tmp/project"));
    }

    #[tokio::test]
    async fn set_path_requires_an_argument() {
        let state = state();
        let reply = handle(&state, "set-path", "  ").await;
        assert!(reply.contains("usage"));
        assert_eq!(state.config.project_path().await, None);
    }

    #[tokio::test]
    async fn list_shows_recent_jobs() {
        let state = state();
        state
            .store
            .create(&JobRecord::new("aaaabbbb-0000", "fix the bug", "", "U1", "alice"))
            .await
            .unwrap();

        let reply = handle(&state, "list", "").await;
        assert!(reply.contains("aaaabbbb"));
        assert!(reply.contains("fix the bug"));
        assert!(reply.contains("pending"));
    }

    #[tokio::test]
    async fn show_resolves_id_prefix() {
        let state = state();
        state
            .store
            .create(&JobRecord::new(
                "deadbeef-1111-2222-3333-444455556666",
                "fix it",
                "",
                "",
                "",
            ))
            .await
            .unwrap();
        state.store.set_result("deadbeef-1111-2222-3333-444455556666", "all good", "").await.unwrap();

        let reply = handle(&state, "show", "deadbeef").await;
        assert!(reply.contains("fix it"));
        assert!(reply.contains("all good"));

        let reply = handle(&state, "show", "ffffffff").await;
        assert!(reply.contains("no job found"));
    }

    #[tokio::test]
    async fn help_lists_commands() {
        let state = state();
        let reply = handle(&state, "help", "").await;
        assert!(reply.contains("set-path"));
        assert!(reply.contains("/cursor"));
    }
}
