//! HTTP handlers for the Slack surface and the JSON API.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{commands, AppState};
use crate::store::{JobRecord, JobStatus, JobStore};
use crate::worker::Job;

/// Polling cadence of the synchronous API adapter.
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wall-clock bound of the synchronous API adapter; mirrors the agent
/// deadline.
const SYNC_WAIT_LIMIT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Deserialize)]
pub struct SlackCommandPayload {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub response_url: String,
    #[serde(default)]
    pub trigger_id: String,
}

#[derive(Debug, Serialize)]
pub struct SlackResponse {
    pub response_type: &'static str,
    pub text: String,
}

impl SlackResponse {
    fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: "ephemeral",
            text: text.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `POST /slack/cursor`: the slash command. Sub-commands answer inline;
/// everything else is ACKed within the 3-second budget and enqueued from a
/// detached task.
pub async fn slash_cursor(
    State(state): State<AppState>,
    Form(payload): Form<SlackCommandPayload>,
) -> Json<SlackResponse> {
    let text = payload.text.trim();
    let (word, rest) = split_first_word(text);
    if commands::is_sub_command(word) {
        let reply = commands::handle(&state, word, rest).await;
        return Json(SlackResponse::ephemeral(reply));
    }

    let job_id = Uuid::new_v4().to_string();
    tracing::info!(job_id = %job_id, user = %payload.user_id, "slash command accepted");

    let job = Job::new(&job_id, text)
        .with_user(&payload.user_id, &payload.user_name)
        .with_response_url(&payload.response_url);
    submit_detached(&state, job);

    let who = if payload.user_name.is_empty() {
        "your".to_string()
    } else {
        format!("{}'s", payload.user_name)
    };
    Json(SlackResponse::ephemeral(format!(
        "⏳ accepted {} request, working on it… (job `{}`)",
        who,
        &job_id[..8],
    )))
}

/// `POST /slack/cursor/options`: static autocomplete options.
pub async fn slash_options() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "options": [
            { "text": { "type": "plain_text", "text": "help — show usage" }, "value": "help" },
            { "text": { "type": "plain_text", "text": "list — recent jobs" }, "value": "list" },
            { "text": { "type": "plain_text", "text": "show — one job's result" }, "value": "show " },
            { "text": { "type": "plain_text", "text": "path — show project path" }, "value": "path" },
            { "text": { "type": "plain_text", "text": "set-path — set project path" }, "value": "set-path " },
        ]
    }))
}

#[derive(Debug, Deserialize)]
pub struct ApiCursorRequest {
    pub prompt: String,
    #[serde(default, rename = "async")]
    pub run_async: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiCursorResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub job_id: String,
}

/// `POST /api/cursor`: JSON submission. The record is pre-created so
/// callers can observe `pending` immediately; the executor's own create is
/// idempotent. `async=false` turns into a polling wait on the store.
pub async fn api_cursor(
    State(state): State<AppState>,
    Json(req): Json<ApiCursorRequest>,
) -> (StatusCode, Json<ApiCursorResponse>) {
    let job_id = Uuid::new_v4().to_string();
    tracing::info!(job_id = %job_id, run_async = req.run_async, "API cursor request");

    let project_path = state.config.project_path().await.unwrap_or_default();
    let record = JobRecord::new(&job_id, req.prompt.trim(), &project_path, "", "");
    if let Err(e) = state.store.create(&record).await {
        tracing::error!(job_id = %job_id, "failed to pre-create job record: {e}");
    }

    submit_detached(&state, Job::new(&job_id, &req.prompt));

    if req.run_async {
        return (
            StatusCode::OK,
            Json(ApiCursorResponse {
                status: "accepted",
                message: "job accepted; poll GET /api/jobs/{id} for the result".to_string(),
                output: None,
                job_id,
            }),
        );
    }

    // Synchronous-over-asynchronous adapter: poll until a terminal record
    // appears or the wall clock runs out.
    let deadline = tokio::time::Instant::now() + SYNC_WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(SYNC_POLL_INTERVAL).await;
        match state.store.get(&job_id).await {
            Ok(Some(rec)) if rec.status.is_terminal() => {
                return terminal_response(rec);
            }
            Ok(_) => {}
            Err(e) => tracing::error!(job_id = %job_id, "polling failed: {e}"),
        }
    }

    (
        StatusCode::GATEWAY_TIMEOUT,
        Json(ApiCursorResponse {
            status: "timeout",
            message: "job did not finish within 15 minutes; poll GET /api/jobs/{id}".to_string(),
            output: None,
            job_id,
        }),
    )
}

fn terminal_response(rec: JobRecord) -> (StatusCode, Json<ApiCursorResponse>) {
    match rec.status {
        JobStatus::Completed => (
            StatusCode::OK,
            Json(ApiCursorResponse {
                status: "success",
                message: "agent run completed".to_string(),
                output: Some(rec.output),
                job_id: rec.id,
            }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiCursorResponse {
                status: "error",
                message: rec.error,
                output: Some(rec.output),
                job_id: rec.id,
            }),
        ),
    }
}

/// Enqueue from a spawned task so the caller's response is never delayed by
/// queue backpressure. A failed submit is recoverable: the ACK is already
/// out, so we log and mark any pre-created record failed instead of leaving
/// it pending forever.
fn submit_detached(state: &AppState, job: Job) {
    let queue = state.queue.clone();
    let store = Arc::clone(&state.store);
    tokio::spawn(async move {
        let job_id = job.id.clone();
        if let Err(e) = queue.submit(job).await {
            tracing::warn!(job_id = %job_id, "job not enqueued: {e}");
            let _ = store
                .set_result(&job_id, "", "server is shutting down; job was not enqueued")
                .await;
            let _ = store.transition_status(&job_id, JobStatus::Failed).await;
        }
    });
}

fn split_first_word(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest),
        None => (text, ""),
    }
}

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub status: Option<String>,
}

/// `GET /api/jobs`: newest first, with optional status filter.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<JobRecord>>, (StatusCode, Json<ErrorResponse>)> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(JobStatus::parse(raw).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("unknown status {raw:?}"),
                }),
            )
        })?),
    };

    state
        .store
        .list(query.limit.unwrap_or(10), query.offset.unwrap_or(0), status)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("failed to list jobs: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to list jobs".to_string(),
                }),
            )
        })
}

/// `GET /api/jobs/{id}`.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.get(&id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "job not found".to_string(),
            }),
        )),
        Err(e) => {
            tracing::error!(job_id = %id, "failed to fetch job: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to fetch job".to_string(),
                }),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProjectPathRequest {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectPathResponse {
    pub path: String,
    pub is_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `GET /api/config/project-path`.
pub async fn get_project_path(State(state): State<AppState>) -> Json<ProjectPathResponse> {
    match state.config.project_path().await {
        Some(path) => Json(ProjectPathResponse {
            path,
            is_set: true,
            message: None,
        }),
        None => Json(ProjectPathResponse {
            path: String::new(),
            is_set: false,
            message: Some("project path is not set; POST a path to this endpoint".to_string()),
        }),
    }
}

/// `POST /api/config/project-path`.
pub async fn set_project_path(
    State(state): State<AppState>,
    Json(req): Json<ProjectPathRequest>,
) -> Result<Json<ProjectPathResponse>, (StatusCode, Json<ErrorResponse>)> {
    let path = req.path.trim();
    if path.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "path must not be empty".to_string(),
            }),
        ));
    }

    state.config.set_project_path(path.to_string()).await;
    tracing::info!(%path, "project path set via API");
    Ok(Json(ProjectPathResponse {
        path: path.to_string(),
        is_set: true,
        message: Some("project path updated".to_string()),
    }))
}

/// `GET /health`.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
