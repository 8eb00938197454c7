//! HTTP ingress: authentication, command parsing, admission, job queries.

mod auth;
mod commands;
mod handlers;
mod port;

pub use auth::slack_auth_middleware;
pub use port::ensure_port_available;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::config::AppConfig;
use crate::store::JobStore;
use crate::worker::JobQueue;

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn JobStore>,
    pub queue: JobQueue,
}

/// Build the full router. The Slack group sits behind the signature
/// middleware; the JSON API is open (development surface).
pub fn router(state: AppState) -> Router {
    let slack = Router::new()
        .route("/slack/cursor", post(handlers::slash_cursor))
        .route("/slack/cursor/options", post(handlers::slash_options))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::slack_auth_middleware,
        ));

    let api = Router::new()
        .route("/api/cursor", post(handlers::api_cursor))
        .route("/api/jobs", get(handlers::list_jobs))
        .route("/api/jobs/{id}", get(handlers::get_job))
        .route(
            "/api/config/project-path",
            get(handlers::get_project_path).post(handlers::set_project_path),
        );

    Router::new()
        .merge(slack)
        .merge(api)
        .route("/health", get(handlers::health))
        .with_state(state)
}
