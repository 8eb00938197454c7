//! Slack request signature verification.
//!
//! Every request on the slash-command surface must carry
//! `X-Slack-Request-Timestamp` and `X-Slack-Signature`. The signature is
//! `v0=` + hex(HMAC-SHA256(secret, `v0:<timestamp>:<raw body>`)). The body
//! is buffered here and restored so the handler can re-parse the form.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::AppState;

/// Maximum accepted age of the request timestamp (replay defense).
const MAX_TIMESTAMP_AGE_SECS: i64 = 5 * 60;

/// Upper bound when buffering request bodies.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn slack_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();

    let timestamp = parts
        .headers
        .get("x-slack-request-timestamp")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let age = chrono::Utc::now().timestamp() - timestamp;
    if age > MAX_TIMESTAMP_AGE_SECS {
        tracing::warn!(age_secs = age, "rejecting request with stale timestamp");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let signature = parts
        .headers
        .get("x-slack-signature")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let expected = sign(state.config.signing_secret.expose_secret(), timestamp, &bytes);
    if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        tracing::warn!("rejecting request with signature mismatch");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

/// Compute the `v0=` signature over a timestamp and raw body.
fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    format!("v0={}", hex_encode(&mac.finalize().into_bytes()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::Request as HttpRequest;
    use axum::routing::post;
    use axum::Router;
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;
    use crate::store::SqliteStore;
    use crate::worker::JobQueue;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    fn protected_router() -> Router {
        let config = AppConfig::new(SecretString::new(SECRET.to_string()), None);
        let (queue, _rx) = JobQueue::new(2);
        let state = AppState {
            config,
            store: Arc::new(SqliteStore::open_in_memory().unwrap()),
            queue,
        };
        Router::new()
            .route("/slack/cursor", post(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                slack_auth_middleware,
            ))
            .with_state(state)
    }

    fn signed_request(body: &str, timestamp: i64, signature: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri("/slack/cursor")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("x-slack-request-timestamp", timestamp.to_string())
            .header("x-slack-signature", signature)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn valid_signature_passes() {
        let body = "text=hello&user_id=U1";
        let ts = chrono::Utc::now().timestamp();
        let sig = sign(SECRET, ts, body.as_bytes());

        let resp = protected_router()
            .oneshot(signed_request(body, ts, &sig))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let body = "text=hello";
        let ts = chrono::Utc::now().timestamp() - 10 * 60;
        let sig = sign(SECRET, ts, body.as_bytes());

        let resp = protected_router()
            .oneshot(signed_request(body, ts, &sig))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tampered_body_is_rejected() {
        let ts = chrono::Utc::now().timestamp();
        let sig = sign(SECRET, ts, b"text=hello");

        let resp = protected_router()
            .oneshot(signed_request("text=evil", ts, &sig))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let body = "text=hello";
        let ts = chrono::Utc::now().timestamp();
        let sig = sign("some-other-secret", ts, body.as_bytes());

        let resp = protected_router()
            .oneshot(signed_request(body, ts, &sig))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_headers_are_rejected() {
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/slack/cursor")
            .body(Body::from("text=hello"))
            .unwrap();

        let resp = protected_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn signature_shape_matches_slack() {
        let sig = sign(SECRET, 1_531_420_618, b"token=x&team_id=T1");
        assert!(sig.starts_with("v0="));
        assert_eq!(sig.len(), 3 + 64);
    }
}
