use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;

pub(crate) fn is_loopback(host: &str) -> bool {
    host == "127.0.0.1" || host == "::1" || host == "localhost"
}

pub async fn require_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // No token configured → allow open access only on loopback (safe for local dev)
    let Some(expected) = state.api_token.as_deref() else {
        if is_loopback(&state.api_host) {
            return next.run(req).await;
        }
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "No api_token configured. Set server.api_token before exposing on a non-loopback address."
            })),
        )
            .into_response();
    };

    let raw_token = bearer_token(&req).or_else(|| query_token(&req));
    match raw_token {
        Some(token) if token == expected => next.run(req).await,
        Some(_) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid or unauthorized API token" })),
        )
            .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Missing or invalid Authorization header. Use: Bearer <token>" })),
        )
            .into_response(),
    }
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Browsers cannot set headers on a WebSocket upgrade, so `?token=` is
/// accepted as well.
fn query_token(req: &Request<Body>) -> Option<String> {
    req.uri().query().and_then(|query| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "token")
            .and_then(|(_, value)| urlencoding::decode(value).ok())
            .map(|value| value.into_owned())
    })
}
