use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::auth;
use super::handlers::{broadcast, events, templates};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(broadcast::get_status))
        .route("/api/connect", post(broadcast::connect_endpoint))
        .route(
            "/api/broadcast/start",
            post(broadcast::start_broadcast_endpoint),
        )
        .route(
            "/api/broadcast/stop",
            post(broadcast::stop_broadcast_endpoint),
        )
        .route("/api/close", post(broadcast::close_endpoint))
        .route(
            "/api/recipients/normalize",
            post(broadcast::normalize_endpoint),
        )
        .route(
            "/api/templates",
            get(templates::list_templates).post(templates::save_template),
        )
        .route(
            "/api/templates/{id}",
            get(templates::get_template).delete(templates::delete_template),
        )
        .route("/api/events", get(events::ws_handler))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'"),
    );
    response
}
