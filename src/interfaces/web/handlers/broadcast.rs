use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::info;

use crate::core::broadcast::{
    BroadcastError, BroadcastRequest, Button, ConnectDecision, ImagePayload, normalize_recipients,
};
use crate::core::templates::request_from_template;
use crate::interfaces::web::AppState;

type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Recipients arrive either as pasted text (one per line) or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumbersInput {
    Text(String),
    List(Vec<String>),
}

impl Default for NumbersInput {
    fn default() -> Self {
        NumbersInput::List(Vec::new())
    }
}

impl NumbersInput {
    /// Raw entries; the dispatcher normalizes them at admission.
    pub fn into_entries(self) -> Vec<String> {
        match self {
            NumbersInput::Text(text) => text.lines().map(str::to_string).collect(),
            NumbersInput::List(list) => list,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBroadcastBody {
    #[serde(default)]
    pub numbers: NumbersInput,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub buttons: Option<Vec<Button>>,
    #[serde(default, alias = "delay")]
    pub delay_secs: Option<u64>,
    /// `data:<mime>;base64,<payload>`
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, alias = "template_id")]
    pub template_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NormalizeBody {
    pub text: String,
}

#[derive(Debug)]
pub(crate) enum IntakeError {
    TemplateNotFound(String),
    Storage(String),
    Rejected(BroadcastError),
}

impl IntakeError {
    pub(crate) fn into_response(self) -> ApiResponse {
        match self {
            IntakeError::TemplateNotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "success": false,
                    "code": "template_not_found",
                    "error": format!("Template '{}' not found", id)
                })),
            ),
            IntakeError::Storage(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "error": e })),
            ),
            IntakeError::Rejected(e) => rejection(&e),
        }
    }
}

pub(crate) fn rejection_status(err: &BroadcastError) -> StatusCode {
    match err {
        BroadcastError::AlreadyRunning | BroadcastError::NotConnected => StatusCode::CONFLICT,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn rejection(err: &BroadcastError) -> ApiResponse {
    (
        rejection_status(err),
        Json(serde_json::json!({
            "success": false,
            "code": err.code(),
            "error": err.to_string()
        })),
    )
}

/// Resolves an intake body (and its optional template) into a request.
/// Explicit body fields win over the template's.
pub(crate) async fn build_request(
    state: &AppState,
    body: StartBroadcastBody,
) -> Result<BroadcastRequest, IntakeError> {
    let delay_secs = body.delay_secs.unwrap_or(state.default_delay_secs);
    let recipients = body.numbers.into_entries();

    let mut request = match body.template_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => {
            let template = state
                .templates
                .get(&id)
                .await
                .map_err(|e| IntakeError::Storage(e.to_string()))?
                .ok_or(IntakeError::TemplateNotFound(id))?;
            request_from_template(&template, recipients, delay_secs)
        }
        None => BroadcastRequest::new(recipients, String::new()).with_delay_secs(delay_secs),
    };

    if let Some(message) = body.message.filter(|m| !m.trim().is_empty()) {
        request.message = message;
    }
    if let Some(footer) = body.footer {
        request = request.with_footer(footer);
    }
    if let Some(buttons) = body.buttons.filter(|b| !b.is_empty()) {
        request = request.with_buttons(buttons);
    }
    if let Some(data_url) = body.image.filter(|i| !i.trim().is_empty()) {
        let image = ImagePayload::from_data_url(&data_url).map_err(IntakeError::Rejected)?;
        request = request.with_image(image);
    }
    Ok(request)
}

pub async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "provider": state.engine.provider_name(),
        "snapshot": state.engine.snapshot()
    }))
}

pub async fn connect_endpoint(State(state): State<AppState>) -> ApiResponse {
    match state.engine.connect().await {
        Ok(decision) => {
            let outcome = match decision {
                ConnectDecision::Proceed => "connecting",
                ConnectDecision::AlreadyConnected => "already_connected",
                ConnectDecision::InProgress => "in_progress",
            };
            (
                StatusCode::OK,
                Json(serde_json::json!({ "success": true, "outcome": outcome })),
            )
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        ),
    }
}

pub async fn start_broadcast_endpoint(
    State(state): State<AppState>,
    Json(body): Json<StartBroadcastBody>,
) -> ApiResponse {
    let request = match build_request(&state, body).await {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state.engine.start(request) {
        Ok(handle) => {
            info!("Broadcast {} accepted for {} recipient(s)", handle.run_tag, handle.total);
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "success": true,
                    "runTag": handle.run_tag,
                    "total": handle.total
                })),
            )
        }
        Err(e) => rejection(&e),
    }
}

pub async fn stop_broadcast_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stopped = state.engine.stop();
    Json(serde_json::json!({ "success": true, "stopped": stopped }))
}

pub async fn close_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let closed = state.engine.close();
    Json(serde_json::json!({ "success": true, "closed": closed }))
}

pub async fn normalize_endpoint(Json(body): Json<NormalizeBody>) -> Json<serde_json::Value> {
    let list = normalize_recipients(&body.text);
    Json(serde_json::json!({ "count": list.len(), "numbers": list.numbers }))
}
