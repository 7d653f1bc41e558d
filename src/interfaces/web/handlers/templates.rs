use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::core::broadcast::Template;
use crate::interfaces::web::AppState;

pub async fn list_templates(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.templates.list().await {
        Ok(templates) => Json(serde_json::json!({ "success": true, "templates": templates })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn get_template(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.templates.get(&id).await {
        Ok(Some(template)) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "template": template })),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "success": false, "error": "Template not found" })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        ),
    }
}

pub async fn save_template(
    State(state): State<AppState>,
    Json(payload): Json<Template>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.templates.save(payload).await {
        Ok(template) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "template": template })),
        ),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        ),
    }
}

pub async fn delete_template(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.templates.delete(&id).await {
        Ok(true) => Json(serde_json::json!({ "success": true, "message": "Template deleted" })),
        Ok(false) => Json(serde_json::json!({ "success": false, "error": "Template not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
