use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::certificate::ExecuteRequest;
use crate::services::certificate_service;
use crate::state::AppState;

pub async fn list_commands() -> Json<Value> {
    Json(json!({
        "data": { "commands": certificate_service::command_catalogue() },
        "error": null
    }))
}

pub async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<Value>, AppError> {
    let result = certificate_service::execute(&state, req).await?;
    Ok(Json(json!({ "data": result, "error": null })))
}

pub async fn list_certificates(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let certificates = certificate_service::list_certificates(&state).await?;
    Ok(Json(json!({
        "data": {
            "total": certificates.len(),
            "certificates": certificates,
        },
        "error": null
    })))
}

pub async fn get_certificate(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, AppError> {
    let details = certificate_service::certificate_details(&state, &path).await?;
    Ok(Json(json!({ "data": details, "error": null })))
}

pub async fn delete_certificate(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, AppError> {
    let removed = certificate_service::delete_certificate(&state, &path).await?;
    Ok(Json(json!({
        "data": {
            "message": "Certificate deleted successfully",
            "removed": removed,
        },
        "error": null
    })))
}

pub async fn rootca_info(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let info = certificate_service::root_ca_info(&state).await?;
    Ok(Json(json!({ "data": info, "error": null })))
}
