use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::certificate::PfxRequest;
use crate::routes::downloads::download_response;
use crate::services::certificate_service;
use crate::state::AppState;

pub async fn archive_certificate(
    State(state): State<AppState>,
    Path((folder, certname)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    certificate_service::archive_certificate(&state, &folder, &certname).await?;
    Ok(Json(json!({
        "data": { "message": "Certificate archived successfully" },
        "error": null
    })))
}

pub async fn restore_certificate(
    State(state): State<AppState>,
    Path((folder, certname)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    certificate_service::restore_certificate(&state, &folder, &certname).await?;
    Ok(Json(json!({
        "data": { "message": "Certificate restored successfully" },
        "error": null
    })))
}

/// The body is optional; an empty request exports without a password.
pub async fn export_pfx(
    State(state): State<AppState>,
    Path((folder, certname)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, AppError> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        PfxRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid PFX request: {}", e)))?
    };

    let download = certificate_service::export_pfx(&state, &folder, &certname, req).await?;
    download_response(download)
}
