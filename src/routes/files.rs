use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::services::file_service;
use crate::state::AppState;

/// Form field carrying the uploaded file.
const UPLOAD_FIELD: &str = "certificate";

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<Value>), AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| AppError::BadRequest("Uploaded file has no filename".into()))?;
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, data));
        break;
    }
    let (filename, data) = upload.ok_or_else(|| AppError::BadRequest("No file uploaded".into()))?;

    let meta = file_service::upload_file(&state, &filename, data).await?;

    tracing::info!(
        filename = %meta.filename,
        size = meta.size,
        "File uploaded"
    );

    let mut resp_headers = HeaderMap::new();
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        resp_headers.insert(header::ETAG, etag);
    }

    Ok((
        StatusCode::CREATED,
        resp_headers,
        Json(json!({
            "data": {
                "message": "File uploaded successfully",
                "file": meta,
            },
            "error": null
        })),
    ))
}

pub async fn list_files(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let files = file_service::list_files(&state).await?;
    Ok(Json(json!({
        "data": {
            "total": files.len(),
            "files": files,
        },
        "error": null
    })))
}

pub async fn file_content(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<Value>, AppError> {
    let content = file_service::read_content(&state, &filename).await?;
    Ok(Json(json!({ "data": content, "error": null })))
}
