use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::models::certificate::BundleQuery;
use crate::services::certificate_service::{self, Download};
use crate::services::file_service;
use crate::state::AppState;

fn content_type_for(name: &str) -> String {
    if name.ends_with(".pem") {
        "application/x-pem-file".to_string()
    } else {
        mime_guess::from_path(name)
            .first_or_octet_stream()
            .to_string()
    }
}

/// Stream a file from disk as an attachment named `download_name`.
pub(crate) async fn file_response(
    path: &std::path::Path,
    download_name: &str,
) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(download_name))
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download_name),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

pub(crate) fn download_response(download: Download) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, download.content_type)
        .header(header::CONTENT_LENGTH, download.data.len().to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.filename),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(download.data))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

pub async fn cert_file(
    State(state): State<AppState>,
    Path((folder, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let path = certificate_service::folder_file(&state, &folder, &filename).await?;
    file_response(&path, &filename).await
}

pub async fn key_file(
    State(state): State<AppState>,
    Path((folder, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let path = certificate_service::folder_file(&state, &folder, &filename)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("Key file not found".into()),
            other => other,
        })?;
    tracing::info!(folder = %folder, filename = %filename, "Private key downloaded");
    file_response(&path, &filename).await
}

pub async fn bundle(
    State(state): State<AppState>,
    Path((folder, certname)): Path<(String, String)>,
    Query(query): Query<BundleQuery>,
) -> Result<Response, AppError> {
    let download = certificate_service::bundle(&state, &folder, &certname, query.format).await?;
    download_response(download)
}

pub async fn root_ca(State(state): State<AppState>) -> Result<Response, AppError> {
    let path = certificate_service::root_ca_path(&state).await?;
    file_response(&path, "mkcert-rootCA.pem").await
}

pub async fn uploaded_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let path = file_service::existing_upload(&state, &filename).await?;
    file_response(&path, &filename).await
}
