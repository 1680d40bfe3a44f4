use crate::error::AppError;
use crate::models::file::{FileContent, UploadedFile};
use crate::sandbox::path_validator;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

fn uploads_dir(state: &AppState) -> Result<PathBuf, AppError> {
    path_validator::absolute_base(&state.config.uploaded_dir())
}

fn etag_of(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Validated location of `filename` inside the uploads directory.
pub fn resolve_upload(state: &AppState, filename: &str) -> Result<PathBuf, AppError> {
    let filename = state.policy.filenames.validate_pem(filename)?;
    Ok(state
        .policy
        .paths
        .sanitize(&filename, &uploads_dir(state)?)?
        .resolved)
}

pub async fn upload_file(
    state: &AppState,
    filename: &str,
    data: bytes::Bytes,
) -> Result<UploadedFile, AppError> {
    let file_path = resolve_upload(state, filename)?;

    if data.is_empty() {
        return Err(AppError::BadRequest("No file uploaded".into()));
    }
    let file_size = data.len() as u64;
    if file_size > state.config.max_upload_size {
        return Err(AppError::PayloadTooLarge(format!(
            "File size {} exceeds max upload size {}",
            file_size, state.config.max_upload_size
        )));
    }

    if let Some(parent) = file_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Write next to the target and rename so readers never see a partial file.
    let tmp_path = file_path.with_extension(format!("upload-{}", uuid::Uuid::new_v4().simple()));
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(&data).await?;
    file.flush().await?;
    drop(file);
    if let Err(e) = tokio::fs::rename(&tmp_path, &file_path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    let meta = tokio::fs::metadata(&file_path).await?;
    Ok(UploadedFile {
        filename: filename.to_string(),
        size: file_size,
        modified: meta.modified().map(DateTime::<Utc>::from)?,
        etag: etag_of(&data),
    })
}

pub async fn list_files(state: &AppState) -> Result<Vec<UploadedFile>, AppError> {
    let dir = uploads_dir(state)?;
    let mut files = Vec::new();
    if !tokio::fs::try_exists(&dir).await? {
        return Ok(files);
    }

    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let filename = entry.file_name().to_string_lossy().into_owned();
        if !filename.ends_with(".pem") || !entry.file_type().await?.is_file() {
            continue;
        }
        let data = tokio::fs::read(entry.path()).await?;
        let meta = entry.metadata().await?;
        files.push(UploadedFile {
            filename,
            size: meta.len(),
            modified: meta.modified().map(DateTime::<Utc>::from)?,
            etag: etag_of(&data),
        });
    }

    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

/// Existing uploaded file, for content views and downloads.
pub async fn existing_upload(state: &AppState, filename: &str) -> Result<PathBuf, AppError> {
    let path = resolve_upload(state, filename)?;
    if !tokio::fs::try_exists(&path).await? {
        return Err(AppError::NotFound(format!("File '{}' not found", filename)));
    }
    Ok(path)
}

pub async fn read_content(state: &AppState, filename: &str) -> Result<FileContent, AppError> {
    let path = existing_upload(state, filename).await?;
    let bytes = tokio::fs::read(&path).await?;
    let content = String::from_utf8(bytes)
        .map_err(|_| AppError::BadRequest("File is not valid UTF-8 text".into()))?;
    Ok(FileContent {
        filename: filename.to_string(),
        size: content.len(),
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etags_are_sha256_hex() {
        assert_eq!(
            etag_of(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
