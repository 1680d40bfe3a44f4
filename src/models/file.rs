use chrono::{DateTime, Utc};
use serde::Serialize;

/// A `.pem` file stored in the uploads directory.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub etag: String,
}

#[derive(Debug, Serialize)]
pub struct FileContent {
    pub filename: String,
    pub content: String,
    pub size: usize,
}
