use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Cert,
    Key,
}

impl FileKind {
    pub fn of(filename: &str) -> Self {
        if filename.ends_with("-key.pem") {
            FileKind::Key
        } else {
            FileKind::Cert
        }
    }
}

/// One `.pem`/`.crt` file found under the certificates root.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateFile {
    pub filename: String,
    /// Path relative to the certificates root, `/` separated.
    pub relative_path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub expiry: Option<DateTime<Utc>>,
    pub domains: Vec<String>,
    pub fingerprint: Option<String>,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub folder: Option<String>,
    pub folder_date: Option<String>,
    pub is_archived: bool,
    pub is_interface_ssl: bool,
    pub can_edit: bool,
}

/// A certificate and its key, grouped by base name within one directory.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateGroup {
    pub name: String,
    pub cert: Option<CertificateFile>,
    pub key: Option<CertificateFile>,
    pub domains: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub fingerprint: Option<String>,
    pub folder: Option<String>,
    pub folder_date: Option<String>,
    pub is_archived: bool,
    pub is_interface_ssl: bool,
    pub can_edit: bool,
}

#[derive(Debug, Serialize)]
pub struct CertificateDetails {
    pub filename: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub expiry: Option<DateTime<Utc>>,
    pub domains: Vec<String>,
    pub fingerprint: Option<String>,
    #[serde(rename = "type")]
    pub kind: FileKind,
}

#[derive(Debug, Serialize)]
pub struct RootCaInfo {
    pub ca_root: String,
    pub subject: String,
    pub issuer: String,
    pub expiry: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
    pub fingerprint: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub command: Option<String>,
    pub input: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandInfo {
    pub name: &'static str,
    pub key: &'static str,
    pub description: &'static str,
    pub dangerous: bool,
    pub has_input: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_placeholder: Option<&'static str>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PfxRequest {
    pub password: Option<String>,
    pub legacy: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum BundleFormat {
    #[default]
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl BundleFormat {
    pub fn extension(self) -> &'static str {
        match self {
            BundleFormat::Zip => "zip",
            BundleFormat::TarGz => "tar.gz",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            BundleFormat::Zip => "application/zip",
            BundleFormat::TarGz => "application/gzip",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BundleQuery {
    #[serde(default)]
    pub format: BundleFormat,
}
