use crate::error::AppError;
use crate::models::certificate::{
    BundleFormat, CertificateDetails, CertificateFile, CertificateGroup, CommandInfo,
    ExecuteRequest, ExecuteResponse, FileKind, PfxRequest, RootCaInfo,
};
use crate::sandbox::cert_command::CertCommand;
use crate::sandbox::executor::CommandOutput;
use crate::sandbox::path_validator;
use crate::services::command_service;
use crate::state::AppState;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;

pub const ARCHIVE_DIR: &str = "archive";
pub const UPLOADED_DIR: &str = "uploaded";
const ROOT_FOLDERS: [&str; 2] = ["interface-ssl", "legacy"];
const X509_INSPECT_FLAGS: [&str; 6] = [
    "-subject",
    "-issuer",
    "-enddate",
    "-fingerprint",
    "-sha256",
    "-text",
];

static DATE_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));
static DOMAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w*][\w.*-]*$").expect("valid regex"));
static NOT_AFTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^notAfter=(.+)$").expect("valid regex"));
static FINGERPRINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^sha256 Fingerprint=(.+)$").expect("valid regex"));
static SUBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^subject=\s*(.+)$").expect("valid regex"));
static ISSUER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^issuer=\s*(.+)$").expect("valid regex"));
static COMMON_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Subject:.*CN\s*=\s*([^,\n]+)").expect("valid regex"));
static SUBJECT_ALT_NAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"X509v3 Subject Alternative Name:[^\n]*\n\s*([^\n]+)").expect("valid regex")
});

/// Fields extracted from `openssl x509 -noout ...` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub fingerprint: Option<String>,
    pub domains: Vec<String>,
}

pub fn parse_x509_output(text: &str) -> CertificateInfo {
    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let mut domains: Vec<String> = Vec::new();
    if let Some(cn) = capture(&COMMON_NAME) {
        domains.push(cn);
    }
    if let Some(sans) = capture(&SUBJECT_ALT_NAMES) {
        for san in sans.split(',') {
            if let Some(name) = san.trim().strip_prefix("DNS:") {
                let name = name.trim().to_string();
                if !domains.contains(&name) {
                    domains.push(name);
                }
            }
        }
    }

    CertificateInfo {
        subject: capture(&SUBJECT),
        issuer: capture(&ISSUER),
        expiry: capture(&NOT_AFTER).and_then(|raw| parse_openssl_date(&raw)),
        fingerprint: capture(&FINGERPRINT),
        domains,
    }
}

/// Parses OpenSSL's `Jan  5 12:34:56 2026 GMT` timestamp format.
pub fn parse_openssl_date(raw: &str) -> Option<DateTime<Utc>> {
    let collapsed = raw
        .trim()
        .trim_end_matches("GMT")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    NaiveDateTime::parse_from_str(&collapsed, "%b %d %H:%M:%S %Y")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Whole days until `expiry`, rounded up.
pub fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    const DAY_MS: i64 = 86_400_000;
    let ms = (expiry - now).num_milliseconds();
    let days = ms / DAY_MS;
    if ms % DAY_MS > 0 {
        days + 1
    } else {
        days
    }
}

/// `name.pem` and `name-key.pem` both group under `name`.
pub fn base_name(filename: &str) -> &str {
    filename
        .strip_suffix("-key.pem")
        .or_else(|| filename.strip_suffix(".pem"))
        .unwrap_or(filename)
}

pub fn companion_name(filename: &str) -> Option<String> {
    if let Some(stem) = filename.strip_suffix("-key.pem") {
        Some(format!("{stem}.pem"))
    } else {
        filename
            .strip_suffix(".pem")
            .map(|stem| format!("{stem}-key.pem"))
    }
}

fn is_certificate_file(name: &str) -> bool {
    name.ends_with(".pem") || name.ends_with(".crt")
}

/// Where a file sits in the certificates tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub folder: Option<String>,
    pub folder_date: Option<String>,
    pub is_archived: bool,
    pub is_interface_ssl: bool,
    pub can_edit: bool,
}

pub fn placement(relative_path: &str) -> Placement {
    let parts: Vec<&str> = relative_path.split('/').collect();
    let folder = (parts.len() > 1).then(|| parts[0].to_string());
    let folder_date = folder
        .as_deref()
        .filter(|f| DATE_FOLDER.is_match(f))
        .map(str::to_string);
    let is_interface_ssl = parts.len() == 1;
    Placement {
        is_archived: parts.contains(&ARCHIVE_DIR),
        can_edit: parts[0] != UPLOADED_DIR && !is_interface_ssl,
        folder,
        folder_date,
        is_interface_ssl,
    }
}

#[derive(Debug, Clone)]
pub struct FoundFile {
    pub name: String,
    pub full_path: PathBuf,
    /// `/`-separated path relative to the scanned root.
    pub relative_path: String,
}

/// Recursively collect `.pem`/`.crt` files under `root`. Symlinks are skipped.
pub async fn find_certificate_files(root: &Path) -> Result<Vec<FoundFile>, AppError> {
    let mut found = Vec::new();
    if !tokio::fs::try_exists(root).await? {
        return Ok(found);
    }

    let mut pending = vec![(root.to_path_buf(), String::new())];
    while let Some((dir, rel)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative_path = if rel.is_empty() {
                name.clone()
            } else {
                format!("{rel}/{name}")
            };
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push((entry.path(), relative_path));
            } else if file_type.is_file() && is_certificate_file(&name) {
                found.push(FoundFile {
                    name,
                    full_path: entry.path(),
                    relative_path,
                });
            }
        }
    }

    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(found)
}

pub fn certificates_root(state: &AppState) -> Result<PathBuf, AppError> {
    path_validator::absolute_base(&state.config.certificates_dir())
}

/// Run openssl against one certificate file and parse what it reports.
pub async fn inspect(state: &AppState, path: &Path) -> Result<CertificateInfo, AppError> {
    let output = command_service::run(
        state,
        &CertCommand::X509 {
            input: path.to_path_buf(),
            flags: X509_INSPECT_FLAGS.to_vec(),
        },
    )
    .await?;
    Ok(parse_x509_output(&output.stdout))
}

async fn inspect_or_default(state: &AppState, path: &Path) -> CertificateInfo {
    match inspect(state, path).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not read certificate details");
            CertificateInfo::default()
        }
    }
}

async fn describe(state: &AppState, file: &FoundFile) -> Result<CertificateFile, AppError> {
    let meta = tokio::fs::metadata(&file.full_path).await?;
    let kind = FileKind::of(&file.name);
    let info = match kind {
        FileKind::Cert => inspect_or_default(state, &file.full_path).await,
        FileKind::Key => CertificateInfo::default(),
    };
    let place = placement(&file.relative_path);

    Ok(CertificateFile {
        filename: file.name.clone(),
        relative_path: file.relative_path.clone(),
        size: meta.len(),
        modified: meta.modified().map(DateTime::<Utc>::from)?,
        expiry: info.expiry,
        domains: info.domains,
        fingerprint: info.fingerprint,
        kind,
        folder: place.folder,
        folder_date: place.folder_date,
        is_archived: place.is_archived,
        is_interface_ssl: place.is_interface_ssl,
        can_edit: place.can_edit,
    })
}

/// Every certificate under the root, cert and key grouped per directory.
pub async fn list_certificates(state: &AppState) -> Result<Vec<CertificateGroup>, AppError> {
    let root = certificates_root(state)?;
    let files = find_certificate_files(&root).await?;

    let mut groups: BTreeMap<(String, String), CertificateGroup> = BTreeMap::new();
    for file in &files {
        let entry = match describe(state, file).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %file.relative_path, error = %e, "Skipping unreadable certificate file");
                continue;
            }
        };

        let dir = file
            .relative_path
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_default();
        let name = base_name(&entry.filename).to_string();

        let group = groups
            .entry((dir, name.clone()))
            .or_insert_with(|| CertificateGroup {
                name,
                cert: None,
                key: None,
                domains: Vec::new(),
                expiry: None,
                fingerprint: None,
                folder: entry.folder.clone(),
                folder_date: entry.folder_date.clone(),
                is_archived: entry.is_archived,
                is_interface_ssl: entry.is_interface_ssl,
                can_edit: entry.can_edit,
            });

        match entry.kind {
            FileKind::Cert => {
                group.domains = entry.domains.clone();
                group.expiry = entry.expiry;
                group.fingerprint = entry.fingerprint.clone();
                group.cert = Some(entry);
            }
            FileKind::Key => group.key = Some(entry),
        }
    }

    Ok(groups.into_values().collect())
}

/// Resolve a user path below the root to an existing `.pem` file.
async fn existing_pem(state: &AppState, user_path: &str) -> Result<(PathBuf, String), AppError> {
    let root = certificates_root(state)?;
    let target = state.policy.paths.sanitize(user_path, &root)?;
    let filename = target
        .resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::InvalidPath("path does not name a file".into()))?;
    let filename = state.policy.filenames.validate_pem(&filename)?;

    if !tokio::fs::try_exists(&target.resolved).await? {
        return Err(AppError::NotFound("Certificate file not found".into()));
    }
    Ok((target.resolved, filename))
}

pub async fn certificate_details(
    state: &AppState,
    user_path: &str,
) -> Result<CertificateDetails, AppError> {
    let (path, filename) = existing_pem(state, user_path).await?;
    let meta = tokio::fs::metadata(&path).await?;
    let kind = FileKind::of(&filename);
    let info = match kind {
        FileKind::Cert => inspect_or_default(state, &path).await,
        FileKind::Key => CertificateInfo::default(),
    };

    Ok(CertificateDetails {
        filename,
        size: meta.len(),
        modified: meta.modified().map(DateTime::<Utc>::from)?,
        expiry: info.expiry,
        domains: info.domains,
        fingerprint: info.fingerprint,
        kind,
    })
}

/// Delete a `.pem` file and, best effort, its cert/key companion.
/// Returns the root-relative paths that were removed.
pub async fn delete_certificate(state: &AppState, user_path: &str) -> Result<Vec<String>, AppError> {
    let (path, filename) = existing_pem(state, user_path).await?;
    let root = certificates_root(state)?;

    tokio::fs::remove_file(&path).await?;
    let mut removed = vec![relative_to(&root, &path)];

    if let Some(companion) = companion_name(&filename) {
        let companion_path = path.with_file_name(companion);
        match tokio::fs::remove_file(&companion_path).await {
            Ok(()) => removed.push(relative_to(&root, &companion_path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %companion_path.display(), error = %e, "Failed to remove companion file")
            }
        }
    }

    tracing::info!(files = ?removed, "Certificate deleted");
    Ok(removed)
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// `interface-ssl`/`legacy` map to the root, `YYYY-MM-DD` to that folder.
pub fn folder_dir(state: &AppState, folder: &str) -> Result<PathBuf, AppError> {
    let root = certificates_root(state)?;
    if ROOT_FOLDERS.contains(&folder) {
        return Ok(root);
    }
    if DATE_FOLDER.is_match(folder) {
        return Ok(state.policy.paths.sanitize(folder, &root)?.resolved);
    }
    Err(AppError::BadRequest("Invalid folder parameter".into()))
}

fn file_in(state: &AppState, dir: &Path, filename: &str) -> Result<PathBuf, AppError> {
    let filename = state.policy.filenames.validate(filename)?;
    Ok(state.policy.paths.sanitize(&filename, dir)?.resolved)
}

#[derive(Debug)]
pub struct CertPair {
    pub name: String,
    pub dir: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

pub fn pair_paths(state: &AppState, folder: &str, certname: &str) -> Result<CertPair, AppError> {
    let dir = folder_dir(state, folder)?;
    let name = state.policy.filenames.validate(certname)?;
    Ok(CertPair {
        cert: file_in(state, &dir, &format!("{name}.pem"))?,
        key: file_in(state, &dir, &format!("{name}-key.pem"))?,
        name,
        dir,
    })
}

async fn existing(paths: [&Path; 2]) -> Result<Vec<PathBuf>, AppError> {
    let mut present = Vec::new();
    for path in paths {
        if tokio::fs::try_exists(path).await? {
            present.push(path.to_path_buf());
        }
    }
    Ok(present)
}

async fn move_into(files: Vec<PathBuf>, dest: &Path) -> Result<(), AppError> {
    if files.is_empty() {
        return Err(AppError::NotFound("Certificate files not found".into()));
    }
    tokio::fs::create_dir_all(dest).await?;
    for file in files {
        if let Some(name) = file.file_name() {
            tokio::fs::rename(&file, dest.join(name)).await?;
        }
    }
    Ok(())
}

pub async fn archive_certificate(
    state: &AppState,
    folder: &str,
    certname: &str,
) -> Result<(), AppError> {
    let pair = pair_paths(state, folder, certname)?;
    let files = existing([pair.cert.as_path(), pair.key.as_path()]).await?;
    move_into(files, &pair.dir.join(ARCHIVE_DIR)).await?;
    tracing::info!(folder = %folder, certificate = %pair.name, "Certificate archived");
    Ok(())
}

pub async fn restore_certificate(
    state: &AppState,
    folder: &str,
    certname: &str,
) -> Result<(), AppError> {
    let pair = pair_paths(state, folder, certname)?;
    let archive_dir = pair.dir.join(ARCHIVE_DIR);
    let cert = file_in(state, &archive_dir, &format!("{}.pem", pair.name))?;
    let key = file_in(state, &archive_dir, &format!("{}-key.pem", pair.name))?;
    let files = existing([cert.as_path(), key.as_path()]).await?;
    move_into(files, &pair.dir).await?;
    tracing::info!(folder = %folder, certificate = %pair.name, "Certificate restored");
    Ok(())
}

/// Existing `.pem` file inside a folder, for the download routes.
pub async fn folder_file(
    state: &AppState,
    folder: &str,
    filename: &str,
) -> Result<PathBuf, AppError> {
    let dir = folder_dir(state, folder)?;
    let filename = state.policy.filenames.validate_pem(filename)?;
    let path = state.policy.paths.sanitize(&filename, &dir)?.resolved;
    if !tokio::fs::try_exists(&path).await? {
        return Err(AppError::NotFound("Certificate file not found".into()));
    }
    Ok(path)
}

pub async fn root_ca_path(state: &AppState) -> Result<PathBuf, AppError> {
    let ca_root = command_service::ca_root(state).await?;
    let path = ca_root.join("rootCA.pem");
    if !tokio::fs::try_exists(&path).await? {
        return Err(AppError::NotFound("Root CA certificate not found".into()));
    }
    Ok(path)
}

pub async fn root_ca_info(state: &AppState) -> Result<RootCaInfo, AppError> {
    let path = root_ca_path(state).await?;
    let output = command_service::run(
        state,
        &CertCommand::X509 {
            input: path.clone(),
            flags: vec!["-subject", "-issuer", "-enddate", "-fingerprint", "-sha256"],
        },
    )
    .await?;
    let info = parse_x509_output(&output.stdout);
    let unknown = || "Unknown".to_string();

    Ok(RootCaInfo {
        ca_root: path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        subject: info.subject.unwrap_or_else(unknown),
        issuer: info.issuer.unwrap_or_else(unknown),
        days_until_expiry: info.expiry.map(|e| days_until(e, Utc::now())),
        expiry: info.expiry,
        fingerprint: info.fingerprint.unwrap_or_else(unknown),
        path: path.display().to_string(),
    })
}

pub struct Download {
    pub filename: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

/// Export a cert/key pair (plus the local CA when present) as PKCS#12.
pub async fn export_pfx(
    state: &AppState,
    folder: &str,
    certname: &str,
    req: PfxRequest,
) -> Result<Download, AppError> {
    let pair = pair_paths(state, folder, certname)?;
    if existing([pair.cert.as_path(), pair.key.as_path()]).await?.len() < 2 {
        return Err(AppError::NotFound(
            "Certificate and key are both required for PFX export".into(),
        ));
    }

    let ca = match root_ca_path(state).await {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::debug!(error = %e, "Exporting PFX without CA certificate");
            None
        }
    };

    let stem = std::env::temp_dir().join(format!("certdesk-{}", uuid::Uuid::new_v4().simple()));
    let out = stem.with_extension("pfx");
    let password_file = stem.with_extension("pass");
    write_secret(&password_file, req.password.as_deref().unwrap_or("")).await?;

    let command = CertCommand::Pkcs12 {
        out: out.clone(),
        key: pair.key.clone(),
        cert: pair.cert.clone(),
        ca,
        password_file: password_file.clone(),
        legacy: req.legacy.unwrap_or(false),
    };

    let result = match command_service::run(state, &command).await {
        Ok(_) => tokio::fs::read(&out).await.map_err(AppError::from),
        Err(e) => Err(e),
    };
    let _ = tokio::fs::remove_file(&password_file).await;
    let _ = tokio::fs::remove_file(&out).await;
    let data = result?;

    tracing::info!(folder = %folder, certificate = %pair.name, "PFX exported");
    Ok(Download {
        filename: format!("{}.pfx", pair.name),
        content_type: "application/x-pkcs12",
        data,
    })
}

/// Owner-only file holding `secret`, for `-passout file:`.
async fn write_secret(path: &Path, secret: &str) -> Result<(), AppError> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(secret.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

/// Zip or tar.gz archive of whichever halves of the pair exist.
pub async fn bundle(
    state: &AppState,
    folder: &str,
    certname: &str,
    format: BundleFormat,
) -> Result<Download, AppError> {
    let pair = pair_paths(state, folder, certname)?;
    let members: Vec<(PathBuf, String)> = existing([pair.cert.as_path(), pair.key.as_path()])
        .await?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            Some((path, name))
        })
        .collect();
    if members.is_empty() {
        return Err(AppError::NotFound("Certificate files not found".into()));
    }

    let data = tokio::task::spawn_blocking(move || build_archive(format, &members))
        .await
        .map_err(|e| AppError::Internal(format!("Archive task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Archive creation failed: {}", e)))?;

    Ok(Download {
        filename: format!("{}.{}", pair.name, format.extension()),
        content_type: format.content_type(),
        data,
    })
}

pub fn build_archive(format: BundleFormat, members: &[(PathBuf, String)]) -> anyhow::Result<Vec<u8>> {
    match format {
        BundleFormat::Zip => {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            for (path, name) in members {
                zip.start_file(name.as_str(), options)?;
                zip.write_all(&std::fs::read(path)?)?;
            }
            Ok(zip.finish()?.into_inner())
        }
        BundleFormat::TarGz => {
            let encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            let mut tar_builder = tar::Builder::new(encoder);
            for (path, name) in members {
                tar_builder.append_path_with_name(path, name)?;
            }
            Ok(tar_builder.into_inner()?.finish()?)
        }
    }
}

pub fn command_catalogue() -> Vec<CommandInfo> {
    vec![
        CommandInfo {
            name: "Install CA",
            key: "install-ca",
            description: "Install the local CA certificate",
            dangerous: false,
            has_input: false,
            input_placeholder: None,
        },
        CommandInfo {
            name: "Uninstall CA",
            key: "uninstall-ca",
            description: "Uninstall the local CA certificate",
            dangerous: true,
            has_input: false,
            input_placeholder: None,
        },
        CommandInfo {
            name: "Generate",
            key: "generate",
            description: "Generate certificate for domains",
            dangerous: false,
            has_input: true,
            input_placeholder: Some("Enter domain names (space-separated)"),
        },
        CommandInfo {
            name: "Get CAROOT",
            key: "caroot",
            description: "Get the CA root directory path",
            dangerous: false,
            has_input: false,
            input_placeholder: None,
        },
        CommandInfo {
            name: "List Certificates",
            key: "list",
            description: "List all certificates in the certificates root",
            dangerous: false,
            has_input: false,
            input_placeholder: None,
        },
    ]
}

/// Dispatch a console command by key.
pub async fn execute(state: &AppState, req: ExecuteRequest) -> Result<ExecuteResponse, AppError> {
    let command = req
        .command
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest("Command is required and must be a non-empty string".into())
        })?;
    let input = req.input.as_deref().map(str::trim).unwrap_or("");

    match command {
        "install-ca" => install_ca(state).await,
        "uninstall-ca" => run_console(state, CertCommand::Uninstall).await,
        "generate" => generate(state, input).await,
        "caroot" => run_console(state, CertCommand::CaRoot).await,
        "list" => list_root(state).await,
        _ => Err(AppError::BadRequest("Invalid command".into())),
    }
}

fn console_output(output: &CommandOutput) -> String {
    if output.stdout.trim().is_empty() {
        output.stderr.clone()
    } else {
        output.stdout.clone()
    }
}

async fn run_console(state: &AppState, command: CertCommand) -> Result<ExecuteResponse, AppError> {
    let output = command_service::run(state, &command).await?;
    Ok(ExecuteResponse {
        output: console_output(&output),
        command: output.command,
        warning: None,
        certificate_dir: None,
    })
}

async fn install_ca(state: &AppState) -> Result<ExecuteResponse, AppError> {
    // Installing into the trust store may prompt for privileges; skip when the CA exists.
    match command_service::ca_root(state).await {
        Ok(ca_root) if command_service::ca_files_exist(&ca_root).await => {
            return Ok(ExecuteResponse {
                output: "CA is already available. If you need to install it in the system trust store, run \"mkcert -install\" manually with administrator privileges.".into(),
                command: "mkcert -install (skipped - CA exists)".into(),
                warning: Some("Manual installation may be required for system trust".into()),
                certificate_dir: None,
            });
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Could not check CA status before install"),
    }
    run_console(state, CertCommand::Install).await
}

/// `mkcert` for the given space separated domains into `<root>/<today>/`.
pub async fn generate(state: &AppState, input: &str) -> Result<ExecuteResponse, AppError> {
    let domains: Vec<String> = input.split_whitespace().map(str::to_string).collect();
    let Some(first) = domains.first() else {
        return Err(AppError::BadRequest(
            "Domain names are required for certificate generation".into(),
        ));
    };
    if let Some(bad) = domains.iter().find(|d| !DOMAIN.is_match(d)) {
        return Err(AppError::BadRequest(format!("Invalid domain name '{}'", bad)));
    }

    let stem = first.replace('*', "_wildcard");
    let cert_file = state.policy.filenames.validate(&format!("{stem}.pem"))?;
    let key_file = state.policy.filenames.validate(&format!("{stem}-key.pem"))?;

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let dir = state
        .policy
        .paths
        .sanitize(&today, &certificates_root(state)?)?
        .resolved;
    tokio::fs::create_dir_all(&dir).await?;

    let output = command_service::run(
        state,
        &CertCommand::Generate {
            dir: dir.clone(),
            cert_file,
            key_file,
            domains: domains.clone(),
        },
    )
    .await?;

    tracing::info!(domains = ?domains, folder = %today, "Certificate generated");
    Ok(ExecuteResponse {
        output: console_output(&output),
        command: output.command,
        warning: None,
        certificate_dir: Some(dir.display().to_string()),
    })
}

/// Native equivalent of `ls -la *.pem` in the certificates root.
async fn list_root(state: &AppState) -> Result<ExecuteResponse, AppError> {
    const RENDERED: &str = "ls -la *.pem";
    state.policy.commands.check(RENDERED)?;

    let root = certificates_root(state)?;
    let mut lines = Vec::new();
    if tokio::fs::try_exists(&root).await? {
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().await?;
            if !meta.is_file() || !name.ends_with(".pem") {
                continue;
            }
            let modified: DateTime<Utc> = meta.modified()?.into();
            lines.push(format!(
                "{:>10} {} {}",
                meta.len(),
                modified.format("%b %e %H:%M"),
                name
            ));
        }
    }
    lines.sort_by(|a, b| a.rsplit(' ').next().cmp(&b.rsplit(' ').next()));

    Ok(ExecuteResponse {
        output: if lines.is_empty() {
            "No certificates found".into()
        } else {
            lines.join("\n")
        },
        command: RENDERED.into(),
        warning: None,
        certificate_dir: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;

    const X509_TEXT: &str = "subject=O = mkcert development CA, OU = dev@box, CN = mkcert dev@box
issuer=O = mkcert development CA, OU = dev@box, CN = mkcert dev@box
notAfter=Jan  5 12:34:56 2026 GMT
sha256 Fingerprint=AB:CD:EF:01
Certificate:
    Data:
        Subject: O = mkcert development certificate, OU = dev@box
        X509v3 extensions:
            X509v3 Subject Alternative Name:
                DNS:example.com, DNS:*.example.com, IP Address:127.0.0.1, DNS:example.com
";

    #[test]
    fn x509_output_is_parsed() {
        let info = parse_x509_output(X509_TEXT);
        assert_eq!(
            info.expiry,
            Some(Utc.with_ymd_and_hms(2026, 1, 5, 12, 34, 56).unwrap())
        );
        assert_eq!(info.fingerprint.as_deref(), Some("AB:CD:EF:01"));
        assert_eq!(info.domains, vec!["example.com", "*.example.com"]);
        assert!(info.subject.unwrap().contains("mkcert development CA"));
        assert!(info.issuer.is_some());
    }

    #[test]
    fn common_name_comes_before_alt_names() {
        let text = "        Subject: O = Acme, CN = acme.test\n            X509v3 Subject Alternative Name:\n                DNS:acme.test, DNS:www.acme.test\n";
        assert_eq!(parse_x509_output(text).domains, vec!["acme.test", "www.acme.test"]);
        assert_eq!(parse_x509_output("garbage"), CertificateInfo::default());
    }

    #[test]
    fn openssl_dates_parse_with_padded_days() {
        assert_eq!(
            parse_openssl_date("Dec 31 23:59:59 2030 GMT"),
            Some(Utc.with_ymd_and_hms(2030, 12, 31, 23, 59, 59).unwrap())
        );
        assert!(parse_openssl_date("not a date").is_none());
    }

    #[test]
    fn days_round_up() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(days_until(now + chrono::Duration::hours(1), now), 1);
        assert_eq!(days_until(now + chrono::Duration::days(7), now), 7);
        assert_eq!(days_until(now + chrono::Duration::hours(169), now), 8);
        assert_eq!(days_until(now, now), 0);
        assert_eq!(days_until(now - chrono::Duration::hours(25), now), -1);
    }

    #[test]
    fn names_and_companions() {
        assert_eq!(base_name("site.pem"), "site");
        assert_eq!(base_name("site-key.pem"), "site");
        assert_eq!(base_name("site.crt"), "site.crt");
        assert_eq!(companion_name("site.pem").as_deref(), Some("site-key.pem"));
        assert_eq!(companion_name("site-key.pem").as_deref(), Some("site.pem"));
        assert_eq!(companion_name("site.crt"), None);
    }

    #[test]
    fn placement_follows_the_folder_layout() {
        let root = placement("interface.pem");
        assert!(root.is_interface_ssl);
        assert!(!root.can_edit);
        assert_eq!(root.folder, None);

        let dated = placement("2024-03-01/site.pem");
        assert_eq!(dated.folder_date.as_deref(), Some("2024-03-01"));
        assert!(dated.can_edit);
        assert!(!dated.is_archived);

        let archived = placement("2024-03-01/archive/site.pem");
        assert!(archived.is_archived);

        let uploaded = placement("uploaded/mine.pem");
        assert_eq!(uploaded.folder.as_deref(), Some("uploaded"));
        assert_eq!(uploaded.folder_date, None);
        assert!(!uploaded.can_edit);
    }

    #[test]
    fn domain_tokens_cannot_look_like_flags() {
        assert!(DOMAIN.is_match("example.com"));
        assert!(DOMAIN.is_match("*.example.com"));
        assert!(DOMAIN.is_match("localhost"));
        assert!(!DOMAIN.is_match("-install"));
        assert!(!DOMAIN.is_match("a;b"));
        assert!(!DOMAIN.is_match("a/b"));
    }

    #[tokio::test]
    async fn scan_finds_nested_certificates_only() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("2024-01-01/archive")).unwrap();
        std::fs::write(root.join("top.pem"), "x").unwrap();
        std::fs::write(root.join("2024-01-01/a.pem"), "x").unwrap();
        std::fs::write(root.join("2024-01-01/archive/b.crt"), "x").unwrap();
        std::fs::write(root.join("2024-01-01/notes.txt"), "x").unwrap();

        let found: Vec<String> = find_certificate_files(root)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.relative_path)
            .collect();
        assert_eq!(found, vec!["2024-01-01/a.pem", "2024-01-01/archive/b.crt", "top.pem"]);

        assert!(find_certificate_files(&root.join("missing"))
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn bundles_contain_both_members() {
        let tmp = tempfile::tempdir().unwrap();
        let cert = tmp.path().join("site.pem");
        let key = tmp.path().join("site-key.pem");
        std::fs::write(&cert, "CERT").unwrap();
        std::fs::write(&key, "KEY").unwrap();
        let members = vec![
            (cert, "site.pem".to_string()),
            (key, "site-key.pem".to_string()),
        ];

        let zipped = build_archive(BundleFormat::Zip, &members).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zipped)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("site-key.pem")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "KEY");

        let tarball = build_archive(BundleFormat::TarGz, &members).unwrap();
        let mut names: Vec<String> = tar::Archive::new(flate2::read::GzDecoder::new(&tarball[..]))
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["site-key.pem", "site.pem"]);
    }
}
