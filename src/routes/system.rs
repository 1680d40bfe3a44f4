use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::services::command_service;
use crate::state::AppState;

fn uptime_seconds(state: &AppState) -> i64 {
    chrono::Utc::now()
        .signed_duration_since(state.start_time)
        .num_seconds()
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "timestamp": chrono::Utc::now(),
            "uptime_seconds": uptime_seconds(&state),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Local CA presence plus the feature switches the UI cares about.
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let (ca_root, ca_exists) = match command_service::ca_root(&state).await {
        Ok(root) => {
            let exists = command_service::ca_files_exist(&root).await;
            (Some(root.display().to_string()), exists)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not query mkcert CA root");
            (None, false)
        }
    };
    let monitoring = state.monitor.settings().await;

    Json(json!({
        "data": {
            "ca": {
                "root": ca_root,
                "exists": ca_exists,
            },
            "features": {
                "auth": state.config.auth.enabled,
                "email": state.email.is_enabled(),
                "monitoring": monitoring.enabled,
                "monitoring_running": state.monitor.is_running().await,
            },
            "certificates_dir": state.config.certificates_dir,
            "uptime_seconds": uptime_seconds(&state),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "error": null
    }))
}

pub async fn system_info(State(state): State<AppState>) -> Json<Value> {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".into());
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    Json(json!({
        "data": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "family": std::env::consts::FAMILY,
            "hostname": hostname,
            "cpus": cpus,
            "working_directory": cwd,
            "uptime_seconds": uptime_seconds(&state),
        },
        "error": null
    }))
}

/// Configuration a browser client may see. No credentials.
pub async fn client_config(State(state): State<AppState>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "data": {
            "auth_enabled": config.auth.enabled,
            "email_enabled": state.email.is_enabled(),
            "monitoring": state.monitor.settings().await,
            "max_upload_size": config.max_upload_size,
            "command_timeout_secs": config.command_timeout_secs,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "error": null
    }))
}

/// Configured quotas per route group. Live counters travel as `x-ratelimit-*` headers.
pub async fn rate_limit_status(State(state): State<AppState>) -> Json<Value> {
    let limits = &state.config.rate_limit;
    Json(json!({
        "data": {
            "enabled": limits.enabled,
            "limits": {
                "general": limits.general.describe(),
                "api": limits.api.describe(),
                "cli": limits.cli.describe(),
                "auth": limits.auth.describe(),
            },
        },
        "error": null
    }))
}

pub async fn catalogue() -> Json<Value> {
    Json(json!({
        "data": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "auth": [
                    "POST /api/auth/login",
                    "POST /api/auth/logout",
                    "GET /api/auth/status",
                    "GET /api/auth/methods",
                ],
                "system": [
                    "GET /api/health",
                    "GET /api/status",
                    "GET /api/system",
                    "GET /api/config",
                    "GET /api/rate-limit/status",
                ],
                "console": [
                    "GET /api/commands",
                    "POST /api/execute",
                ],
                "certificates": [
                    "GET /api/certificates",
                    "GET /api/certificate/{path}",
                    "DELETE /api/certificate/{path}",
                    "GET /api/rootca/info",
                    "POST /certificates/{folder}/{certname}/archive",
                    "POST /certificates/{folder}/{certname}/restore",
                    "POST /api/certificates/{folder}/{certname}/pfx",
                ],
                "files": [
                    "POST /api/upload (multipart, field certificate)",
                    "GET /api/files",
                    "GET /api/file/{filename}/content",
                ],
                "downloads": [
                    "GET /download/cert/{folder}/{filename}",
                    "GET /download/key/{folder}/{filename}",
                    "GET /download/bundle/{folder}/{certname}",
                    "GET /download/rootca",
                    "GET /download/{filename}",
                ],
                "notifications": [
                    "GET /api/email/status",
                    "POST /api/email/test",
                    "POST /api/email/verify",
                    "GET /api/monitoring/status",
                    "POST /api/monitoring/check",
                    "POST /api/monitoring/start",
                    "POST /api/monitoring/stop",
                    "GET /api/monitoring/expiring",
                    "PUT /api/monitoring/config",
                ],
            },
        },
        "error": null
    }))
}
