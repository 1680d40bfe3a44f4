pub mod archive;
pub mod auth;
pub mod certificates;
pub mod downloads;
pub mod files;
pub mod notifications;
pub mod system;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth::SessionLayer;
use crate::config::RateLimit;
use crate::error::AppError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let max_upload = state.config.max_upload_size as usize;
    let sessions = SessionLayer::new(state.sessions.clone(), state.config.auth.enabled);
    let limits = &state.config.rate_limit;

    // Public routes (no session required)
    let login_routes = Router::new().route("/api/auth/login", post(auth::login));
    let public_routes = Router::new()
        .route("/api", get(system::catalogue))
        .route("/api/health", get(system::health))
        .route("/api/rate-limit/status", get(system::rate_limit_status))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/status", get(auth::status))
        .route("/api/auth/methods", get(auth::methods));

    // Routes that spawn mkcert/openssl or move certificate files
    let cli_routes = Router::new()
        .route("/api/execute", post(certificates::execute))
        .route(
            "/certificates/{folder}/{certname}/archive",
            post(archive::archive_certificate),
        )
        .route(
            "/certificates/{folder}/{certname}/restore",
            post(archive::restore_certificate),
        )
        .route(
            "/api/certificates/{folder}/{certname}/pfx",
            post(archive::export_pfx),
        )
        .layer(sessions.clone());

    let api_routes = Router::new()
        // System
        .route("/api/status", get(system::status))
        .route("/api/system", get(system::system_info))
        .route("/api/config", get(system::client_config))
        // Console
        .route("/api/commands", get(certificates::list_commands))
        // Certificates
        .route("/api/certificates", get(certificates::list_certificates))
        .route(
            "/api/certificate/{*path}",
            get(certificates::get_certificate).delete(certificates::delete_certificate),
        )
        .route("/api/rootca/info", get(certificates::rootca_info))
        // Uploaded files
        .route("/api/upload", post(files::upload_file))
        .route("/api/files", get(files::list_files))
        .route("/api/file/{filename}/content", get(files::file_content))
        // Notifications
        .route("/api/email/status", get(notifications::email_status))
        .route("/api/email/test", post(notifications::email_test))
        .route("/api/email/verify", post(notifications::email_verify))
        .route("/api/monitoring/status", get(notifications::monitoring_status))
        .route("/api/monitoring/check", post(notifications::monitoring_check))
        .route("/api/monitoring/start", post(notifications::monitoring_start))
        .route("/api/monitoring/stop", post(notifications::monitoring_stop))
        .route(
            "/api/monitoring/expiring",
            get(notifications::monitoring_expiring),
        )
        .route("/api/monitoring/config", put(notifications::monitoring_config))
        .layer(sessions.clone());

    let download_routes = Router::new()
        .route("/download/cert/{folder}/{filename}", get(downloads::cert_file))
        .route("/download/key/{folder}/{filename}", get(downloads::key_file))
        .route("/download/bundle/{folder}/{certname}", get(downloads::bundle))
        .route("/download/rootca", get(downloads::root_ca))
        .route("/download/{filename}", get(downloads::uploaded_file))
        .layer(sessions);

    // Request ID
    let x_request_id = http::HeaderName::from_static("x-request-id");

    Router::new()
        .merge(rate_limited(login_routes, "auth", limits.auth, limits.enabled))
        .merge(rate_limited(public_routes, "general", limits.general, limits.enabled))
        .merge(rate_limited(cli_routes, "cli", limits.cli, limits.enabled))
        .merge(rate_limited(api_routes, "api", limits.api, limits.enabled))
        .merge(rate_limited(download_routes, "general", limits.general, limits.enabled))
        .fallback(not_found)
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config.cors_allowed_origins))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Per-client-IP quota over `router`. Each call owns a separate bucket set, so
/// clones of the built router share counters but rebuilt routers do not.
fn rate_limited(
    router: Router<AppState>,
    group: &'static str,
    limit: RateLimit,
    enabled: bool,
) -> Router<AppState> {
    if !enabled {
        return router;
    }
    let Some(config) = GovernorConfigBuilder::default()
        .period(limit.replenish_period())
        .burst_size(limit.max)
        .use_headers()
        .finish()
    else {
        tracing::warn!(group, max = limit.max, "Zero rate limit quota, group left unlimited");
        return router;
    };
    router.layer(GovernorLayer {
        config: Arc::new(config),
    })
}

async fn not_found() -> AppError {
    AppError::NotFound("API endpoint not found".into())
}

/// `*` allows any origin; otherwise a comma separated list with credentials.
fn cors_layer(origins: &str) -> CorsLayer {
    if origins.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}
