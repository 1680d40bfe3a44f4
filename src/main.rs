use certdesk::background;
use certdesk::config::AppConfig;
use certdesk::routes;
use certdesk::services::monitoring_service;
use certdesk::state::AppState;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    tracing::info!("Starting certdesk v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(config.certificates_dir())
        .expect("Failed to create certificates dir");

    let state = AppState::new(config.clone());
    tracing::info!(
        certificates_dir = %config.certificates_dir,
        auth_enabled = config.auth.enabled,
        email_enabled = config.email.enabled,
        monitoring_enabled = config.monitoring.enabled,
        "Configuration loaded"
    );

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Start background tasks
    let reaper_handle = tokio::spawn(background::session_reaper::run(
        state.clone(),
        shutdown_rx.clone(),
    ));
    if config.monitoring.enabled {
        if let Err(e) = monitoring_service::start(&state).await {
            tracing::error!(error = %e, "Failed to start certificate monitor");
        }
    }

    // Build router
    let app = routes::build_router(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    // Serve with graceful shutdown; peer addresses key the rate limiter
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .expect("Server error");

    // Wait for background tasks
    tracing::info!("Waiting for background tasks to finish");
    monitoring_service::stop(&state).await;
    let _ = reaper_handle.await;

    tracing::info!("Shutdown complete");
}

async fn shutdown_signal(shutdown_tx: tokio::sync::watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
}
