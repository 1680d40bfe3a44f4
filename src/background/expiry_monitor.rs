use crate::services::monitoring_service;
use crate::state::AppState;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;

const INITIAL_CHECK_DELAY: Duration = Duration::from_secs(5);

pub async fn run(state: AppState, mut shutdown: watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(INITIAL_CHECK_DELAY) => {}
        _ = shutdown.changed() => {
            tracing::info!("Certificate monitor shutting down");
            return;
        }
    }
    run_check(&state).await;

    loop {
        let schedule = state.monitor.settings().await.check_interval;
        let now = Utc::now();
        let next = match monitoring_service::next_run(&schedule, now) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(schedule = %schedule, error = %e, "Certificate monitor stopped: bad schedule");
                return;
            }
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!(next_run = %next, "Next certificate expiry check scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => {
                tracing::info!("Certificate monitor shutting down");
                return;
            }
        }
        run_check(&state).await;
    }
}

async fn run_check(state: &AppState) {
    match monitoring_service::check_certificates(state).await {
        Ok(summary) => tracing::info!(
            total = summary.total,
            critical = summary.critical,
            warning = summary.warning,
            "Certificate expiry check completed"
        ),
        Err(e) => tracing::error!(error = %e, "Certificate expiry check failed"),
    }
}
