use crate::state::AppState;
use std::time::Duration;
use tokio::sync::watch;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub async fn run(state: AppState, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
            _ = shutdown.changed() => {
                tracing::info!("Session reaper shutting down");
                return;
            }
        }

        let expired = state.sessions.purge_expired();
        if expired > 0 {
            tracing::info!(count = expired, remaining = state.sessions.len(), "Expired sessions removed");
        }
    }
}
