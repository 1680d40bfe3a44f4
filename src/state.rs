use crate::auth::SessionStore;
use crate::config::AppConfig;
use crate::sandbox::SafetyPolicy;
use crate::services::email_service::EmailService;
use crate::services::monitoring_service::MonitorControl;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub policy: Arc<SafetyPolicy>,
    pub sessions: Arc<SessionStore>,
    pub email: Arc<EmailService>,
    pub monitor: Arc<MonitorControl>,
    pub command_semaphore: Arc<Semaphore>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let max_concurrent = config.max_concurrent_commands.max(1);
        Self {
            policy: Arc::new(SafetyPolicy::new()),
            sessions: Arc::new(SessionStore::new(config.auth.session_ttl_secs)),
            email: Arc::new(EmailService::new(config.email.clone())),
            monitor: Arc::new(MonitorControl::new(config.monitoring.clone())),
            command_semaphore: Arc::new(Semaphore::new(max_concurrent)),
            config: Arc::new(config),
            start_time: chrono::Utc::now(),
        }
    }
}
