use crate::background;
use crate::config::MonitoringSettings;
use crate::error::AppError;
use crate::models::certificate::FileKind;
use crate::models::monitoring::{
    ExpiringCertificate, ExpirySummary, MonitoringConfigUpdate, MonitoringStatus, Priority,
};
use crate::services::certificate_service::{self, UPLOADED_DIR};
use crate::state::AppState;
use anyhow::Context;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

const STOP_GRACE: Duration = Duration::from_secs(5);

struct MonitorTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Runtime settings and the handle of the scheduled expiry check, if any.
pub struct MonitorControl {
    settings: RwLock<MonitoringSettings>,
    task: Mutex<Option<MonitorTask>>,
    last_check: RwLock<Option<DateTime<Utc>>>,
}

impl MonitorControl {
    pub fn new(settings: MonitoringSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            task: Mutex::new(None),
            last_check: RwLock::new(None),
        }
    }

    pub async fn settings(&self) -> MonitoringSettings {
        self.settings.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub async fn last_check(&self) -> Option<DateTime<Utc>> {
        *self.last_check.read().await
    }
}

/// Next firing time of a 5-field crontab or 6/7-field (seconds, year) expression.
pub fn next_run(expression: &str, from: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let expression = expression.trim();
    let normalized = match expression.split_whitespace().count() {
        5 => format!("0 {expression}"),
        6 | 7 => expression.to_string(),
        n => anyhow::bail!(
            "Invalid cron expression: {expression} (expected 5, 6, or 7 fields, got {n})"
        ),
    };
    let schedule = Schedule::from_str(&normalized)
        .with_context(|| format!("Invalid cron expression: {expression}"))?;
    schedule
        .after(&from)
        .next()
        .ok_or_else(|| anyhow::anyhow!("No future occurrence for expression: {expression}"))
}

/// Some(..) when the certificate is inside the warning window and not yet expired.
pub fn classify(
    path: String,
    expiry: DateTime<Utc>,
    domains: Vec<String>,
    now: DateTime<Utc>,
    settings: &MonitoringSettings,
) -> Option<ExpiringCertificate> {
    let days = certificate_service::days_until(expiry, now);
    if days < 0 || days > settings.warning_days {
        return None;
    }
    Some(ExpiringCertificate {
        path,
        expiry,
        days_until_expiry: days,
        domains,
        priority: if days <= settings.critical_days {
            Priority::Critical
        } else {
            Priority::Warning
        },
    })
}

/// Certificates under the root that expire within the warning window, most urgent first.
pub async fn find_expiring(state: &AppState) -> Result<Vec<ExpiringCertificate>, AppError> {
    let settings = state.monitor.settings().await;
    let root = certificate_service::certificates_root(state)?;
    let files = certificate_service::find_certificate_files(&root).await?;
    let now = Utc::now();

    let uploaded_prefix = format!("{UPLOADED_DIR}/");
    let mut expiring = Vec::new();
    for file in files {
        if !file.name.ends_with(".pem") || FileKind::of(&file.name) == FileKind::Key {
            continue;
        }
        if certificate_service::placement(&file.relative_path).is_archived {
            continue;
        }
        if !settings.include_uploaded && file.relative_path.starts_with(&uploaded_prefix) {
            continue;
        }

        let info = match certificate_service::inspect(state, &file.full_path).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(path = %file.relative_path, error = %e, "Could not inspect certificate");
                continue;
            }
        };
        let Some(expiry) = info.expiry else {
            tracing::warn!(path = %file.relative_path, "Could not determine certificate expiry");
            continue;
        };

        if let Some(cert) = classify(file.relative_path, expiry, info.domains, now, &settings) {
            expiring.push(cert);
        }
    }

    expiring.sort_by_key(|c| c.days_until_expiry);
    Ok(expiring)
}

/// One full check: scan, then mail the result or log it when e-mail is off.
pub async fn check_certificates(state: &AppState) -> Result<ExpirySummary, AppError> {
    let settings = state.monitor.settings().await;
    let expiring = find_expiring(state).await?;
    *state.monitor.last_check.write().await = Some(Utc::now());

    if expiring.is_empty() {
        tracing::info!("No expiring certificates found");
    } else if state.email.is_enabled() {
        state
            .email
            .send_expiry_alert(&expiring, settings.warning_days, settings.critical_days)
            .await?;
    } else {
        tracing::warn!(
            count = expiring.len(),
            "Expiring certificates found but e-mail notifications are disabled"
        );
        for cert in &expiring {
            tracing::warn!(
                path = %cert.path,
                priority = ?cert.priority,
                days_until_expiry = cert.days_until_expiry,
                expiry = %cert.expiry,
                domains = ?cert.domains,
                "Certificate expiring"
            );
        }
    }

    Ok(ExpirySummary::new(expiring))
}

/// Spawn the scheduled check. Returns false when it was already running.
pub async fn start(state: &AppState) -> Result<bool, AppError> {
    let settings = state.monitor.settings().await;
    if !settings.enabled {
        return Err(AppError::BadRequest(
            "Certificate monitoring is disabled".into(),
        ));
    }
    next_run(&settings.check_interval, Utc::now())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut task = state.monitor.task.lock().await;
    if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
        return Ok(false);
    }

    let (shutdown, rx) = watch::channel(false);
    let handle = tokio::spawn(background::expiry_monitor::run(state.clone(), rx));
    *task = Some(MonitorTask { shutdown, handle });

    tracing::info!(schedule = %settings.check_interval, "Certificate monitor started");
    Ok(true)
}

/// Stop the scheduled check. Returns false when nothing was running.
pub async fn stop(state: &AppState) -> bool {
    let Some(mut task) = state.monitor.task.lock().await.take() else {
        return false;
    };

    let _ = task.shutdown.send(true);
    if tokio::time::timeout(STOP_GRACE, &mut task.handle).await.is_err() {
        task.handle.abort();
    }
    tracing::info!("Certificate monitor stopped");
    true
}

pub async fn restart(state: &AppState) -> Result<(), AppError> {
    stop(state).await;
    if state.monitor.settings().await.enabled {
        start(state).await?;
    }
    Ok(())
}

pub async fn status(state: &AppState) -> MonitoringStatus {
    let settings = state.monitor.settings().await;
    let running = state.monitor.is_running().await;
    let next_run = running
        .then(|| next_run(&settings.check_interval, Utc::now()).ok())
        .flatten();

    MonitoringStatus {
        running,
        email_enabled: state.email.is_enabled(),
        last_check: state.monitor.last_check().await,
        next_run,
        settings,
    }
}

fn validate_days(value: Option<i64>, label: &str) -> Result<(), AppError> {
    match value {
        Some(days) if !(1..=365).contains(&days) => Err(AppError::BadRequest(format!(
            "{label} days must be a number between 1 and 365"
        ))),
        _ => Ok(()),
    }
}

/// Apply a partial settings update; a running monitor is restarted with it.
pub async fn update_settings(
    state: &AppState,
    update: MonitoringConfigUpdate,
) -> Result<MonitoringSettings, AppError> {
    validate_days(update.warning_days, "Warning")?;
    validate_days(update.critical_days, "Critical")?;
    if let Some(expression) = &update.check_interval {
        next_run(expression, Utc::now()).map_err(|e| AppError::BadRequest(e.to_string()))?;
    }

    let was_running = state.monitor.is_running().await;
    let updated = {
        let mut settings = state.monitor.settings.write().await;
        if let Some(enabled) = update.enabled {
            settings.enabled = enabled;
        }
        if let Some(expression) = update.check_interval {
            settings.check_interval = expression.trim().to_string();
        }
        if let Some(days) = update.warning_days {
            settings.warning_days = days;
        }
        if let Some(days) = update.critical_days {
            settings.critical_days = days;
        }
        if let Some(include) = update.include_uploaded {
            settings.include_uploaded = include;
        }
        settings.clone()
    };

    tracing::info!(settings = ?updated, "Monitoring configuration updated");
    if was_running {
        restart(state).await?;
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings() -> MonitoringSettings {
        MonitoringSettings::default()
    }

    #[test]
    fn crontab_expressions_gain_a_seconds_field() {
        let from = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let next = next_run("0 8 * * *", from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 11, 8, 0, 0).unwrap());

        let next = next_run("30 0 8 * * *", from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 11, 8, 0, 30).unwrap());
    }

    #[test]
    fn malformed_cron_is_rejected() {
        let from = Utc::now();
        assert!(next_run("every day", from).is_err());
        assert!(next_run("* * *", from).is_err());
        assert!(next_run("0 99 * * *", from).is_err());
    }

    #[test]
    fn classification_uses_the_configured_windows() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let s = settings();
        let at = |days: i64| now + chrono::Duration::days(days);

        let critical = classify("a.pem".into(), at(7), vec![], now, &s).unwrap();
        assert_eq!(critical.priority, Priority::Critical);
        assert_eq!(critical.days_until_expiry, 7);

        let warning = classify("b.pem".into(), at(8), vec![], now, &s).unwrap();
        assert_eq!(warning.priority, Priority::Warning);

        assert!(classify("c.pem".into(), at(30), vec![], now, &s).is_some());
        assert!(classify("d.pem".into(), at(31), vec![], now, &s).is_none());
        assert!(classify("e.pem".into(), now - chrono::Duration::hours(1), vec![], now, &s)
            .is_some_and(|c| c.days_until_expiry == 0));
        assert!(classify("f.pem".into(), at(-2), vec![], now, &s).is_none());
    }

    #[test]
    fn day_limits_are_validated() {
        assert!(validate_days(None, "Warning").is_ok());
        assert!(validate_days(Some(1), "Warning").is_ok());
        assert!(validate_days(Some(365), "Warning").is_ok());
        assert!(matches!(
            validate_days(Some(0), "Warning"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            validate_days(Some(366), "Critical"),
            Err(AppError::BadRequest(_))
        ));
    }
}
