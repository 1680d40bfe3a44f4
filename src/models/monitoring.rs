use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MonitoringSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiringCertificate {
    /// Path relative to the certificates root.
    pub path: String,
    pub expiry: DateTime<Utc>,
    pub days_until_expiry: i64,
    pub domains: Vec<String>,
    pub priority: Priority,
}

#[derive(Debug, Serialize)]
pub struct ExpirySummary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub certificates: Vec<ExpiringCertificate>,
}

impl ExpirySummary {
    pub fn new(certificates: Vec<ExpiringCertificate>) -> Self {
        let critical = certificates
            .iter()
            .filter(|c| c.priority == Priority::Critical)
            .count();
        Self {
            total: certificates.len(),
            critical,
            warning: certificates.len() - critical,
            certificates,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MonitoringStatus {
    pub running: bool,
    #[serde(flatten)]
    pub settings: MonitoringSettings,
    pub email_enabled: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

/// Partial update for the runtime monitor settings.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MonitoringConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_uploaded: Option<bool>,
}
