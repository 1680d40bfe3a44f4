use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub certificates_dir: String,
    pub mkcert_bin: String,
    pub openssl_bin: String,
    pub command_timeout_secs: u64,
    pub command_max_output_bytes: usize,
    pub max_concurrent_commands: usize,
    pub max_upload_size: u64,
    pub log_level: String,
    pub cors_allowed_origins: String,
    pub auth: AuthSettings,
    pub email: EmailSettings,
    pub monitoring: MonitoringSettings,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub enabled: bool,
    pub username: String,
    pub password: String,
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_secure: bool,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub from: String,
    /// Comma separated recipient list.
    pub to: String,
    pub subject: String,
}

/// Monitor settings; the live copy is mutable at runtime through the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoringSettings {
    pub enabled: bool,
    /// Cron expression, 5 (crontab), 6 or 7 fields.
    pub check_interval: String,
    pub warning_days: i64,
    pub critical_days: i64,
    pub include_uploaded: bool,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval: "0 8 * * *".into(),
            warning_days: 30,
            critical_days: 7,
            include_uploaded: true,
        }
    }
}

/// Per-client request quotas, one per route group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub enabled: bool,
    /// Downloads, health and other unauthenticated reads.
    pub general: RateLimit,
    /// Session-guarded API calls.
    pub api: RateLimit,
    /// Routes that run mkcert/openssl or move certificate files.
    pub cli: RateLimit,
    /// Login attempts.
    pub auth: RateLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub window_ms: u64,
    pub max: u32,
}

impl RateLimit {
    const fn per_quarter_hour(max: u32) -> Self {
        Self {
            window_ms: 15 * 60 * 1000,
            max,
        }
    }

    fn from_env(prefix: &str, default: RateLimit) -> Self {
        Self {
            window_ms: parse_env(&format!("{prefix}_RATE_LIMIT_WINDOW"), default.window_ms),
            max: parse_env(&format!("{prefix}_RATE_LIMIT_MAX"), default.max),
        }
    }

    /// Time to regain one request; an idle client refills `max` per window.
    pub fn replenish_period(&self) -> Duration {
        let per_request = self.window_ms / u64::from(self.max.max(1));
        Duration::from_millis(per_request.max(1))
    }

    pub fn describe(&self) -> String {
        format!("{} requests per {} seconds", self.max, self.window_ms / 1000)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            general: RateLimit::per_quarter_hour(200),
            api: RateLimit::per_quarter_hour(100),
            cli: RateLimit::per_quarter_hour(10),
            auth: RateLimit::per_quarter_hour(5),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let monitoring_defaults = MonitoringSettings::default();
        let limit_defaults = RateLimitSettings::default();
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: parse_env("PORT", 3000),
            certificates_dir: env::var("CERTIFICATES_DIR")
                .unwrap_or_else(|_| "certificates".into()),
            mkcert_bin: env::var("MKCERT_BIN").unwrap_or_else(|_| "mkcert".into()),
            openssl_bin: env::var("OPENSSL_BIN").unwrap_or_else(|_| "openssl".into()),
            command_timeout_secs: parse_env("COMMAND_TIMEOUT_SECS", 30),
            command_max_output_bytes: parse_env("COMMAND_MAX_OUTPUT_BYTES", 1_048_576),
            max_concurrent_commands: parse_env("MAX_CONCURRENT_COMMANDS", 4),
            max_upload_size: parse_env("MAX_UPLOAD_SIZE", 10_485_760),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".into()),
            auth: AuthSettings {
                enabled: env_flag("ENABLE_AUTH"),
                username: env::var("AUTH_USERNAME").unwrap_or_else(|_| "admin".into()),
                password: env::var("AUTH_PASSWORD").unwrap_or_else(|_| "admin".into()),
                session_ttl_secs: parse_env("SESSION_TTL_SECS", 86_400),
            },
            email: EmailSettings {
                enabled: env_flag("EMAIL_NOTIFICATIONS_ENABLED"),
                smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
                smtp_port: parse_env("SMTP_PORT", 587),
                smtp_secure: env_flag("SMTP_SECURE"),
                smtp_user: env::var("SMTP_USER").unwrap_or_default(),
                smtp_pass: env::var("SMTP_PASS").unwrap_or_default(),
                from: env::var("EMAIL_FROM").unwrap_or_else(|_| "certdesk@localhost".into()),
                to: env::var("EMAIL_TO").unwrap_or_default(),
                subject: env::var("EMAIL_SUBJECT")
                    .unwrap_or_else(|_| "Certificate Expiry Alert".into()),
            },
            monitoring: MonitoringSettings {
                enabled: env_flag("CERT_MONITORING_ENABLED"),
                check_interval: env::var("CERT_CHECK_INTERVAL")
                    .unwrap_or(monitoring_defaults.check_interval),
                warning_days: parse_env("CERT_WARNING_DAYS", monitoring_defaults.warning_days),
                critical_days: parse_env("CERT_CRITICAL_DAYS", monitoring_defaults.critical_days),
                include_uploaded: env::var("CERT_MONITOR_INCLUDE_UPLOADED")
                    .map(|v| is_truthy(&v))
                    .unwrap_or(monitoring_defaults.include_uploaded),
            },
            rate_limit: RateLimitSettings {
                enabled: env::var("RATE_LIMIT_ENABLED")
                    .map(|v| is_truthy(&v))
                    .unwrap_or(limit_defaults.enabled),
                general: RateLimit::from_env("GENERAL", limit_defaults.general),
                api: RateLimit::from_env("API", limit_defaults.api),
                cli: RateLimit::from_env("CLI", limit_defaults.cli),
                auth: RateLimit::from_env("AUTH", limit_defaults.auth),
            },
        }
    }

    pub fn certificates_dir(&self) -> PathBuf {
        PathBuf::from(&self.certificates_dir)
    }

    pub fn uploaded_dir(&self) -> PathBuf {
        self.certificates_dir().join("uploaded")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|v| is_truthy(&v)).unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "true" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_true_and_one_only() {
        assert!(is_truthy("true"));
        assert!(is_truthy("1"));
        assert!(is_truthy(" 1 "));
        assert!(!is_truthy("yes"));
        assert!(!is_truthy("TRUE"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn monitoring_defaults_match_documented_values() {
        let m = MonitoringSettings::default();
        assert!(!m.enabled);
        assert_eq!(m.warning_days, 30);
        assert_eq!(m.critical_days, 7);
        assert!(m.include_uploaded);
    }

    #[test]
    fn rate_limit_period_spreads_the_window_over_the_quota() {
        let limits = RateLimitSettings::default();
        assert!(limits.enabled);
        assert_eq!(limits.auth.replenish_period(), Duration::from_secs(180));
        assert_eq!(limits.cli.replenish_period(), Duration::from_secs(90));
        assert_eq!(limits.auth.describe(), "5 requests per 900 seconds");

        let degenerate = RateLimit { window_ms: 0, max: 0 };
        assert_eq!(degenerate.replenish_period(), Duration::from_millis(1));
    }
}
