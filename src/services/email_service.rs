use crate::config::EmailSettings;
use crate::error::AppError;
use crate::models::monitoring::{ExpiringCertificate, Priority};
use anyhow::Context;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use serde::Serialize;
use std::time::Duration;

const SMTP_TIMEOUT_SECS: u64 = 30;
const TEST_SUBJECT: &str = "Test Email - certdesk Email Service";

#[derive(Debug, Serialize)]
pub struct SendReport {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SmtpStatus {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    /// Never the username itself.
    pub user: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct EmailStatus {
    pub enabled: bool,
    pub configured: bool,
    pub smtp: SmtpStatus,
    pub from: String,
    pub to: Vec<String>,
}

/// SMTP notifications. Transport work is blocking and runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct EmailService {
    settings: EmailSettings,
}

impl EmailService {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn is_configured(&self) -> bool {
        !self.settings.smtp_host.is_empty()
            && !self.settings.smtp_user.is_empty()
            && !self.settings.smtp_pass.is_empty()
            && !self.recipients().is_empty()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.settings
            .to
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn status(&self) -> EmailStatus {
        EmailStatus {
            enabled: self.settings.enabled,
            configured: self.is_configured(),
            smtp: SmtpStatus {
                host: self.settings.smtp_host.clone(),
                port: self.settings.smtp_port,
                secure: self.settings.smtp_secure,
                user: (!self.settings.smtp_user.is_empty()).then_some("***configured***"),
            },
            from: self.settings.from.clone(),
            to: self.recipients(),
        }
    }

    fn ensure_ready(&self) -> Result<(), AppError> {
        if !self.settings.enabled {
            return Err(AppError::BadRequest("Email notifications are disabled".into()));
        }
        if !self.is_configured() {
            return Err(AppError::BadRequest(
                "Email service not properly configured".into(),
            ));
        }
        Ok(())
    }

    pub async fn verify_connection(&self) -> Result<SendReport, AppError> {
        self.ensure_ready()?;
        let settings = self.settings.clone();
        blocking("SMTP verification", move || {
            let connected = transport(&settings)?.test_connection()?;
            anyhow::ensure!(connected, "SMTP server did not accept the connection");
            Ok(())
        })
        .await?;

        tracing::info!(host = %self.settings.smtp_host, "SMTP connection verified");
        Ok(SendReport {
            success: true,
            message: "SMTP connection verified successfully".into(),
        })
    }

    pub async fn send_test_email(&self) -> Result<SendReport, AppError> {
        self.ensure_ready()?;
        self.send(
            TEST_SUBJECT.to_string(),
            "This is a test email from certdesk to verify the SMTP configuration is working correctly.".into(),
            render_test_html(),
        )
        .await
    }

    pub async fn send_expiry_alert(
        &self,
        certificates: &[ExpiringCertificate],
        warning_days: i64,
        critical_days: i64,
    ) -> Result<SendReport, AppError> {
        if certificates.is_empty() {
            return Ok(SendReport {
                success: false,
                message: "No certificates to notify about".into(),
            });
        }
        self.ensure_ready()?;
        self.send(
            self.settings.subject.clone(),
            render_expiry_text(certificates, warning_days, critical_days),
            render_expiry_html(certificates, warning_days, critical_days),
        )
        .await
    }

    async fn send(&self, subject: String, text: String, html: String) -> Result<SendReport, AppError> {
        let settings = self.settings.clone();
        let recipients = self.recipients();
        let count = recipients.len();

        blocking("Sending email", move || {
            let message = build_message(&settings, &recipients, &subject, text, html)?;
            transport(&settings)?.send(&message)?;
            Ok(())
        })
        .await?;

        tracing::info!(recipients = count, "Email sent");
        Ok(SendReport {
            success: true,
            message: format!("Email sent to {} recipient(s)", count),
        })
    }
}

async fn blocking<F>(what: &'static str, f: F) -> Result<(), AppError>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("{} task failed: {}", what, e)))?
        .map_err(|e| {
            tracing::error!(error = %e, "{} failed", what);
            AppError::Internal(format!("{} failed: {}", what, e))
        })
}

fn transport(settings: &EmailSettings) -> anyhow::Result<SmtpTransport> {
    let builder = if settings.smtp_secure {
        SmtpTransport::relay(&settings.smtp_host)?
    } else {
        let tls = TlsParameters::new(settings.smtp_host.clone())?;
        SmtpTransport::builder_dangerous(&settings.smtp_host).tls(Tls::Opportunistic(tls))
    };

    Ok(builder
        .port(settings.smtp_port)
        .credentials(Credentials::new(
            settings.smtp_user.clone(),
            settings.smtp_pass.clone(),
        ))
        .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECS)))
        .build())
}

fn build_message(
    settings: &EmailSettings,
    recipients: &[String],
    subject: &str,
    text: String,
    html: String,
) -> anyhow::Result<Message> {
    let from: Mailbox = settings
        .from
        .parse()
        .with_context(|| format!("invalid sender address '{}'", settings.from))?;

    let mut builder = Message::builder().from(from).subject(subject);
    for recipient in recipients {
        let to: Mailbox = recipient
            .parse()
            .with_context(|| format!("invalid recipient address '{}'", recipient))?;
        builder = builder.to(to);
    }

    Ok(builder.multipart(MultiPart::alternative_plain_html(text, html))?)
}

fn split(certificates: &[ExpiringCertificate]) -> (Vec<&ExpiringCertificate>, Vec<&ExpiringCertificate>) {
    certificates
        .iter()
        .partition(|c| c.priority == Priority::Critical)
}

fn domains_label(cert: &ExpiringCertificate) -> String {
    if cert.domains.is_empty() {
        "N/A".to_string()
    } else {
        cert.domains.join(", ")
    }
}

pub fn render_expiry_text(
    certificates: &[ExpiringCertificate],
    warning_days: i64,
    critical_days: i64,
) -> String {
    let (critical, warning) = split(certificates);
    let mut out = String::from("Certificate Expiry Alert\n\n");

    let sections = [
        (format!("CRITICAL - expiring within {} days", critical_days), critical),
        (format!("WARNING - expiring within {} days", warning_days), warning),
    ];
    for (title, certs) in sections {
        if certs.is_empty() {
            continue;
        }
        out.push_str(&title);
        out.push('\n');
        for cert in certs {
            out.push_str(&format!(
                "- {}\n  Domains: {}\n  Expires: {}\n  Days remaining: {}\n",
                cert.path,
                domains_label(cert),
                cert.expiry.format("%Y-%m-%d"),
                cert.days_until_expiry
            ));
        }
        out.push('\n');
    }

    out.push_str("Renew these certificates before they expire.\n");
    out
}

pub fn render_expiry_html(
    certificates: &[ExpiringCertificate],
    warning_days: i64,
    critical_days: i64,
) -> String {
    let (critical, warning) = split(certificates);
    let mut html = String::from(
        "<html><head><style>\
         body{font-family:Arial,sans-serif;color:#333}\
         .critical{background:#f8d7da;border:1px solid #f5c6cb;padding:15px;margin-bottom:15px}\
         .warning{background:#fff3cd;border:1px solid #ffeaa7;padding:15px;margin-bottom:15px}\
         table{width:100%;border-collapse:collapse}\
         th,td{border:1px solid #ddd;padding:8px;text-align:left}\
         </style></head><body>\
         <h2>Certificate Expiry Alert</h2>\
         <p>The following certificates are approaching expiry.</p>",
    );

    let sections = [
        ("critical", format!("Critical (&le; {} days)", critical_days), critical),
        ("warning", format!("Warning (&le; {} days)", warning_days), warning),
    ];
    for (class, title, certs) in sections {
        if certs.is_empty() {
            continue;
        }
        html.push_str(&format!(
            "<div class=\"{class}\"><h3>{title}</h3><table><thead><tr>\
             <th>Certificate</th><th>Domains</th><th>Expires</th><th>Days Remaining</th>\
             </tr></thead><tbody>"
        ));
        for cert in certs {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td><b>{}</b></td></tr>",
                escape_html(&cert.path),
                escape_html(&domains_label(cert)),
                cert.expiry.format("%Y-%m-%d"),
                cert.days_until_expiry
            ));
        }
        html.push_str("</tbody></table></div>");
    }

    html.push_str("<p>Generated by certdesk.</p></body></html>");
    html
}

fn render_test_html() -> String {
    "<html><body><h2>certdesk email test</h2>\
     <p>This is a test email to verify the SMTP configuration is working correctly.</p>\
     </body></html>"
        .to_string()
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn settings() -> EmailSettings {
        EmailSettings {
            enabled: true,
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            smtp_user: "mailer".into(),
            smtp_pass: "secret".into(),
            from: "certdesk@example.com".into(),
            to: " ops@example.com, ,dev@example.com ".into(),
            subject: "Certificate Expiry Alert".into(),
            ..EmailSettings::default()
        }
    }

    fn cert(path: &str, days: i64, priority: Priority) -> ExpiringCertificate {
        ExpiringCertificate {
            path: path.into(),
            expiry: Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap(),
            days_until_expiry: days,
            domains: vec!["example.com".into()],
            priority,
        }
    }

    #[test]
    fn recipients_are_trimmed_and_configuration_detected() {
        let service = EmailService::new(settings());
        assert_eq!(service.recipients(), vec!["ops@example.com", "dev@example.com"]);
        assert!(service.is_configured());
        assert_eq!(service.status().smtp.user, Some("***configured***"));

        let missing = EmailService::new(EmailSettings {
            smtp_pass: String::new(),
            ..settings()
        });
        assert!(!missing.is_configured());
    }

    #[tokio::test]
    async fn disabled_service_refuses_to_send() {
        let service = EmailService::new(EmailSettings {
            enabled: false,
            ..settings()
        });
        assert!(matches!(
            service.send_test_email().await,
            Err(AppError::BadRequest(_))
        ));
        let report = service.send_expiry_alert(&[], 30, 7).await.unwrap();
        assert!(!report.success);
    }

    #[test]
    fn alerts_split_into_sections() {
        let certs = vec![
            cert("2024-01-01/a.pem", 3, Priority::Critical),
            cert("2024-01-01/b.pem", 20, Priority::Warning),
        ];
        let text = render_expiry_text(&certs, 30, 7);
        let critical_at = text.find("CRITICAL").unwrap();
        let warning_at = text.find("WARNING").unwrap();
        assert!(critical_at < text.find("a.pem").unwrap());
        assert!(warning_at < text.find("b.pem").unwrap());
        assert!(text.contains("Days remaining: 3"));

        let only_warning = render_expiry_text(&certs[1..], 30, 7);
        assert!(!only_warning.contains("CRITICAL"));
    }

    #[test]
    fn html_alert_escapes_paths() {
        let certs = vec![cert("uploaded/<b>.pem", 1, Priority::Critical)];
        let html = render_expiry_html(&certs, 30, 7);
        assert!(html.contains("uploaded/&lt;b&gt;.pem"));
        assert!(!html.contains("<b>.pem"));
        assert!(html.contains("class=\"critical\""));
        assert!(!html.contains("class=\"warning\""));
    }

    #[test]
    fn messages_build_for_valid_addresses_only() {
        let s = settings();
        let service = EmailService::new(s.clone());
        assert!(build_message(&s, &service.recipients(), "subject", "t".into(), "<p>h</p>".into()).is_ok());
        assert!(build_message(&s, &["not an address".to_string()], "subject", "t".into(), "h".into()).is_err());
    }
}
