use crate::error::AppError;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static INLINE_PASSWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pass:\S*").expect("valid regex"));

/// `command` with any inline `pass:` secret masked, for logs and responses.
pub fn redact(command: &str) -> Cow<'_, str> {
    INLINE_PASSWORD.replace_all(command, "pass:***")
}

/// Command shapes whose fixed grammar legitimately contains characters that
/// the dangerous-pattern table rejects everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandShape {
    /// `cd "<dir>" && mkcert ...`
    CdMkcert,
    /// `openssl x509|pkcs12|version ...`
    Openssl,
    Plain,
}

#[derive(Debug)]
struct AllowedPattern {
    regex: Regex,
    description: &'static str,
}

#[derive(Debug)]
struct DangerousPattern {
    regex: Regex,
    description: &'static str,
    waived_for: &'static [CommandShape],
}

// Space-separated domain list accepted by mkcert (wildcards included).
const DOMAINS: &str = r"[\w.* -]+";

/// Closed allowlist of the mkcert/openssl invocations the console issues.
///
/// A command passes when it fully matches one allowed pattern and none of the
/// dangerous patterns that apply to its shape.
#[derive(Debug)]
pub struct CommandValidator {
    allowed: Vec<AllowedPattern>,
    dangerous: Vec<DangerousPattern>,
    cd_mkcert: Regex,
    openssl: Regex,
}

impl CommandValidator {
    pub fn new() -> Self {
        let allowed = [
            (
                r"^mkcert\s+(-CAROOT|--help|-help|-install|-uninstall)$".to_string(),
                "mkcert basic operation",
            ),
            (format!(r"^mkcert\s+{DOMAINS}$"), "mkcert domain list"),
            (
                format!(r#"^mkcert\s+-cert-file\s+"[^"]+"\s+-key-file\s+"[^"]+"\s+{DOMAINS}$"#),
                "mkcert with explicit output files",
            ),
            (
                format!(
                    r#"^cd\s+"[^"]+"\s+&&\s+mkcert\s+-cert-file\s+"[^"]+"\s+-key-file\s+"[^"]+"\s+{DOMAINS}$"#
                ),
                "mkcert inside a certificate folder",
            ),
            (
                r#"^ls\s+(-la\s+)?\*\.pem(\s+2>/dev/null\s+\|\|\s+echo\s+"[^"]+")?$"#.to_string(),
                "certificate listing",
            ),
            (r"^openssl\s+version$".to_string(), "openssl version"),
            (
                r#"^openssl\s+x509\s+-in\s+"[^"]+"\s+-noout\s+[^|;&`$(){}\[\]<>]+$"#.to_string(),
                "openssl certificate inspection",
            ),
            (
                r#"^openssl\s+pkcs12\s+-export\s+-out\s+"[^"]+"\s+-inkey\s+"[^"]+"\s+-in\s+"[^"]+"\s+(-certfile\s+"[^"]+"\s+)?-passout\s+(pass:[^;|&`$]*|file:"[^"]+")(\s+-legacy)?$"#
                    .to_string(),
                "openssl pkcs12 export",
            ),
        ]
        .into_iter()
        .map(|(pattern, description)| AllowedPattern {
            regex: Regex::new(&pattern).expect("valid allowlist regex"),
            description,
        })
        .collect();

        use CommandShape::{CdMkcert, Openssl};
        let dangerous: [(&str, &'static str, &'static [CommandShape]); 8] = [
            (r"[;(){}\[\]<>]", "shell metacharacter", &[]),
            (r"&", "command chaining", &[CdMkcert]),
            (r"[|`$]", "pipe or substitution", &[Openssl]),
            (r"\.\./", "directory traversal", &[]),
            (r"/etc/|/bin/|/usr/bin/|/sbin/", "system directory", &[Openssl]),
            (r"(?i)\b(rm|del|format)\s+", "deletion command", &[Openssl]),
            (r">\s*/|>>\s*/", "redirection to absolute path", &[Openssl]),
            (r"(?i)\bsudo\b|\bsu\s", "privilege escalation", &[Openssl]),
        ];
        let dangerous = dangerous
            .into_iter()
            .map(|(pattern, description, waived_for)| DangerousPattern {
                regex: Regex::new(pattern).expect("valid dangerous-pattern regex"),
                description,
                waived_for,
            })
            .collect();

        Self {
            allowed,
            dangerous,
            cd_mkcert: Regex::new(r#"^cd\s+"[^"]+"\s+&&\s+mkcert"#).expect("valid regex"),
            openssl: Regex::new(r"^openssl\s+(x509|pkcs12|version)").expect("valid regex"),
        }
    }

    /// Returns true when the command may be executed. Every rejection is logged.
    pub fn is_safe(&self, command: &str) -> bool {
        let command = command.trim();
        if command.is_empty() {
            tracing::warn!("Blocked empty command");
            return false;
        }
        // Every allowed shape is a single line.
        if command.chars().any(char::is_control) {
            tracing::warn!(command = %redact(command).escape_debug(), "Blocked command with control characters");
            return false;
        }

        let Some(allowed) = self.allowed.iter().find(|p| p.regex.is_match(command)) else {
            tracing::warn!(command = %redact(command), "Blocked command not on allowlist");
            return false;
        };

        let shape = self.shape_of(command);
        let hit = self
            .dangerous
            .iter()
            .filter(|p| !p.waived_for.contains(&shape))
            .find(|p| p.regex.is_match(command));

        if let Some(pattern) = hit {
            tracing::warn!(
                command = %redact(command),
                pattern = pattern.description,
                "Blocked command with dangerous pattern"
            );
            return false;
        }

        tracing::debug!(command = %redact(command), pattern = allowed.description, "Command allowed");
        true
    }

    /// `is_safe` as a `Result`, for call sites that propagate with `?`.
    pub fn check(&self, command: &str) -> Result<(), AppError> {
        if self.is_safe(command) {
            Ok(())
        } else {
            Err(AppError::InvalidCommand(
                "Invalid or potentially dangerous command detected".into(),
            ))
        }
    }

    fn shape_of(&self, command: &str) -> CommandShape {
        if self.cd_mkcert.is_match(command) {
            CommandShape::CdMkcert
        } else if self.openssl.is_match(command) {
            CommandShape::Openssl
        } else {
            CommandShape::Plain
        }
    }
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> CommandValidator {
        CommandValidator::new()
    }

    #[test]
    fn basic_mkcert_operations_are_allowed() {
        let v = validator();
        for cmd in ["mkcert -CAROOT", "mkcert -install", "mkcert -uninstall", "mkcert --help"] {
            assert!(v.is_safe(cmd), "{cmd} should be allowed");
        }
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert!(validator().is_safe("  mkcert -CAROOT \n"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let v = validator();
        assert!(!v.is_safe(""));
        assert!(!v.is_safe("   "));
    }

    #[test]
    fn domain_generation_is_allowed() {
        let v = validator();
        assert!(v.is_safe("mkcert example.com localhost 127.0.0.1 *.example.com"));
        assert!(v.is_safe(
            r#"mkcert -cert-file "example.com.pem" -key-file "example.com-key.pem" example.com"#
        ));
    }

    #[test]
    fn cd_mkcert_compound_is_allowed() {
        let cmd = r#"cd "/tmp/certs/2024-01-01" && mkcert -cert-file "x.pem" -key-file "x-key.pem" example.com"#;
        assert!(validator().is_safe(cmd));
    }

    #[test]
    fn cd_mkcert_still_rejects_other_metacharacters() {
        let v = validator();
        let subst = r#"cd "$(reboot)" && mkcert -cert-file "x.pem" -key-file "x-key.pem" example.com"#;
        assert!(!v.is_safe(subst));
        let traversal = r#"cd "../../etc" && mkcert -cert-file "x.pem" -key-file "x-key.pem" example.com"#;
        assert!(!v.is_safe(traversal));
    }

    #[test]
    fn injected_commands_are_rejected() {
        let v = validator();
        for cmd in [
            "mkcert example.com; rm -rf /",
            "mkcert example.com && rm -rf /",
            "mkcert example.com | sh",
            "mkcert `whoami`",
            "mkcert $(whoami)",
            "mkcert example.com > /etc/passwd",
            "mkcert {a,b}",
            "mkcert [abc]",
            "rm -rf /",
            "sudo mkcert -install",
            "cat /etc/passwd",
        ] {
            assert!(!v.is_safe(cmd), "{cmd} should be rejected");
        }
    }

    #[test]
    fn metacharacters_outside_exception_shapes_are_rejected() {
        let v = validator();
        for ch in [';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>'] {
            let cmd = format!("mkcert example{ch}com");
            assert!(!v.is_safe(&cmd), "{cmd} should be rejected");
            let cmd = format!("ls -la *.pem {ch}");
            assert!(!v.is_safe(&cmd), "{cmd} should be rejected");
        }
    }

    #[test]
    fn deletion_words_inside_domains_do_not_trip_the_filter() {
        assert!(validator().is_safe("mkcert model example.com"));
    }

    #[test]
    fn plain_listing_is_allowed_but_redirection_is_not() {
        let v = validator();
        assert!(v.is_safe("ls *.pem"));
        assert!(v.is_safe("ls -la *.pem"));
        assert!(!v.is_safe(r#"ls -la *.pem 2>/dev/null || echo "No certificates found""#));
        assert!(!v.is_safe("ls /etc"));
    }

    #[test]
    fn openssl_inspection_is_allowed() {
        let v = validator();
        assert!(v.is_safe("openssl version"));
        assert!(v.is_safe(r#"openssl x509 -in "/home/dev/certs/a.pem" -noout -enddate"#));
        assert!(v.is_safe(
            r#"openssl x509 -in "/etc/ssl/rootCA.pem" -noout -subject -issuer -dates -fingerprint"#
        ));
        assert!(!v.is_safe(r#"openssl x509 -in "a.pem" -noout -text; id"#));
        assert!(!v.is_safe(r#"openssl x509 -in "../a.pem" -noout -text"#));
        assert!(!v.is_safe("openssl s_client -connect example.com:443"));
    }

    #[test]
    fn openssl_pkcs12_export_is_allowed() {
        let v = validator();
        assert!(v.is_safe(
            r#"openssl pkcs12 -export -out "/c/a.pfx" -inkey "/c/a-key.pem" -in "/c/a.pem" -passout pass:"#
        ));
        assert!(v.is_safe(
            r#"openssl pkcs12 -export -out "/c/a.pfx" -inkey "/c/a-key.pem" -in "/c/a.pem" -certfile "/ca/rootCA.pem" -passout pass:secret -legacy"#
        ));
        assert!(!v.is_safe(
            r#"openssl pkcs12 -export -out "/c/a.pfx" -inkey "/c/a-key.pem" -in "/c/a.pem" -passout pass:x;reboot"#
        ));
    }

    #[test]
    fn embedded_line_breaks_are_rejected() {
        let v = validator();
        for cmd in [
            "mkcert\nreboot",
            "mkcert -install\nreboot",
            "mkcert example.com\r\nreboot",
            "openssl x509 -in \"a.pem\" -noout -text\nreboot",
            "mkcert\texample.com\u{0}",
        ] {
            assert!(!v.is_safe(cmd), "{cmd:?} should be rejected");
        }
    }

    #[test]
    fn redact_masks_inline_passwords() {
        let rendered = r#"openssl pkcs12 -export -out "/c/a.pfx" -passout pass:Hunter2-secret -legacy"#;
        let masked = redact(rendered);
        assert!(!masked.contains("Hunter2-secret"));
        assert!(masked.contains("-passout pass:*** -legacy"));
        assert!(matches!(redact("mkcert -CAROOT"), Cow::Borrowed(_)));
    }

    #[test]
    fn check_maps_rejection_to_invalid_command() {
        let err = validator().check("mkcert example.com; rm -rf /").unwrap_err();
        assert!(matches!(err, AppError::InvalidCommand(_)));
        assert!(validator().check("mkcert -CAROOT").is_ok());
    }
}
