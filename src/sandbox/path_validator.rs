use crate::error::AppError;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// A user path confined to a base directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedPath {
    pub safe: bool,
    /// Decoded and normalized form of the user input.
    pub sanitized: String,
    /// Absolute location under the base directory.
    pub resolved: PathBuf,
    /// `resolved` relative to the base directory, `/`-separated.
    /// Never starts with `..` and is never absolute.
    pub relative: String,
}

#[derive(Debug)]
struct Rejection {
    regex: Regex,
    description: &'static str,
}

/// Decodes, normalizes and confines user-supplied relative paths.
///
/// Traversal is checked twice: on the decoded string before any path handling,
/// and again on the final path relative to the base directory.
#[derive(Debug)]
pub struct PathSanitizer {
    rejections: Vec<Rejection>,
    malformed_escape: Regex,
}

impl PathSanitizer {
    pub fn new() -> Self {
        let rejections = [
            (r"\.\./", "parent directory traversal"),
            (r"\.\.\\", "parent directory traversal"),
            (r"\.\.$", "trailing parent directory"),
            (r"/\.\.", "parent directory traversal"),
            (r"\\\.\.", "parent directory traversal"),
            (r"^~/", "home directory reference"),
            (r"^/[^/]", "absolute path"),
            (r"^[A-Za-z]:\\", "absolute Windows path"),
            (r"\x00", "null byte"),
            (r#"[<>"|*?]"#, "invalid filename character"),
            (r"//", "doubled separator"),
            (r"\\\\", "doubled separator"),
            (r"[/\\]$", "trailing separator"),
        ]
        .into_iter()
        .map(|(pattern, description)| Rejection {
            regex: Regex::new(pattern).expect("valid path regex"),
            description,
        })
        .collect();

        Self {
            rejections,
            malformed_escape: Regex::new(
                r"%([^0-9A-Fa-f]|[0-9A-Fa-f][^0-9A-Fa-f]|[0-9A-Fa-f]?$)",
            )
            .expect("valid regex"),
        }
    }

    pub fn sanitize(&self, user_path: &str, base_dir: &Path) -> Result<SanitizedPath, AppError> {
        let clean = user_path.replace('\0', "");
        if clean.is_empty() {
            return Err(AppError::InvalidPath("path must be a non-empty string".into()));
        }

        let decoded = self.decode(&clean)?;

        if let Some(rule) = self.rejections.iter().find(|r| r.regex.is_match(&decoded)) {
            tracing::warn!(
                path = %decoded,
                rule = rule.description,
                "Rejected unsafe path"
            );
            return Err(AppError::InvalidPath(format!(
                "contains unsafe pattern '{}'",
                decoded
            )));
        }

        let sanitized = normalize_relative(&decoded);
        let base = absolute_base(base_dir)?;
        let resolved = lexical_normalize(&base.join(&sanitized));

        let relative = match resolved.strip_prefix(&base) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => return Err(access_denied(&decoded)),
        };

        if relative.starts_with("..") || Path::new(&relative).is_absolute() {
            return Err(access_denied(&decoded));
        }

        Ok(SanitizedPath {
            safe: true,
            sanitized,
            resolved,
            relative,
        })
    }

    // decodeURIComponent semantics: every `%` must start a two-digit hex
    // escape, and the decoded bytes must be UTF-8.
    fn decode(&self, raw: &str) -> Result<String, AppError> {
        if self.malformed_escape.is_match(raw) {
            return Err(AppError::InvalidPath("malformed URI encoding".into()));
        }
        percent_decode_str(raw)
            .decode_utf8()
            .map(|s| s.into_owned())
            .map_err(|_| AppError::InvalidPath("malformed URI encoding".into()))
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

fn access_denied(path: &str) -> AppError {
    tracing::warn!(path = %path, "Path resolves outside the allowed directory");
    AppError::AccessDenied(format!("path outside allowed directory '{}'", path))
}

/// POSIX-style normalization of a relative path: drops empty and `.`
/// segments and folds `..` into its parent where one exists.
fn normalize_relative(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// `base_dir` made absolute against the working directory and normalized.
pub fn absolute_base(base_dir: &Path) -> Result<PathBuf, AppError> {
    let base = if base_dir.is_absolute() {
        base_dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(base_dir)
    };
    Ok(lexical_normalize(&base))
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> PathSanitizer {
        PathSanitizer::new()
    }

    const BASE: &str = "/app/certificates";

    #[test]
    fn relative_path_resolves_under_base() {
        let result = sanitizer().sanitize("sub/dir", Path::new(BASE)).unwrap();
        assert!(result.safe);
        assert_eq!(result.relative, "sub/dir");
        assert_eq!(result.sanitized, "sub/dir");
        assert_eq!(result.resolved, PathBuf::from("/app/certificates/sub/dir"));
    }

    #[test]
    fn resolving_then_relativizing_round_trips() {
        let s = sanitizer();
        for input in ["a.pem", "2024-01-01/a.pem", "2024-01-01/archive/a-key.pem"] {
            let result = s.sanitize(input, Path::new(BASE)).unwrap();
            assert_eq!(result.relative, input);
            assert_eq!(result.resolved, Path::new(BASE).join(input));
        }
    }

    #[test]
    fn current_dir_segments_are_normalized_away() {
        let result = sanitizer().sanitize("./sub/./x.pem", Path::new(BASE)).unwrap();
        assert_eq!(result.relative, "sub/x.pem");
    }

    #[test]
    fn traversal_is_rejected() {
        let s = sanitizer();
        for input in [
            "../../etc/passwd",
            "sub/../../etc/passwd",
            "..\\windows",
            "sub/..",
            "..",
            "%2e%2e%2fetc%2fpasswd",
            "%2E%2E/secret",
        ] {
            let err = s.sanitize(input, Path::new(BASE)).unwrap_err();
            assert!(
                matches!(err, AppError::InvalidPath(_) | AppError::AccessDenied(_)),
                "{input} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn dotdot_prefixed_names_are_denied_after_resolution() {
        let err = sanitizer().sanitize("..hidden", Path::new(BASE)).unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
    }

    #[test]
    fn absolute_and_home_paths_are_rejected() {
        let s = sanitizer();
        for input in ["/etc/passwd", "C:\\Windows", "~/.ssh/id_rsa", "%2Fetc%2Fpasswd"] {
            assert!(matches!(
                s.sanitize(input, Path::new(BASE)),
                Err(AppError::InvalidPath(_))
            ));
        }
    }

    #[test]
    fn invalid_characters_and_separators_are_rejected() {
        let s = sanitizer();
        for input in ["a<b.pem", "a|b", "what?.pem", "a//b", "a\\\\b", "dir/", "dir\\", "a\"b"] {
            assert!(
                matches!(s.sanitize(input, Path::new(BASE)), Err(AppError::InvalidPath(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn malformed_encoding_is_rejected() {
        let s = sanitizer();
        for input in ["%", "%zz", "a%2", "%E0%A4%A"] {
            assert!(
                matches!(s.sanitize(input, Path::new(BASE)), Err(AppError::InvalidPath(_))),
                "{input} should be rejected"
            );
        }
        assert!(matches!(
            s.sanitize("%C3%28", Path::new(BASE)),
            Err(AppError::InvalidPath(_))
        ));
    }

    #[test]
    fn encoded_input_is_decoded() {
        let result = sanitizer()
            .sanitize("my%20cert.pem", Path::new(BASE))
            .unwrap();
        assert_eq!(result.relative, "my cert.pem");
    }

    #[test]
    fn null_bytes_are_stripped_before_checks() {
        let result = sanitizer().sanitize("a\0b.pem", Path::new(BASE)).unwrap();
        assert_eq!(result.relative, "ab.pem");
        assert!(matches!(
            sanitizer().sanitize("\0", Path::new(BASE)),
            Err(AppError::InvalidPath(_))
        ));
    }

    #[test]
    fn encoded_null_byte_is_rejected() {
        assert!(matches!(
            sanitizer().sanitize("a%00b", Path::new(BASE)),
            Err(AppError::InvalidPath(_))
        ));
    }

    #[test]
    fn relative_base_is_made_absolute() {
        let result = sanitizer()
            .sanitize("x.pem", Path::new("certificates"))
            .unwrap();
        assert!(result.resolved.is_absolute());
        assert!(result.resolved.ends_with("certificates/x.pem"));
        assert_eq!(result.relative, "x.pem");
    }

    #[test]
    fn normalize_relative_folds_parents() {
        assert_eq!(normalize_relative("a/b/../c"), "a/c");
        assert_eq!(normalize_relative("./"), ".");
        assert_eq!(normalize_relative("../a"), "../a");
    }
}
