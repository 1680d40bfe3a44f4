use crate::error::AppError;
use regex::Regex;

pub const MAX_FILENAME_BYTES: usize = 255;

/// Rejects filenames that are unsafe on any common filesystem.
#[derive(Debug)]
pub struct FilenameValidator {
    rejections: Vec<(Regex, &'static str)>,
}

impl FilenameValidator {
    pub fn new() -> Self {
        let rejections = [
            (r"\x00", "null byte"),
            (r"\.\.\.", "repeated dots"),
            (r"^\.\.?$", "relative directory name"),
            (r#"[<>"|*?\\/]"#, "invalid character or path separator"),
            (
                r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])(\.|$)",
                "reserved device name",
            ),
            (r"\s$", "trailing whitespace"),
            (r"\.$", "trailing dot"),
        ]
        .into_iter()
        .map(|(pattern, description)| {
            (Regex::new(pattern).expect("valid filename regex"), description)
        })
        .collect();

        Self { rejections }
    }

    /// Returns the name unchanged when it is safe to use as a single path segment.
    pub fn validate(&self, name: &str) -> Result<String, AppError> {
        if name.is_empty() {
            return Err(AppError::InvalidFilename(
                "filename must be a non-empty string".into(),
            ));
        }

        if let Some((_, rule)) = self.rejections.iter().find(|(re, _)| re.is_match(name)) {
            tracing::warn!(filename = %name.escape_debug(), rule = *rule, "Rejected unsafe filename");
            return Err(AppError::InvalidFilename(format!(
                "contains unsafe pattern '{}'",
                name.escape_debug()
            )));
        }

        if name.len() > MAX_FILENAME_BYTES {
            return Err(AppError::InvalidFilename("filename too long".into()));
        }

        Ok(name.to_string())
    }

    /// `validate` plus the `.pem` extension the certificate routes require.
    pub fn validate_pem(&self, name: &str) -> Result<String, AppError> {
        let name = self.validate(name)?;
        if !name.ends_with(".pem") {
            return Err(AppError::BadRequest(
                "Only certificate files (.pem) are allowed".into(),
            ));
        }
        Ok(name)
    }
}

impl Default for FilenameValidator {
    fn default() -> Self {
        Self::new()
    }
}
