use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Command not allowed: {0}")]
    InvalidCommand(String),

    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    #[error("{message}")]
    SubprocessFailure { message: String, stderr: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::InvalidCommand(_)
            | AppError::InvalidPath(_)
            | AppError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::SubprocessFailure { .. }
            | AppError::Internal(_)
            | AppError::Io(_)
            | AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %message);
        } else {
            tracing::warn!(status = %status, error = %message);
        }

        let mut error = json!({
            "code": status.as_u16(),
            "message": message,
        });
        if let AppError::SubprocessFailure { stderr, .. } = &self {
            if !stderr.is_empty() {
                error["stderr"] = json!(stderr);
            }
        }

        let body = json!({
            "data": null,
            "error": error,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_client_statuses() {
        assert_eq!(
            AppError::InvalidCommand("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidPath("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidFilename("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::AccessDenied("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::Timeout(30).status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn subprocess_failure_displays_message_only() {
        let err = AppError::SubprocessFailure {
            message: "mkcert exited with status 1".into(),
            stderr: "boom".into(),
        };
        assert_eq!(err.to_string(), "mkcert exited with status 1");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
