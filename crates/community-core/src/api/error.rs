use reqwest::StatusCode;
use thiserror::Error;

use crate::auth::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired: {0}")]
    Unauthorized(String),

    #[error("HTTP {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Stored token is not a valid header value")]
    InvalidToken,

    #[error("Credential storage failed: {0}")]
    Storage(#[from] StoreError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Prefer the backend's `message` field, then a framework `error` field.
    /// JSON bodies without either fall back to the status reason; only plain
    /// text bodies are shown as they are.
    fn extract_message(status: StatusCode, body: &str) -> String {
        let reason = || {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        };
        let field = |json: &serde_json::Value, name: &str| {
            json.get(name)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
        };

        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(json) => field(&json, "message")
                .or_else(|| field(&json, "error"))
                .map(|m| Self::truncate_body(&m))
                .unwrap_or_else(reason),
            Err(_) if body.trim().is_empty() => reason(),
            Err(_) => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = Self::extract_message(status, body);
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
            _ => ApiError::Http { status, message },
        }
    }

    /// HTTP status of the failure, if the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED),
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(e) => e.status(),
            ApiError::InvalidResponse(_) | ApiError::InvalidToken | ApiError::Storage(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// No response was received (connect failure, timeout, ...)
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(e) if e.status().is_none())
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized(_) => "Session expired. Please log in again.".to_string(),
            ApiError::Http { message, .. } => message.clone(),
            ApiError::Network(e) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            ApiError::Network(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            ApiError::InvalidResponse(_) => "Unexpected response from server.".to_string(),
            ApiError::InvalidToken => "Saved login is invalid. Please log in again.".to_string(),
            ApiError::Storage(_) => "Could not access saved credentials.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_uses_backend_message() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"message":"Title is required"}"#,
        );
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.user_message(), "Title is required");
    }

    #[test]
    fn test_from_status_unauthorized() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, "");
        assert!(err.is_unauthorized());
        assert!(matches!(err, ApiError::Unauthorized(ref m) if m == "Unauthorized"));
    }

    #[test]
    fn test_from_status_plain_body() {
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, ApiError::Http { ref message, .. } if message == "boom"));
        assert!(!err.is_network());
    }

    #[test]
    fn test_framework_error_body_is_not_shown_raw() {
        let body = r#"{"timestamp":"2024-03-01T10:15:30.000+00:00","status":500,"error":"Internal Server Error","path":"/api/auth/login"}"#;
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, body);
        assert_eq!(err.user_message(), "Internal Server Error");

        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, r#"{"status":502}"#);
        assert_eq!(err.user_message(), "Bad Gateway");
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, &body);
        match err {
            ApiError::Http { message, .. } => {
                assert!(message.contains("truncated"));
                assert!(message.len() < body.len() + 40);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
