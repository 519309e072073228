use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - session may be expired")]
    Unauthorized,

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True for failures where the upstream was reached but refused the session.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::AuthFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status() {
        let from = ApiError::from_status;
        assert!(matches!(from(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(
            from(StatusCode::FORBIDDEN, "no"),
            ApiError::AccessDenied(b) if b == "no"
        ));
        assert!(matches!(from(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(from(StatusCode::BAD_GATEWAY, ""), ApiError::ServerError(_)));
        assert!(matches!(from(StatusCode::IM_A_TEAPOT, ""), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_is_auth() {
        assert!(ApiError::Unauthorized.is_auth());
        assert!(ApiError::AuthFailed("PIN login was rejected".to_string()).is_auth());
        assert!(!ApiError::Cancelled.is_auth());
        assert!(!ApiError::from_status(reqwest::StatusCode::FORBIDDEN, "").is_auth());
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "ж".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));
    }
}
