use std::fmt;

use reqwest::header::HeaderMap;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Airly rejected the API key: {0}")]
    InvalidApiKey(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Airly {0} limit reached")]
    RateLimited(RateLimitWindow),

    #[error("Airly server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// The request quota a 429 response exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitWindow {
    Day,
    Minute,
    Unknown,
}

impl RateLimitWindow {
    /// Read Airly's `X-RateLimit-Remaining-{day,minute}` headers.
    /// The daily quota wins when both are spent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let spent = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
                .is_some_and(|remaining| remaining <= 0)
        };

        if spent("x-ratelimit-remaining-day") {
            RateLimitWindow::Day
        } else if spent("x-ratelimit-remaining-minute") {
            RateLimitWindow::Minute
        } else {
            RateLimitWindow::Unknown
        }
    }
}

impl fmt::Display for RateLimitWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RateLimitWindow::Day => "daily request",
            RateLimitWindow::Minute => "per-minute request",
            RateLimitWindow::Unknown => "request",
        })
    }
}

// Error body: {"errorCode": "INSTALLATION_NOT_FOUND", "message": "...", "details": {}}
#[derive(Debug, Deserialize)]
struct AirlyErrorBody {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    message: Option<String>,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
            format!("{}... (truncated, {} total bytes)", cut, body.len())
        }
    }

    /// Airly's `errorCode: message` when the body is its JSON error shape,
    /// otherwise the raw body, truncated.
    fn describe_body(body: &str) -> String {
        match serde_json::from_str::<AirlyErrorBody>(body) {
            Ok(AirlyErrorBody {
                error_code,
                message: Some(message),
            }) => match error_code {
                Some(code) => Self::truncate_body(&format!("{}: {}", code, message)),
                None => Self::truncate_body(&message),
            },
            _ => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = Self::describe_body(body);
        match status.as_u16() {
            401 => ApiError::InvalidApiKey(detail),
            403 => ApiError::AccessDenied(detail),
            404 => ApiError::NotFound(detail),
            429 => ApiError::RateLimited(RateLimitWindow::Unknown),
            500..=599 => ApiError::ServerError(detail),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::InvalidApiKey(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited(RateLimitWindow::Unknown)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError(body) if body == "upstream"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, "tea"),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_airly_error_body_is_summarized() {
        let body = r#"{"errorCode": "INSTALLATION_NOT_FOUND", "message": "Installation with id 99 not found", "details": {}}"#;
        match ApiError::from_status(StatusCode::NOT_FOUND, body) {
            ApiError::NotFound(msg) => {
                assert_eq!(msg, "INSTALLATION_NOT_FOUND: Installation with id 99 not found")
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"message": "Invalid authentication credentials"}"#);
        assert_eq!(
            err.to_string(),
            "Airly rejected the API key: Invalid authentication credentials"
        );
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(2000);
        match ApiError::from_status(StatusCode::NOT_FOUND, &body) {
            ApiError::NotFound(msg) => {
                assert!(msg.len() < 600);
                assert!(msg.contains("2000 total bytes"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rate_limit_window_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(RateLimitWindow::from_headers(&headers), RateLimitWindow::Unknown);

        headers.insert("X-RateLimit-Remaining-day", HeaderValue::from_static("57"));
        headers.insert("X-RateLimit-Remaining-minute", HeaderValue::from_static("0"));
        assert_eq!(RateLimitWindow::from_headers(&headers), RateLimitWindow::Minute);

        headers.insert("X-RateLimit-Remaining-day", HeaderValue::from_static("0"));
        let window = RateLimitWindow::from_headers(&headers);
        assert_eq!(window, RateLimitWindow::Day);
        assert_eq!(
            ApiError::RateLimited(window).to_string(),
            "Airly daily request limit reached"
        );
    }
}
