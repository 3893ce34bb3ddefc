//! Error types for the Rally client
//!
//! This module provides the error hierarchy for the crate, built on
//! `thiserror`. HTTP status codes map onto dedicated variants; WSAPI-level
//! problems reported inside an otherwise successful response surface as
//! [`Error::Service`].

use std::time::Duration;
use thiserror::Error;

/// Result type alias for operations that can fail with a client error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Rally client.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested entity type is not a single recognized Rally entity.
    ///
    /// The payload is the offending name exactly as supplied, including
    /// comma-separated lists of several names.
    #[error("not a valid Rally entity: {0}")]
    InvalidTypeName(String),

    /// Query criteria could not be normalized into a WSAPI condition.
    #[error("Invalid query criteria: {0}")]
    InvalidQuery(String),

    /// The service answered, but reported errors in the response body.
    #[error("Rally reported errors: {}", errors.join("; "))]
    Service {
        /// Error strings from the `Errors` array
        errors: Vec<String>,
    },

    /// Authentication failed (401).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Permission denied (403).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resource not found (404).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded (429).
    #[error("Rate limit exceeded")]
    RateLimit {
        /// Time to wait before retrying, if provided by the service
        retry_after: Option<Duration>,
    },

    /// Internal server error (500+).
    #[error("Internal server error: {0}")]
    InternalServerError(String),

    /// Generic API error for status codes not covered above.
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Failed to interpret a response body.
    #[error("Failed to parse API response: {0}")]
    ResponseValidation(String),

    /// Network or connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timeout.
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP client configuration or initialization error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    /// Invalid HTTP header name.
    #[error("Invalid HTTP header name: {0}")]
    InvalidHeaderName(String),

    /// Invalid HTTP header value.
    #[error("Invalid HTTP header value: {0}")]
    InvalidHeaderValue(String),

    /// Other errors not covered by specific variants.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an error from an HTTP response status and body.
    ///
    /// WSAPI wraps failures as `{"OperationResult": {"Errors": [...]}}` (or
    /// under `QueryResult`); when such a body is present its messages are
    /// used, otherwise the raw body text.
    pub fn from_response(status: u16, body: &str, headers: &http::HeaderMap) -> Self {
        let message = wsapi_errors(body)
            .filter(|errors| !errors.is_empty())
            .map(|errors| errors.join("; "))
            .unwrap_or_else(|| body.trim().to_string());

        match status {
            401 => Error::Authentication(message),
            403 => Error::PermissionDenied(message),
            404 => Error::NotFound(message),
            429 => Error::RateLimit {
                retry_after: headers
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs),
            },
            s if s >= 500 => Error::InternalServerError(message),
            _ => Error::ApiError { status, message },
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimit { .. } => true,
            Error::InternalServerError(_) => true,
            Error::Connection(_) => true,
            Error::Timeout(_) => true,
            Error::ApiError { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }

    /// Get retry delay if this is a rate limit error with retry-after.
    pub fn retry_after(&self) -> Option<Duration> {
        if let Error::RateLimit { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }
}

/// Pull the `Errors` array out of a WSAPI envelope, whatever its root key.
fn wsapi_errors(body: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let envelope = value.as_object()?.values().next()?;
    let errors = envelope.get("Errors")?.as_array()?;
    Some(
        errors
            .iter()
            .filter_map(|e| e.as_str().map(String::from))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_type_name_carries_payload() {
        let error = Error::InvalidTypeName("Project,Workspace".to_string());
        match &error {
            Error::InvalidTypeName(name) => assert_eq!(name, "Project,Workspace"),
            _ => panic!("Expected InvalidTypeName variant"),
        }
        assert_eq!(
            error.to_string(),
            "not a valid Rally entity: Project,Workspace"
        );
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::RateLimit { retry_after: None }.is_retryable());
        assert!(Error::InternalServerError("test".to_string()).is_retryable());
        assert!(Error::Connection("test".to_string()).is_retryable());
        assert!(Error::Timeout(Duration::from_secs(30)).is_retryable());

        assert!(!Error::InvalidTypeName("Payjammas".to_string()).is_retryable());
        assert!(!Error::Authentication("test".to_string()).is_retryable());
        assert!(
            !Error::Service {
                errors: vec!["Could not parse".to_string()]
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_retry_after() {
        let error = Error::RateLimit {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(error.retry_after(), Some(Duration::from_secs(60)));
        assert_eq!(Error::NotFound("x".to_string()).retry_after(), None);
    }

    #[test]
    fn test_from_response_uses_wsapi_errors() {
        let body = r#"{"OperationResult":{"Errors":["Cannot find object to read"],"Warnings":[]}}"#;
        let error = Error::from_response(404, body, &http::HeaderMap::new());
        match error {
            Error::NotFound(msg) => assert_eq!(msg, "Cannot find object to read"),
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_from_response_plain_body() {
        let error = Error::from_response(401, "<html>Unauthorized</html>", &http::HeaderMap::new());
        match error {
            Error::Authentication(msg) => assert_eq!(msg, "<html>Unauthorized</html>"),
            other => panic!("Expected Authentication, got {other:?}"),
        }
    }

    #[test]
    fn test_from_response_rate_limit_header() {
        let mut headers = http::HeaderMap::new();
        headers.insert("retry-after", http::HeaderValue::from_static("7"));
        let error = Error::from_response(429, "", &headers);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_from_response_server_and_other() {
        let headers = http::HeaderMap::new();
        assert!(matches!(
            Error::from_response(503, "down", &headers),
            Error::InternalServerError(_)
        ));
        assert!(matches!(
            Error::from_response(400, "bad", &headers),
            Error::ApiError { status: 400, .. }
        ));
    }
}
