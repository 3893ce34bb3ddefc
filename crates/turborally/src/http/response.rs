//! HTTP response handling

use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

/// HTTP response wrapper.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    /// Number of retries taken before this response was received
    pub retries_taken: u32,
    /// Time elapsed across all attempts
    pub elapsed: std::time::Duration,
}

impl Response {
    /// Create a new response.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
        retries_taken: u32,
        elapsed: std::time::Duration,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            retries_taken,
            elapsed,
        }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, crate::error::Error> {
        serde_json::from_slice(&self.body).map_err(crate::error::Error::Serialization)
    }

    /// Check if the response is successful (2xx status).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response is an error (4xx or 5xx status).
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    /// Parse a successful response, converting HTTP errors to client errors.
    pub fn parse_result<T: DeserializeOwned>(self) -> Result<T, crate::error::Error> {
        if self.is_error() {
            return Err(crate::error::Error::from_response(
                self.status.as_u16(),
                &String::from_utf8_lossy(&self.body),
                &self.headers,
            ));
        }
        self.json()
    }
}
