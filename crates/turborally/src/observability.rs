//! Centralized observability utilities for structured logging
//!
//! All HTTP requests/responses and query page fetches are logged through
//! this layer so field names stay consistent across the crate.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// HTTP request metadata for structured logging
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path
    pub path: String,
}

impl RequestMetadata {
    /// Create new request metadata
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Log request being sent
    pub fn log_request(&self) {
        debug!(
            method = %self.method,
            path = %self.path,
            "Sending HTTP request"
        );
    }
}

/// HTTP response metadata for structured logging
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// HTTP status code
    pub status: u16,
    /// Response body size in bytes (optional)
    pub body_size: Option<usize>,
    /// Time elapsed for the request
    pub elapsed: Duration,
    /// Number of retries taken (if any)
    pub retries: u32,
}

impl ResponseMetadata {
    /// Create new response metadata
    pub fn new(status: u16, elapsed: Duration) -> Self {
        Self {
            status,
            body_size: None,
            elapsed,
            retries: 0,
        }
    }

    /// Set the response body size
    pub fn with_body_size(mut self, size: usize) -> Self {
        self.body_size = Some(size);
        self
    }

    /// Set the number of retries
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Log successful response
    pub fn log_success(&self) {
        info!(
            status = self.status,
            elapsed_ms = self.elapsed.as_millis(),
            body_size = self.body_size,
            retries = self.retries,
            "HTTP request succeeded"
        );
    }

    /// Log failed response
    pub fn log_error(&self, error: &str) {
        warn!(
            status = self.status,
            elapsed_ms = self.elapsed.as_millis(),
            error = %error,
            retries = self.retries,
            "HTTP request failed"
        );
    }
}

/// Timer for measuring request duration
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Paging progress of one query, for logging.
#[derive(Debug, Clone)]
pub struct PageContext {
    /// Entity type being queried
    pub entity: String,
    /// Pages fetched so far
    pub pages: u32,
    /// Records yielded so far
    pub yielded: usize,
}

impl PageContext {
    /// Create a context for a new query
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            pages: 0,
            yielded: 0,
        }
    }

    /// Log a page that has been received
    pub fn log_page(&mut self, start: usize, received: usize, total: usize, elapsed: Duration) {
        self.pages += 1;
        debug!(
            entity = %self.entity,
            page = self.pages,
            start,
            received,
            total,
            elapsed_ms = elapsed.as_millis(),
            "Fetched query page"
        );
    }

    /// Log that iteration has finished
    pub fn log_exhausted(&self) {
        debug!(
            entity = %self.entity,
            pages = self.pages,
            yielded = self.yielded,
            "Query exhausted"
        );
    }
}

/// Install a `tracing-subscriber` formatter honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
#[cfg(feature = "trace")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("turborally=info")),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_metadata_creation() {
        let metadata = RequestMetadata::new("GET", "/slm/webservice/v2.0/defect");
        assert_eq!(metadata.method, "GET");
        assert_eq!(metadata.path, "/slm/webservice/v2.0/defect");
    }

    #[test]
    fn test_response_metadata_with_retries() {
        let elapsed = Duration::from_millis(500);
        let metadata = ResponseMetadata::new(200, elapsed)
            .with_retries(2)
            .with_body_size(64);
        assert_eq!(metadata.status, 200);
        assert_eq!(metadata.retries, 2);
        assert_eq!(metadata.body_size, Some(64));
    }

    #[test]
    fn test_request_timer() {
        let timer = RequestTimer::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed().as_millis() >= 10);
    }

    #[test]
    fn test_page_context_counts_pages() {
        let mut ctx = PageContext::new("Defect");
        ctx.log_page(1, 5, 12, Duration::from_millis(3));
        ctx.log_page(6, 5, 12, Duration::from_millis(3));
        assert_eq!(ctx.pages, 2);
        ctx.log_exhausted();
    }
}
