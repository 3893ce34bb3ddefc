//! HTTP middleware for request/response processing

use super::{RequestBuilder, Response};
use crate::observability::{RequestMetadata, ResponseMetadata};
use async_trait::async_trait;

/// Trait for HTTP middleware.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process a request before sending.
    async fn process_request(
        &self,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, crate::error::Error> {
        Ok(request)
    }

    /// Process a response after receiving.
    async fn process_response(&self, response: Response) -> Result<Response, crate::error::Error> {
        Ok(response)
    }
}

/// Middleware that logs every request and response through `tracing`.
pub struct TracingMiddleware;

#[async_trait]
impl Middleware for TracingMiddleware {
    async fn process_request(
        &self,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, crate::error::Error> {
        RequestMetadata::new(request.method().as_str(), request.url().path()).log_request();
        Ok(request)
    }

    async fn process_response(&self, response: Response) -> Result<Response, crate::error::Error> {
        let metadata = ResponseMetadata::new(response.status().as_u16(), response.elapsed)
            .with_body_size(response.body().len())
            .with_retries(response.retries_taken);
        if response.is_error() {
            metadata.log_error(&String::from_utf8_lossy(response.body()));
        } else {
            metadata.log_success();
        }
        Ok(response)
    }
}

/// Middleware that adds rate limiting.
pub struct RateLimitMiddleware {
    governor: std::sync::Arc<governor::DefaultDirectRateLimiter>,
}

impl RateLimitMiddleware {
    /// Create a new rate limit middleware.
    ///
    /// If `requests_per_second` is below 1, defaults to 1 request per second.
    pub fn new(requests_per_second: f64) -> Self {
        use governor::{Quota, RateLimiter};
        use std::num::NonZeroU32;

        let rate = NonZeroU32::new(requests_per_second.max(0.0) as u32).unwrap_or(NonZeroU32::MIN);

        Self {
            governor: std::sync::Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        }
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    async fn process_request(
        &self,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, crate::error::Error> {
        self.governor.until_ready().await;
        Ok(request)
    }
}

/// Composite middleware that chains multiple middleware.
pub struct MiddlewareStack {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl Default for MiddlewareStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("len", &self.middlewares.len())
            .finish()
    }
}

impl MiddlewareStack {
    /// Create a new middleware stack.
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Add a middleware to the stack.
    pub fn push(&mut self, middleware: Box<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Number of middlewares in the stack.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

#[async_trait]
impl Middleware for MiddlewareStack {
    async fn process_request(
        &self,
        mut request: RequestBuilder,
    ) -> Result<RequestBuilder, crate::error::Error> {
        for middleware in &self.middlewares {
            request = middleware.process_request(request).await?;
        }
        Ok(request)
    }

    async fn process_response(
        &self,
        mut response: Response,
    ) -> Result<Response, crate::error::Error> {
        // Process in reverse order for responses
        for middleware in self.middlewares.iter().rev() {
            response = middleware.process_response(response).await?;
        }
        Ok(response)
    }
}
