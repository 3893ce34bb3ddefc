//! HTTP client abstraction and middleware
//!
//! This module provides the HTTP layer for the client, including retry logic,
//! rate limiting and request tracing.

pub use provider::HttpProvider;
pub use rally_provider::{RallyHttpProvider, RallyHttpProviderBuilder};
pub use request::RequestBuilder;
pub use response::Response;

pub mod middleware;
pub mod provider;
mod rally_provider;
mod request;
mod response;

// Re-export HTTP types from the http crate for convenience
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
