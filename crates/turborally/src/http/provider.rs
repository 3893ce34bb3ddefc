//! HTTP provider trait for abstracting the WSAPI transport
//!
//! This module defines the `HttpProvider` trait which the client uses for
//! every request. The default implementation talks to a Rally server over
//! `reqwest`; tests and embedders can supply their own.

use crate::{error::Result, http::Response};
use async_trait::async_trait;
use std::fmt;

/// Provider trait for issuing WSAPI requests.
///
/// Implementations handle authentication and base-URL resolution. Paths are
/// either relative to the WSAPI root (`"defect"`, `"typedefinition"`) or
/// absolute `_ref` URLs returned by the service.
#[async_trait]
pub trait HttpProvider: Send + Sync + fmt::Debug {
    /// Issue a `GET` and return the raw response.
    ///
    /// # Arguments
    ///
    /// * `path` - WSAPI-relative path or absolute reference URL
    /// * `params` - query-string parameters appended to the URL
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built or the transport fails.
    /// Non-2xx statuses are returned as responses, not errors.
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Response>;

    /// Get the provider name for debugging/logging.
    fn provider_name(&self) -> &'static str;

    /// Get the WSAPI base URL for this provider.
    fn base_url(&self) -> &str;
}
