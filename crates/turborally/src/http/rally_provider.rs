//! Rally WSAPI HTTP provider implementation
//!
//! This provider handles requests to a Rally server with API-key or basic
//! authentication, retries, optional rate limiting and request tracing.

use super::{
    HttpProvider, Method, RequestBuilder, Response,
    middleware::{Middleware, MiddlewareStack, RateLimitMiddleware, TracingMiddleware},
};
use crate::{DEFAULT_WSAPI_VERSION, error::Result};
use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use url::Url;

/// HTTP provider for a Rally server.
///
/// # Architecture
///
/// - Uses `reqwest` for the HTTP client
/// - Authenticates with an API key (`ZSESSIONID` header) or HTTP basic auth
/// - Resolves relative paths against `{server}/slm/webservice/{version}/`
/// - Runs every request through a middleware stack (tracing, rate limiting)
///
/// # Example
///
/// ```rust,no_run
/// use turborally::http::RallyHttpProvider;
///
/// let provider = RallyHttpProvider::builder()
///     .server("rally1.rallydev.com")
///     .api_key("_abc123")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct RallyHttpProvider {
    pub(crate) inner: Arc<ProviderInner>,
}

#[derive(Debug)]
pub(crate) struct ProviderInner {
    /// HTTP client for making requests
    pub(crate) http_client: reqwest::Client,
    /// WSAPI root, always ending in `/`
    pub(crate) base_url: Url,
    /// Precomputed authentication header
    pub(crate) auth: Auth,
    /// Default timeout for requests
    pub(crate) timeout: Duration,
    /// Maximum number of retries
    pub(crate) max_retries: u32,
    /// Custom headers to include with every request
    pub(crate) default_headers: http::HeaderMap,
    /// Request/response middleware
    pub(crate) middleware: MiddlewareStack,
}

#[derive(Debug)]
pub(crate) enum Auth {
    ApiKey(SecretString),
    Basic(SecretString),
}

impl RallyHttpProvider {
    /// Create a new builder for configuring the provider.
    pub fn builder() -> RallyHttpProviderBuilder {
        RallyHttpProviderBuilder::default()
    }

    /// Create a request builder with provider configuration.
    fn build_request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.inner.base_url.join(path).map_err(|e| {
            crate::error::Error::InvalidUrl(format!(
                "Failed to construct URL from path '{}': {}",
                path, e
            ))
        })?;

        let mut builder = RequestBuilder::new(method, url)
            .with_client(self.inner.http_client.clone())
            .timeout(self.inner.timeout)
            .max_retries(self.inner.max_retries)
            .header("accept", "application/json")?
            .header("x-rallyintegrationname", "turborally")?
            .header("x-rallyintegrationversion", crate::VERSION)?;

        builder = match &self.inner.auth {
            Auth::ApiKey(key) => builder.header("zsessionid", key.expose_secret())?,
            Auth::Basic(encoded) => {
                builder.header("authorization", format!("Basic {}", encoded.expose_secret()))?
            }
        };

        for (key, value) in &self.inner.default_headers {
            builder = builder.header_value(key.clone(), value.clone());
        }

        Ok(builder)
    }
}

#[async_trait]
impl HttpProvider for RallyHttpProvider {
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Response> {
        let builder = self
            .build_request(Method::GET, path)?
            .query(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let builder = self.inner.middleware.process_request(builder).await?;
        let response = builder.send().await?;
        self.inner.middleware.process_response(response).await
    }

    fn provider_name(&self) -> &'static str {
        "rally"
    }

    fn base_url(&self) -> &str {
        self.inner.base_url.as_str()
    }
}

/// Builder for creating a `RallyHttpProvider` with custom configuration.
#[derive(Default)]
pub struct RallyHttpProviderBuilder {
    server: Option<String>,
    user: Option<String>,
    password: Option<SecretString>,
    api_key: Option<SecretString>,
    wsapi_version: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    default_headers: http::HeaderMap,
    proxy: Option<String>,
    requests_per_second: Option<f64>,
}

impl RallyHttpProviderBuilder {
    /// Set the server host name or URL.
    ///
    /// A bare host name gets `https://` prepended.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Set the user name for basic authentication.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password for basic authentication.
    pub fn password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    /// Set the API key, sent as the `ZSESSIONID` header.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into().into_boxed_str()));
        self
    }

    pub(crate) fn api_key_secret(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Set the WSAPI version path segment. Defaults to `v2.0`.
    pub fn wsapi_version(mut self, version: impl Into<String>) -> Self {
        self.wsapi_version = Some(version.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the maximum number of retries for failed requests.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Route requests through an HTTP proxy.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Throttle outgoing requests to the given rate.
    pub fn rate_limit(mut self, requests_per_second: f64) -> Self {
        self.requests_per_second = Some(requests_per_second);
        self
    }

    /// Add a custom header to include with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key_str = key.into();
        let value_str = value.into();

        let key = key_str
            .parse::<http::HeaderName>()
            .map_err(|_| crate::error::Error::InvalidHeaderName(key_str.clone()))?;
        let value = value_str
            .parse::<http::HeaderValue>()
            .map_err(|_| crate::error::Error::InvalidHeaderValue(value_str.clone()))?;

        Ok(self.header_value(key, value))
    }

    /// Add an already-validated header to include with every request.
    pub fn header_value(mut self, key: http::HeaderName, value: http::HeaderValue) -> Self {
        self.default_headers.insert(key, value);
        self
    }

    /// Build the provider with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No server is configured
    /// - Neither an API key nor a user/password pair is provided
    /// - The server URL is invalid
    /// - HTTP client creation fails
    pub fn build(self) -> Result<RallyHttpProvider> {
        let auth = match (self.api_key, self.user, self.password) {
            (Some(key), _, _) => Auth::ApiKey(key),
            (None, Some(user), Some(password)) => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", user, password.expose_secret()));
                Auth::Basic(SecretString::new(encoded.into_boxed_str()))
            }
            _ => {
                return Err(crate::error::Error::Authentication(
                    "No API key or user/password provided".to_string(),
                ));
            }
        };

        let server = self
            .server
            .ok_or_else(|| crate::error::Error::MissingConfig("server".to_string()))?;
        let version = self
            .wsapi_version
            .unwrap_or_else(|| DEFAULT_WSAPI_VERSION.to_string());
        let base_url = wsapi_base_url(&server, &version)?;

        let timeout = self.timeout.unwrap_or(Duration::from_secs(60));
        let mut client_builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("turborally-rust/{}", crate::VERSION));
        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| crate::error::Error::InvalidUrl(format!("proxy: {}", e)))?;
            client_builder = client_builder.proxy(proxy);
        }
        let http_client = client_builder
            .build()
            .map_err(|e| crate::error::Error::HttpClient(e.to_string()))?;

        let mut middleware = MiddlewareStack::new();
        if let Some(rps) = self.requests_per_second {
            middleware.push(Box::new(RateLimitMiddleware::new(rps)));
        }
        middleware.push(Box::new(TracingMiddleware));

        let inner = Arc::new(ProviderInner {
            http_client,
            base_url,
            auth,
            timeout,
            max_retries: self.max_retries.unwrap_or(2),
            default_headers: self.default_headers,
            middleware,
        });

        Ok(RallyHttpProvider { inner })
    }
}

/// Build `{server}/slm/webservice/{version}/` from a host name or URL.
fn wsapi_base_url(server: &str, version: &str) -> Result<Url> {
    let server = server.trim();
    if server.is_empty() {
        return Err(crate::error::Error::InvalidUrl(
            "Server cannot be empty".to_string(),
        ));
    }

    let with_scheme = if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{}", server)
    };

    let root: Url = with_scheme
        .parse()
        .map_err(|e| crate::error::Error::InvalidUrl(format!("{}", e)))?;

    match root.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(crate::error::Error::InvalidUrl(format!(
                "Invalid URL scheme '{}'. Only 'http' and 'https' are supported.",
                scheme
            )));
        }
    }

    let root = root.as_str().trim_end_matches('/');
    let url = if root.ends_with("/slm/webservice") {
        format!("{}/{}/", root, version)
    } else {
        format!("{}/slm/webservice/{}/", root, version)
    };
    url.parse()
        .map_err(|e| crate::error::Error::InvalidUrl(format!("{}", e)))
}
