//! Configuration for the Rally client

use http::HeaderMap;
use secrecy::SecretString;
use std::time::Duration;

use crate::{DEFAULT_PAGE_SIZE, DEFAULT_WSAPI_VERSION};

/// Configuration for the Rally client.
///
/// Holds the server address, credentials, default workspace/project context
/// and transport tuning used when building a [`crate::Rally`].
#[derive(Debug, Clone)]
pub struct RallyConfig {
    /// Server host or URL (e.g. `rally1.rallydev.com`)
    pub server: Option<String>,

    /// User name for basic authentication
    pub user: Option<String>,

    /// Password for basic authentication
    pub password: Option<SecretString>,

    /// API key sent as the `ZSESSIONID` header (preferred over user/password)
    pub api_key: Option<SecretString>,

    /// Workspace name queries are scoped to
    pub workspace: Option<String>,

    /// Project name queries are scoped to
    pub project: Option<String>,

    /// WSAPI version path segment
    pub wsapi_version: String,

    /// Default page size for queries
    pub page_size: usize,

    /// Default timeout for requests
    pub timeout: Duration,

    /// Maximum number of retries for failed requests
    pub max_retries: u32,

    /// Custom headers to include with every request
    pub default_headers: HeaderMap,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Rate limiting configuration
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for RallyConfig {
    fn default() -> Self {
        Self {
            server: None,
            user: None,
            password: None,
            api_key: None,
            workspace: None,
            project: None,
            wsapi_version: DEFAULT_WSAPI_VERSION.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout: Duration::from_secs(60),
            max_retries: 2,
            default_headers: HeaderMap::new(),
            proxy: None,
            rate_limit: None,
        }
    }
}

impl RallyConfig {
    /// Create a configuration using user/password credentials.
    pub fn with_credentials(
        server: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: Some(server.into()),
            user: Some(user.into()),
            password: Some(SecretString::new(password.into().into_boxed_str())),
            ..Default::default()
        }
    }

    /// Create a configuration using an API key.
    pub fn with_api_key(server: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server: Some(server.into()),
            api_key: Some(SecretString::new(api_key.into().into_boxed_str())),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is read first if present.
    /// This will look for:
    /// - `RALLY_SERVER` for the server host or URL
    /// - `RALLY_APIKEY`, or `RALLY_USER` + `RALLY_PASSWORD`, for authentication
    /// - `RALLY_WORKSPACE` / `RALLY_PROJECT` for the default context
    /// - `RALLY_WSAPI_VERSION` for the WSAPI version
    /// - `RALLY_TIMEOUT` for request timeout (in seconds)
    /// - `RALLY_MAX_RETRIES` for maximum retry attempts
    /// - `RALLY_PAGESIZE` for the default page size
    /// - `RALLY_PROXY` for HTTP proxy
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self, crate::error::Error> {
        use std::env;

        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Ok(server) = env::var("RALLY_SERVER") {
            config.server = Some(server);
        }

        // Authentication
        if let Ok(api_key) = env::var("RALLY_APIKEY") {
            config.api_key = Some(SecretString::new(api_key.into_boxed_str()));
        }
        if let Ok(user) = env::var("RALLY_USER") {
            config.user = Some(user);
        }
        if let Ok(password) = env::var("RALLY_PASSWORD") {
            config.password = Some(SecretString::new(password.into_boxed_str()));
        }

        // Context
        if let Ok(workspace) = env::var("RALLY_WORKSPACE") {
            config.workspace = Some(workspace);
        }
        if let Ok(project) = env::var("RALLY_PROJECT") {
            config.project = Some(project);
        }

        if let Ok(version) = env::var("RALLY_WSAPI_VERSION") {
            config.wsapi_version = version;
        }

        if let Ok(timeout_str) = env::var("RALLY_TIMEOUT")
            && let Ok(timeout_secs) = timeout_str.parse::<u64>()
        {
            config.timeout = Duration::from_secs(timeout_secs);
        }

        if let Ok(max_retries_str) = env::var("RALLY_MAX_RETRIES")
            && let Ok(max_retries) = max_retries_str.parse::<u32>()
        {
            config.max_retries = max_retries;
        }

        if let Ok(page_size_str) = env::var("RALLY_PAGESIZE") {
            config.page_size = page_size_str.parse::<usize>().map_err(|_| {
                crate::error::Error::MissingConfig(format!(
                    "RALLY_PAGESIZE must be a positive integer, got '{}'",
                    page_size_str
                ))
            })?;
        }

        if let Ok(proxy) = env::var("RALLY_PROXY") {
            config.proxy = Some(proxy);
        }

        Ok(config)
    }

    /// Merge this configuration with another, with the other taking precedence.
    pub fn merge(mut self, other: RallyConfig) -> Self {
        let defaults = RallyConfig::default();

        if other.server.is_some() {
            self.server = other.server;
        }
        if other.user.is_some() {
            self.user = other.user;
        }
        if other.password.is_some() {
            self.password = other.password;
        }
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.workspace.is_some() {
            self.workspace = other.workspace;
        }
        if other.project.is_some() {
            self.project = other.project;
        }
        if other.wsapi_version != defaults.wsapi_version {
            self.wsapi_version = other.wsapi_version;
        }
        if other.page_size != defaults.page_size {
            self.page_size = other.page_size;
        }
        if other.timeout != defaults.timeout {
            self.timeout = other.timeout;
        }
        if other.max_retries != defaults.max_retries {
            self.max_retries = other.max_retries;
        }
        for (key, value) in other.default_headers.iter() {
            self.default_headers.insert(key.clone(), value.clone());
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.rate_limit.is_some() {
            self.rate_limit = other.rate_limit;
        }

        self
    }
}

/// Configuration for client-side rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
        }
    }
}

/// Builder for creating RallyConfig with a fluent API.
#[derive(Debug, Default)]
pub struct RallyConfigBuilder {
    config: RallyConfig,
}

impl RallyConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host or URL.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = Some(server.into());
        self
    }

    /// Set the user name.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = Some(user.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(SecretString::new(password.into().into_boxed_str()));
        self
    }

    /// Set the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(SecretString::new(api_key.into().into_boxed_str()));
        self
    }

    /// Set the default workspace.
    pub fn workspace(mut self, workspace: impl Into<String>) -> Self {
        self.config.workspace = Some(workspace.into());
        self
    }

    /// Set the default project.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.config.project = Some(project.into());
        self
    }

    /// Set the WSAPI version.
    pub fn wsapi_version(mut self, version: impl Into<String>) -> Self {
        self.config.wsapi_version = version.into();
        self
    }

    /// Set the default page size.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the maximum number of retries.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Add a default header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid according to HTTP specifications.
    pub fn default_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> crate::Result<Self> {
        let key_str = key.into();
        let value_str = value.into();

        let key: http::HeaderName = key_str
            .parse()
            .map_err(|_| crate::Error::InvalidHeaderName(key_str.clone()))?;
        let value: http::HeaderValue = value_str
            .parse()
            .map_err(|_| crate::Error::InvalidHeaderValue(value_str.clone()))?;

        self.config.default_headers.insert(key, value);
        Ok(self)
    }

    /// Set the HTTP proxy.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Enable rate limiting with default configuration.
    pub fn with_rate_limiting(mut self) -> Self {
        self.config.rate_limit = Some(RateLimitConfig::default());
        self
    }

    /// Set custom rate limiting configuration.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RallyConfig {
        self.config
    }
}
