//! Main client implementation for the Rally WSAPI

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{
    MAX_PAGE_SIZE,
    config::{RallyConfig, RateLimitConfig},
    entity::Entity,
    error::{Error, Result},
    http::{HttpProvider, RallyHttpProvider},
    query::{Criteria, PageSpec, QueryPage, QueryRequest, QueryRequestBuilder, QueryResult},
    types::EntityTypes,
};

/// Main client for querying a Rally server.
///
/// Cloning is cheap; clones share the connection pool, the entity type
/// catalog and the resolved workspace/project references.
///
/// # Example
///
/// ```rust,no_run
/// use turborally::Rally;
///
/// # async fn example() -> turborally::Result<()> {
/// let rally = Rally::with_api_key("rally1.rallydev.com", "_abc123")?;
/// let request = rally.query("Defect").fetch("FormattedID,Name").build()?;
/// let defects = rally.get(request).await?.collect_all().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Rally {
    inner: Arc<RallyInner>,
}

struct RallyInner {
    /// HTTP provider for making requests (handles auth, retries, etc.)
    provider: Arc<dyn HttpProvider>,

    entity_types: EntityTypes,

    workspace: Option<String>,
    project: Option<String>,

    // Names resolve to `_ref` URLs on first use
    workspace_ref: OnceCell<String>,
    project_ref: OnceCell<String>,

    page_size: usize,
}

impl std::fmt::Debug for Rally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rally")
            .field("provider", &self.inner.provider.provider_name())
            .field("base_url", &self.inner.provider.base_url())
            .field("workspace", &self.inner.workspace)
            .field("project", &self.inner.project)
            .field("page_size", &self.inner.page_size)
            .finish()
    }
}

impl Rally {
    /// Create a client authenticating with a user name and password.
    ///
    /// # Errors
    ///
    /// Returns an error if the server URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        server: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Self::from_config(RallyConfig::with_credentials(server, user, password))
    }

    /// Create a client authenticating with an API key.
    pub fn with_api_key(server: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(RallyConfig::with_api_key(server, api_key))
    }

    /// Create a new client builder for advanced configuration.
    pub fn builder() -> RallyBuilder {
        RallyBuilder::default()
    }

    /// Create a client from a configuration object.
    pub fn from_config(config: RallyConfig) -> Result<Self> {
        let mut provider_builder = RallyHttpProvider::builder()
            .wsapi_version(config.wsapi_version.clone())
            .timeout(config.timeout)
            .max_retries(config.max_retries);

        if let Some(server) = &config.server {
            provider_builder = provider_builder.server(server.clone());
        }
        if let Some(api_key) = &config.api_key {
            provider_builder = provider_builder.api_key_secret(api_key.clone());
        }
        if let Some(user) = &config.user {
            provider_builder = provider_builder.user(user.clone());
        }
        if let Some(password) = &config.password {
            provider_builder = provider_builder.password(password.clone());
        }
        if let Some(proxy) = &config.proxy {
            provider_builder = provider_builder.proxy(proxy.clone());
        }
        if let Some(rate_limit) = &config.rate_limit {
            provider_builder = provider_builder.rate_limit(rate_limit.requests_per_second);
        }
        for (key, value) in &config.default_headers {
            provider_builder = provider_builder.header_value(key.clone(), value.clone());
        }

        let provider = Arc::new(provider_builder.build()?);
        Ok(Self::from_provider_with_config(provider, &config))
    }

    /// Create a client with a custom HTTP provider and default settings.
    pub fn from_provider(provider: Arc<dyn HttpProvider>) -> Self {
        Self::from_provider_with_config(provider, &RallyConfig::default())
    }

    /// Create a client with a custom HTTP provider, taking the workspace,
    /// project and page size from `config`.
    pub fn from_provider_with_config(provider: Arc<dyn HttpProvider>, config: &RallyConfig) -> Self {
        Self {
            inner: Arc::new(RallyInner {
                provider,
                entity_types: EntityTypes::default(),
                workspace: config.workspace.clone(),
                project: config.project.clone(),
                workspace_ref: OnceCell::new(),
                project_ref: OnceCell::new(),
                page_size: config.page_size.clamp(1, MAX_PAGE_SIZE),
            }),
        }
    }

    /// Start building a query for `entity`.
    ///
    /// ```rust,no_run
    /// # async fn example(rally: turborally::Rally) -> turborally::Result<()> {
    /// let request = rally
    ///     .query("UserStory")
    ///     .fetch(true)
    ///     .query(vec!["ScheduleState = Accepted", "PlanEstimate > 3"])
    ///     .limit(20usize)
    ///     .build()?;
    /// let mut stories = rally.get(request).await?;
    /// while let Some(story) = stories.next().await? {
    ///     println!("{:?}", story.str("FormattedID"));
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn query(&self, entity: impl Into<String>) -> QueryRequestBuilder {
        let mut builder = QueryRequest::builder();
        builder.entity(entity);
        builder
    }

    /// Run a query and return its first page.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTypeName`] when `request.entity` is not exactly one
    ///   known entity type; no request is sent in that case
    /// - [`Error::InvalidQuery`] when the criteria cannot be normalized
    /// - transport and HTTP status errors for the first page
    ///
    /// Errors the service reports inside the response are available from
    /// [`QueryResult::errors`].
    pub async fn get(&self, request: QueryRequest) -> Result<QueryResult> {
        let entity_type = self.inner.entity_types.resolve(&request.entity)?;
        let criteria = request
            .query
            .as_ref()
            .map(Criteria::normalize)
            .transpose()?;

        let mut page_size = request
            .page_size
            .unwrap_or(self.inner.page_size)
            .clamp(1, MAX_PAGE_SIZE);
        if let Some(limit) = request.limit {
            page_size = page_size.min(limit.max(1));
        }

        let mut params = vec![("fetch".to_string(), request.fetch.as_param())];
        if let Some(criteria) = &criteria {
            params.push(("query".to_string(), criteria.as_query()));
        }
        if let Some(order) = &request.order {
            params.push(("order".to_string(), order.clone()));
        }

        let workspace = self.workspace_ref(request.workspace.as_deref()).await?;
        let project = self
            .project_ref(
                request.project.as_deref(),
                workspace.as_deref(),
                request.workspace.is_none(),
            )
            .await?;
        if let Some(workspace) = workspace {
            params.push(("workspace".to_string(), workspace));
        }
        if let Some(project) = project {
            params.push(("project".to_string(), project));
        }
        if let Some(up) = request.project_scope_up {
            params.push(("projectScopeUp".to_string(), up.to_string()));
        }
        if let Some(down) = request.project_scope_down {
            params.push(("projectScopeDown".to_string(), down.to_string()));
        }

        debug!(
            entity = entity_type.name(),
            fetch = %request.fetch.as_param(),
            query = ?criteria.as_ref().map(Criteria::as_query),
            page_size,
            limit = request.limit,
            "Starting query"
        );

        let spec = PageSpec {
            path: entity_type.path(),
            label: entity_type.name().to_string(),
            params,
            retain: request.fetch.retained(),
            hydrated: request.fetch.is_full(),
            page_size,
            start: request.start.unwrap_or(1).max(1),
            limit: request.limit,
        };
        QueryResult::start(self.clone(), spec).await
    }

    /// Fetch one record in full by its `_ref` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] when the service reports errors for the
    /// reference, or an HTTP status error such as [`Error::NotFound`].
    pub async fn get_by_ref(&self, ref_url: &str) -> Result<Entity> {
        let response = self
            .inner
            .provider
            .get(ref_url, &[("fetch".to_string(), "true".to_string())])
            .await?;
        let body: Map<String, Value> = response.parse_result()?;
        single_record(body)
    }

    /// Fetch one record in full by entity type and object id.
    pub async fn get_by_oid(&self, entity: &str, oid: u64) -> Result<Entity> {
        let entity_type = self.inner.entity_types.resolve(entity)?;
        self.get_by_ref(&format!("{}/{}", entity_type.path(), oid))
            .await
    }

    /// Every member of a collection endpoint, fully hydrated.
    pub(crate) async fn get_collection(&self, ref_url: &str, label: String) -> Result<Vec<Entity>> {
        let spec = PageSpec {
            path: ref_url.to_string(),
            label,
            params: vec![("fetch".to_string(), "true".to_string())],
            retain: None,
            hydrated: true,
            page_size: self.inner.page_size,
            start: 1,
            limit: None,
        };
        let result = QueryResult::start(self.clone(), spec).await?;
        if !result.errors().is_empty() {
            return Err(Error::Service {
                errors: result.errors().to_vec(),
            });
        }
        result.collect_all().await
    }

    /// Configured workspace name or `_ref`.
    pub fn workspace(&self) -> Option<&str> {
        self.inner.workspace.as_deref()
    }

    /// Configured project name or `_ref`.
    pub fn project(&self) -> Option<&str> {
        self.inner.project.as_deref()
    }

    /// Entity types this client accepts in queries.
    pub fn entity_types(&self) -> &EntityTypes {
        &self.inner.entity_types
    }

    /// Add the subscription's type definitions (custom portfolio item
    /// levels and the like) to the entity type catalog.
    ///
    /// Returns the number of newly registered names.
    pub async fn refresh_entity_types(&self) -> Result<usize> {
        let request = self
            .query("TypeDefinition")
            .fetch("ElementName,TypePath")
            .build()?;
        let result = self.get(request).await?;
        if !result.errors().is_empty() {
            return Err(Error::Service {
                errors: result.errors().to_vec(),
            });
        }

        let definitions = result.collect_all().await?;
        let added = self.inner.entity_types.extend(
            definitions
                .iter()
                .filter_map(|def| def.str("TypePath").or_else(|| def.str("ElementName"))),
        )?;
        info!(
            definitions = definitions.len(),
            added, "Loaded entity type definitions"
        );
        Ok(added)
    }

    /// WSAPI base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        self.inner.provider.base_url()
    }

    pub(crate) fn provider(&self) -> &dyn HttpProvider {
        self.inner.provider.as_ref()
    }

    async fn workspace_ref(&self, requested: Option<&str>) -> Result<Option<String>> {
        if let Some(name) = requested {
            return self.lookup_ref("workspace", name, None).await.map(Some);
        }
        let Some(name) = &self.inner.workspace else {
            return Ok(None);
        };
        self.inner
            .workspace_ref
            .get_or_try_init(|| self.lookup_ref("workspace", name, None))
            .await
            .map(|r| Some(r.clone()))
    }

    /// The configured project is cached only when resolved under the
    /// configured workspace.
    async fn project_ref(
        &self,
        requested: Option<&str>,
        workspace: Option<&str>,
        default_workspace: bool,
    ) -> Result<Option<String>> {
        if let Some(name) = requested {
            return self.lookup_ref("project", name, workspace).await.map(Some);
        }
        let Some(name) = &self.inner.project else {
            return Ok(None);
        };
        if !default_workspace {
            return self.lookup_ref("project", name, workspace).await.map(Some);
        }
        self.inner
            .project_ref
            .get_or_try_init(|| self.lookup_ref("project", name, workspace))
            .await
            .map(|r| Some(r.clone()))
    }

    /// Resolve a workspace or project name to its `_ref`. Values that
    /// already look like references are passed through.
    async fn lookup_ref(&self, path: &str, name: &str, workspace: Option<&str>) -> Result<String> {
        if name.contains('/') {
            return Ok(name.to_string());
        }

        let criteria = Criteria::from_pairs([("Name", name)])?;
        let mut params = vec![
            ("fetch".to_string(), "false".to_string()),
            ("query".to_string(), criteria.as_query()),
            ("pagesize".to_string(), "1".to_string()),
        ];
        if let Some(workspace) = workspace {
            params.push(("workspace".to_string(), workspace.to_string()));
        }

        let response = self.inner.provider.get(path, &params).await?;
        let page = QueryPage::from_response(response)?;
        if !page.errors.is_empty() {
            return Err(Error::Service {
                errors: page.errors,
            });
        }

        let found = page
            .results
            .first()
            .and_then(|record| record.get("_ref"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::NotFound(format!("{} '{}'", path, name)))?;
        debug!(kind = path, name, reference = %found, "Resolved context reference");
        Ok(found)
    }
}

/// Unwrap a `{"<Type>": {...}}` single-record body.
fn single_record(body: Map<String, Value>) -> Result<Entity> {
    let (type_name, record) = body
        .into_iter()
        .next()
        .ok_or_else(|| Error::ResponseValidation("empty record response".to_string()))?;

    if type_name == "OperationResult" {
        let errors = record
            .get("Errors")
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        return Err(Error::Service { errors });
    }

    Entity::from_json(record, &type_name, true, None)
}

/// Builder for creating a [`Rally`] client with custom configuration.
#[derive(Debug, Default)]
pub struct RallyBuilder {
    config: RallyConfig,
}

impl RallyBuilder {
    /// Start from an existing configuration.
    pub fn config(mut self, config: RallyConfig) -> Self {
        self.config = self.config.merge(config);
        self
    }

    /// Set the server host or URL.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = Some(server.into());
        self
    }

    /// Authenticate with a user name and password.
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.user = Some(user.into());
        self.config.password = Some(secrecy::SecretString::new(
            password.into().into_boxed_str(),
        ));
        self
    }

    /// Authenticate with an API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(secrecy::SecretString::new(api_key.into().into_boxed_str()));
        self
    }

    /// Scope queries to a workspace, by name or `_ref`.
    pub fn workspace(mut self, workspace: impl Into<String>) -> Self {
        self.config.workspace = Some(workspace.into());
        self
    }

    /// Scope queries to a project, by name or `_ref`.
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

    /// Add a header sent with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        let key_str = key.into();
        let value_str = value.into();

        let key: http::HeaderName = key_str
            .parse()
            .map_err(|_| Error::InvalidHeaderName(key_str.clone()))?;
        let value: http::HeaderValue = value_str
            .parse()
            .map_err(|_| Error::InvalidHeaderValue(value_str.clone()))?;

        self.config.default_headers.insert(key, value);
        Ok(self)
    }

    /// Route requests through an HTTP proxy.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Throttle outgoing requests.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Rally> {
        Rally::from_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_client_builder() {
        let client = Rally::builder()
            .server("rally.example.com")
            .api_key("_abc123")
            .workspace("Acme")
            .project("Rockets")
            .page_size(50)
            .timeout(Duration::from_secs(30))
            .max_retries(3)
            .build()
            .unwrap();

        assert_eq!(client.workspace(), Some("Acme"));
        assert_eq!(client.project(), Some("Rockets"));
        assert_eq!(
            client.base_url(),
            "https://rally.example.com/slm/webservice/v2.0/"
        );
    }

    #[test]
    fn test_client_requires_credentials() {
        let result = Rally::builder().server("rally.example.com").build();
        assert_matches!(result, Err(Error::Authentication(_)));
    }

    #[test]
    fn test_client_requires_server() {
        let result = Rally::builder().api_key("_abc123").build();
        assert_matches!(result, Err(Error::MissingConfig(field)) if field == "server");
    }

    #[test]
    fn test_client_from_config_invalid_scheme() {
        let config = RallyConfig::with_api_key("ftp://rally.example.com", "_abc123");
        match Rally::from_config(config) {
            Err(Error::InvalidUrl(msg)) => assert!(msg.contains("ftp")),
            other => panic!("Expected InvalidUrl error, got {:?}", other),
        }
    }

    #[test]
    fn test_client_new_with_password() {
        let client = Rally::new("http://localhost:8999", "me@acme.com", "secret").unwrap();
        assert_eq!(
            client.base_url(),
            "http://localhost:8999/slm/webservice/v2.0/"
        );
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("rally"));
    }

    #[test]
    fn test_query_builder_is_seeded_with_entity() {
        let client = Rally::with_api_key("rally.example.com", "_abc123").unwrap();
        let request = client.query("Defect").limit(5usize).build().unwrap();
        assert_eq!(request.entity, "Defect");
        assert_eq!(request.limit, Some(5));
    }

    #[test]
    fn test_clones_share_entity_catalog() {
        let client = Rally::with_api_key("rally.example.com", "_abc123").unwrap();
        let clone = client.clone();
        client
            .entity_types()
            .extend(["PortfolioItem/Epic"])
            .unwrap();
        assert!(clone.entity_types().contains("PortfolioItem/Epic"));
    }

    #[test]
    fn test_single_record_unwraps_type_key() {
        let body = json!({
            "Defect": {
                "_ref": "https://rally.example.com/slm/webservice/v2.0/defect/9",
                "_type": "Defect",
                "ObjectID": 9,
                "Name": "Broken"
            }
        });
        let Value::Object(map) = body else { unreachable!() };
        let entity = single_record(map).unwrap();
        assert_eq!(entity.oid(), 9);
        assert!(entity.is_hydrated());
        assert_eq!(entity.name(), Some("Broken"));
    }

    #[test]
    fn test_single_record_reports_operation_errors() {
        let body = json!({
            "OperationResult": {"Errors": ["Cannot find object to read"], "Warnings": []}
        });
        let Value::Object(map) = body else { unreachable!() };
        assert_matches!(
            single_record(map),
            Err(Error::Service { errors }) if errors == vec!["Cannot find object to read"]
        );
    }
}
