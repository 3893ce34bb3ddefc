//! Query request parameters.

use derive_builder::Builder;

use super::{Conditions, Fetch};
use crate::error::Error;

/// Parameters for one WSAPI query.
///
/// # Example
///
/// ```rust
/// use turborally::QueryRequest;
///
/// let request = QueryRequest::builder()
///     .entity("Defect")
///     .fetch("FormattedID,Name,State")
///     .query("State = Submitted")
///     .order("FormattedID")
///     .limit(50usize)
///     .build()
///     .unwrap();
/// assert_eq!(request.entity, "Defect");
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(setter(into, strip_option), build_fn(validate = "Self::validate"))]
pub struct QueryRequest {
    /// Entity type name, e.g. `Defect` or `UserStory`
    pub entity: String,

    /// Attributes to return for each record
    #[builder(default)]
    pub fetch: Fetch,

    /// Filter criteria
    #[builder(default)]
    pub query: Option<Conditions>,

    /// Sort order, e.g. `FormattedID` or `CreationDate desc`
    #[builder(default)]
    pub order: Option<String>,

    /// Records per page; the client default applies when unset
    #[builder(default)]
    pub page_size: Option<usize>,

    /// Upper bound on records yielded
    #[builder(default)]
    pub limit: Option<usize>,

    /// 1-based index of the first record
    #[builder(default)]
    pub start: Option<usize>,

    /// Workspace name or `_ref`, overriding the client default
    #[builder(default)]
    pub workspace: Option<String>,

    /// Project name or `_ref`, overriding the client default
    #[builder(default)]
    pub project: Option<String>,

    /// Include parent projects
    #[builder(default)]
    pub project_scope_up: Option<bool>,

    /// Include child projects
    #[builder(default)]
    pub project_scope_down: Option<bool>,
}

impl QueryRequest {
    /// Create a builder for constructing a QueryRequest.
    pub fn builder() -> QueryRequestBuilder {
        QueryRequestBuilder::default()
    }
}

impl QueryRequestBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(Some(0)) = self.page_size {
            return Err("page_size must be at least 1".to_string());
        }
        if let Some(Some(0)) = self.start {
            return Err("start index is 1-based".to_string());
        }
        Ok(())
    }
}

impl From<QueryRequestBuilderError> for Error {
    fn from(err: QueryRequestBuilderError) -> Self {
        Error::InvalidQuery(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_builder_defaults() {
        let request = QueryRequest::builder().entity("Project").build().unwrap();
        assert_eq!(request.entity, "Project");
        assert_eq!(request.fetch, Fetch::False);
        assert!(request.query.is_none());
        assert!(request.limit.is_none());
        assert!(request.page_size.is_none());
    }

    #[test]
    fn test_builder_accepts_every_criteria_shape() {
        let text = QueryRequest::builder()
            .entity("Defect")
            .query("State = Open")
            .build()
            .unwrap();
        assert_eq!(text.query, Some(Conditions::Text("State = Open".into())));

        let list = QueryRequest::builder()
            .entity("Defect")
            .query(vec!["State = Open", "Priority = High"])
            .build()
            .unwrap();
        assert_matches!(list.query, Some(Conditions::List(items)) if items.len() == 2);
    }

    #[test]
    fn test_builder_rejects_zero_page_size_and_start() {
        let err: Error = QueryRequest::builder()
            .entity("Defect")
            .page_size(0usize)
            .build()
            .unwrap_err()
            .into();
        assert_matches!(err, Error::InvalidQuery(msg) if msg.contains("page_size"));

        let err: Error = QueryRequest::builder()
            .entity("Defect")
            .start(0usize)
            .build()
            .unwrap_err()
            .into();
        assert_matches!(err, Error::InvalidQuery(_));
    }

    #[test]
    fn test_builder_requires_entity() {
        let err: Error = QueryRequest::builder().build().unwrap_err().into();
        assert_matches!(err, Error::InvalidQuery(msg) if msg.contains("entity"));
    }
}
