//! Paged query results
//!
//! A [`QueryResult`] holds the header of the first page (status, errors,
//! warnings, total count) plus the records of the current page. Later pages
//! are requested only when iteration runs past the records already held.

use std::collections::HashSet;

use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    client::Rally,
    entity::Entity,
    error::{Error, Result},
    http::Response,
    observability::{PageContext, RequestTimer},
};

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(rename = "QueryResult")]
    query_result: QueryPage,
}

/// One page of a WSAPI query response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct QueryPage {
    pub(crate) errors: Vec<String>,
    pub(crate) warnings: Vec<String>,
    pub(crate) total_result_count: usize,
    pub(crate) start_index: usize,
    pub(crate) page_size: usize,
    pub(crate) results: Vec<Value>,
}

impl QueryPage {
    /// Decode a query response body, mapping HTTP failures to errors.
    pub(crate) fn from_response(response: Response) -> Result<Self> {
        let envelope: QueryEnvelope = response.parse_result()?;
        Ok(envelope.query_result)
    }
}

/// What to request for every page of one query.
#[derive(Debug, Clone)]
pub(crate) struct PageSpec {
    /// WSAPI-relative endpoint or absolute collection `_ref`
    pub(crate) path: String,
    /// Type name used for logging and for records without `_type`
    pub(crate) label: String,
    /// Query parameters other than `start` / `pagesize`
    pub(crate) params: Vec<(String, String)>,
    /// Attribute names kept on each record, `None` keeps all
    pub(crate) retain: Option<HashSet<String>>,
    /// Whether records come back fully fetched
    pub(crate) hydrated: bool,
    /// Records requested per page
    pub(crate) page_size: usize,
    /// 1-based index of the first record
    pub(crate) start: usize,
    /// Cap on records yielded overall
    pub(crate) limit: Option<usize>,
}

impl PageSpec {
    fn params_for(&self, start: usize) -> Vec<(String, String)> {
        let mut params = self.params.clone();
        params.push(("start".to_string(), start.to_string()));
        params.push(("pagesize".to_string(), self.page_size.to_string()));
        params
    }
}

/// Records matching a query, fetched page by page.
///
/// Pull records with [`next`](Self::next), or turn the result into a
/// `Stream` with [`into_stream`](Self::into_stream). Iteration stops after
/// `result_count` records, after the caller's limit, or at the first empty
/// page, whichever comes first.
pub struct QueryResult {
    rally: Rally,
    spec: PageSpec,
    status_code: u16,
    errors: Vec<String>,
    warnings: Vec<String>,
    result_count: usize,
    start_index: usize,
    page_size: usize,
    page: Vec<Entity>,
    cursor: usize,
    next_start: usize,
    cap: usize,
    exhausted: bool,
    ctx: PageContext,
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("entity", &self.spec.label)
            .field("status_code", &self.status_code)
            .field("errors", &self.errors)
            .field("warnings", &self.warnings)
            .field("result_count", &self.result_count)
            .field("yielded", &self.ctx.yielded)
            .finish()
    }
}

impl QueryResult {
    /// Issue the first page request.
    pub(crate) async fn start(rally: Rally, spec: PageSpec) -> Result<Self> {
        let mut ctx = PageContext::new(spec.label.clone());
        let timer = RequestTimer::start();
        let response = rally
            .provider()
            .get(&spec.path, &spec.params_for(spec.start))
            .await?;
        let status_code = response.status().as_u16();
        let first = QueryPage::from_response(response)?;

        let received = first.results.len();
        ctx.log_page(spec.start, received, first.total_result_count, timer.elapsed());

        let page = first
            .results
            .into_iter()
            .map(|record| Entity::from_json(record, &spec.label, spec.hydrated, spec.retain.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let remaining = first.total_result_count.saturating_sub(spec.start - 1);
        let cap = spec.limit.map_or(remaining, |limit| limit.min(remaining));

        Ok(Self {
            next_start: spec.start + received,
            exhausted: received == 0,
            status_code,
            errors: first.errors,
            warnings: first.warnings,
            result_count: first.total_result_count,
            start_index: first.start_index,
            page_size: first.page_size,
            page,
            cursor: 0,
            cap,
            ctx,
            rally,
            spec,
        })
    }

    /// HTTP status of the initial request.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Errors reported by the service for the initial request.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Warnings reported by the service for the initial request.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Total number of records matching the query.
    pub fn result_count(&self) -> usize {
        self.result_count
    }

    /// Start index reported for the first page.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Page size reported for the first page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Records of the page currently held.
    pub fn page(&self) -> &[Entity] {
        &self.page
    }

    /// Next record, paging in more data when the current page is used up.
    ///
    /// # Errors
    ///
    /// Fails when a follow-up page cannot be fetched or when the service
    /// reports errors for it ([`Error::Service`]).
    pub async fn next(&mut self) -> Result<Option<Entity>> {
        loop {
            if self.exhausted || self.ctx.yielded >= self.cap {
                if !self.exhausted {
                    self.exhausted = true;
                    self.ctx.log_exhausted();
                }
                return Ok(None);
            }

            if let Some(entity) = self.page.get(self.cursor) {
                let entity = entity.clone();
                self.cursor += 1;
                self.ctx.yielded += 1;
                return Ok(Some(entity));
            }

            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let timer = RequestTimer::start();
        let response = self
            .rally
            .provider()
            .get(&self.spec.path, &self.spec.params_for(self.next_start))
            .await?;
        let page = QueryPage::from_response(response)?;
        if !page.errors.is_empty() {
            return Err(Error::Service {
                errors: page.errors,
            });
        }

        let received = page.results.len();
        self.ctx
            .log_page(self.next_start, received, page.total_result_count, timer.elapsed());

        if received == 0 {
            self.exhausted = true;
            self.ctx.log_exhausted();
            return Ok(());
        }

        self.page = page
            .results
            .into_iter()
            .map(|record| {
                Entity::from_json(
                    record,
                    &self.spec.label,
                    self.spec.hydrated,
                    self.spec.retain.as_ref(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        self.cursor = 0;
        self.next_start += received;
        Ok(())
    }

    /// Drain every remaining record.
    pub async fn collect_all(mut self) -> Result<Vec<Entity>> {
        let mut records = Vec::new();
        while let Some(entity) = self.next().await? {
            records.push(entity);
        }
        Ok(records)
    }

    /// Yield the remaining records as a stream, in query order.
    ///
    /// ```rust,no_run
    /// # use turborally::{Rally, QueryRequest};
    /// use futures::TryStreamExt;
    ///
    /// # async fn example(rally: Rally) -> turborally::Result<()> {
    /// let request = QueryRequest::builder().entity("Defect").build()?;
    /// let mut records = rally.get(request).await?.into_stream();
    /// while let Some(defect) = records.try_next().await? {
    ///     println!("{}", defect.oid());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn into_stream(self) -> BoxStream<'static, Result<Entity>> {
        stream::try_unfold(self, |mut result| async move {
            Ok(result.next().await?.map(|entity| (entity, result)))
        })
        .boxed()
    }
}
