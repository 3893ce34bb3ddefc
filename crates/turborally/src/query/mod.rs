//! Queries against the WSAPI
//!
//! A [`QueryRequest`] names one entity type plus optional fetch spec,
//! criteria, ordering and paging limits. [`crate::Rally::get`] turns it into
//! a [`QueryResult`] that pages through matching records on demand.

mod criteria;
mod fetch;
mod request;
mod result;

pub use criteria::{Conditions, Criteria, Join, Operator};
pub use fetch::Fetch;
pub use request::{QueryRequest, QueryRequestBuilder, QueryRequestBuilderError};
pub use result::QueryResult;

pub(crate) use result::{PageSpec, QueryPage};
