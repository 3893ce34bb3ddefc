//! # turborally
//!
//! Async Rust client for the Rally (Broadcom Agile Central) WSAPI supporting:
//! - Single-type queries with fetch specs, criteria, ordering and limits
//! - Lazy paging through large result sets, via `next()` or a `Stream`
//! - On-demand hydration of referenced records and collections
//! - API-key or basic authentication
//! - Automatic retries and optional rate limiting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use turborally::{Fetch, Rally};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rally = Rally::builder()
//!         .server("rally1.rallydev.com")
//!         .api_key("_abc123")
//!         .workspace("Acme")
//!         .build()?;
//!
//!     let request = rally
//!         .query("Defect")
//!         .fetch(Fetch::fields("FormattedID,Name,Owner"))
//!         .query("State = Submitted AND Priority = High")
//!         .build()?;
//!
//!     let mut defects = rally.get(request).await?;
//!     println!("{} matching defects", defects.result_count());
//!     while let Some(defect) = defects.next().await? {
//!         if let Some(owner) = defect.reference("Owner") {
//!             let owner = owner.resolve(&rally).await?;
//!             println!("{:?} owned by {:?}", defect.str("FormattedID"), owner.name());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Re-export commonly used types
pub use client::{Rally, RallyBuilder};
pub use config::{RallyConfig, RallyConfigBuilder, RateLimitConfig};
pub use entity::{Attribute, CollectionRef, Entity, EntityRef};
pub use error::{Error, Result};
pub use query::{Conditions, Criteria, Fetch, QueryRequest, QueryRequestBuilder, QueryResult};
pub use types::{EntityType, EntityTypes};

// Module declarations
pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod http;
pub mod observability;
pub mod query;
pub mod types;

// Re-export key dependencies for convenience
pub use async_trait::async_trait;
pub use serde_json::Value as JsonValue;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WSAPI version used when none is configured
pub const DEFAULT_WSAPI_VERSION: &str = "v2.0";

/// Records per page when a query does not say otherwise
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Largest page size the service accepts
pub const MAX_PAGE_SIZE: usize = 2000;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Attribute, Conditions, Criteria, Entity, EntityRef, Error, Fetch, QueryRequest,
        QueryResult, Rally, RallyConfig, Result,
    };
    pub use futures::TryStreamExt;
}
