//! Legacy data origins.
//!
//! A [`Source`] abstracts "count" and "paged retrieve" over an external
//! origin: a relational table, a document collection, or a remote API.
//! Offset-based pagination is mandatory; a connector fronting a
//! token-paged remote emulates offsets internally. Connector failures
//! propagate unchanged; retry policy belongs to the connector, not the
//! engine.

mod http;
mod memory;
mod mysql;

pub use http::HttpSource;
pub use memory::MemorySource;
pub use mysql::MySqlSource;

use async_trait::async_trait;

use crate::engine::{Criteria, SortOrder};
use crate::error::Result;
use crate::record::Record;

/// An external data origin exposing count and paged retrieve.
#[async_trait]
pub trait Source: Send + Sync {
    /// The source key, e.g. "mysql".
    fn key(&self) -> &str;

    /// Count records at an origin matching the criteria.
    async fn count(&self, origin: &str, criteria: &Criteria) -> Result<i64>;

    /// Retrieve one page of records from an origin.
    ///
    /// `fields` empty means all fields; `sort` empty means store order.
    async fn retrieve(
        &self,
        origin: &str,
        criteria: &Criteria,
        fields: &[String],
        sort: &[(String, SortOrder)],
        limit: usize,
        skip: i64,
    ) -> Result<Vec<Record>>;
}
