//! Importer and segment abstractions.
//!
//! An importer is a named, toggleable group of segments that share one
//! persister and one source, scoped to the deployment contexts it declares.
//! A segment is the smallest unit of migratable data: it knows how to
//! count, page-retrieve, transform and persist its own records.
//!
//! Importers and segments are long-lived services injected at construction
//! time. Their enabled/disabled state is owned by the
//! [`Configuration`](crate::config::Configuration) they are registered
//! into, never by the service objects themselves.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Configuration, SharedConfiguration};
use crate::error::Result;
use crate::looper::DEFAULT_PAGE_SIZE;
use crate::persister::Persister;
use crate::record::Record;
use crate::source::Source;

/// A named, toggleable group of segments sharing one persister and source.
#[async_trait]
pub trait Importer: Send + Sync {
    /// Stable identity, unique within a configuration.
    fn key(&self) -> &str;

    /// Character set of the origin data.
    fn character_set(&self) -> &str {
        "UTF-8"
    }

    /// Context keys this importer may run under.
    fn supported_contexts(&self) -> &[String];

    /// The segments owned by this importer.
    fn segments(&self) -> Vec<Arc<dyn Segment>>;

    /// The persister shared by this importer's segments. Many importers may
    /// share one persister instance.
    fn persister(&self) -> Arc<dyn Persister>;

    /// The source this importer's segments read from.
    fn source(&self) -> Arc<dyn Source>;

    /// Whether this importer may run under the configuration's context.
    fn supports(&self, configuration: &Configuration) -> bool {
        self.supported_contexts()
            .iter()
            .any(|c| c == configuration.context_key())
    }

    /// Bind the configuration back-reference. Write and data modes are read
    /// from the configuration to keep them in sync across all persisters.
    fn attach_configuration(&self, configuration: &SharedConfiguration) {
        self.persister().attach_configuration(configuration);
    }

    /// Hook invoked after schema setup completes.
    async fn post_update_schema(&self) -> Result<()> {
        Ok(())
    }
}

/// The smallest independently toggleable unit of migratable data.
#[async_trait]
pub trait Segment: Send + Sync {
    /// Stable identity, unique within a configuration.
    fn key(&self) -> &str;

    /// Page size for the import pass.
    fn limit(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }

    /// Count of records at the origin.
    async fn count(&self) -> Result<i64>;

    /// Fetch one page of records from the origin.
    async fn retrieve(&self, limit: usize, skip: i64) -> Result<Vec<Record>>;

    /// Per-record transformation. Returning `None` discards the record; it
    /// is an explicit skip signal, not an error.
    fn transform(&self, item: Record) -> Option<Record> {
        Some(item)
    }

    /// Commit a batch of transformed records through the owning importer's
    /// persister.
    async fn persist(&self, items: Vec<Record>) -> Result<()>;
}
