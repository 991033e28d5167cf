//! # legacy-import
//!
//! Configurable batch import engine for migrating heterogeneous legacy
//! data (relational tables, document stores, external APIs) into a
//! target document store under operator-selected policies.
//!
//! The engine is built from a few long-lived services wired together by a
//! durable [`Configuration`]:
//!
//! - **Importers** group toggleable **segments** that share one source and
//!   one persister
//! - **Sources** expose count and offset-paged retrieve over an origin
//! - **Persisters** sanitize records and commit them under a write mode
//!   derived from the configured data mode, with natural-key upserts
//!   making re-runs idempotent
//! - The **loop executor** drives every pass: main segment imports, schema
//!   passes, and teardown subscriber passes
//!
//! Execution is strictly sequential: one segment at a time, one page at a
//! time. Safe restart after a cancelled or crashed run relies on upsert
//! idempotency, not on transactions.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use legacy_import::{FileConfigStore, LoopExecutor, Manager};
//!
//! #[tokio::main]
//! async fn main() -> legacy_import::Result<()> {
//!     let store = Arc::new(FileConfigStore::open("/var/lib/legacy-import")?);
//!     let mut manager = Manager::new("default", store);
//!     // manager.add_importer(...) for each deployed importer service
//!     manager.create();
//!
//!     legacy_import::runner::set_up(&manager, &LoopExecutor::new()).await?;
//!     let outcome = legacy_import::runner::run_import(&manager).await;
//!     println!("imported {} records", outcome.records_modified);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod importer;
pub mod looper;
pub mod manager;
pub mod persister;
pub mod record;
pub mod runner;
pub mod source;
pub mod store;
pub mod text;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use config::{
    Configuration, ConfigurationSnapshot, DataMode, ElasticMode, ProgressiveMode, SchemaMode,
    SharedConfiguration, SubscriberMode, Toggle, ToggleState,
};
pub use engine::{
    Collection, Criteria, FileEngine, IndexSpec, MemoryEngine, ModelSchema, SortOrder,
    StorageEngine, UpsertOutcome,
};
pub use error::{ImportError, Result};
pub use importer::{Importer, Segment};
pub use looper::{LoopExecutor, LoopOutcome, LoopReport, Loopable, DEFAULT_PAGE_SIZE};
pub use manager::Manager;
pub use persister::{ConfigurationSlot, DocumentPersister, Persister, WriteMode};
pub use record::Record;
pub use runner::{ImportOutcome, Phase, SegmentReport, SegmentStatus};
pub use source::{HttpSource, MemorySource, MySqlSource, Source};
pub use store::{ConfigStore, FileConfigStore};
