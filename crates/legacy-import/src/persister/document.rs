//! Document-store persister over a [`StorageEngine`].
//!
//! Commits sanitized documents through the engine's collection handles and
//! owns the schema lifecycle for every model type the engine declares: the
//! natural-key unique index, routing lookups, wipe handling, and the
//! per-type subscriber pass run during teardown.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::SchemaMode;
use crate::engine::{Collection, Criteria, IndexSpec, StorageEngine};
use crate::error::Result;
use crate::looper::Loopable;
use crate::record::{Record, FIELD_ID, PATH_LEGACY_ID, PATH_LEGACY_SOURCE};

use super::{ConfigurationSlot, Persister};

/// Persists documents through a storage engine.
pub struct DocumentPersister {
    engine: Arc<dyn StorageEngine>,
    slot: ConfigurationSlot,
}

impl DocumentPersister {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        DocumentPersister {
            engine,
            slot: ConfigurationSlot::new(),
        }
    }

    pub fn engine(&self) -> Arc<dyn StorageEngine> {
        Arc::clone(&self.engine)
    }

    /// Indexes required on every model type's collection.
    fn index_specs() -> Vec<IndexSpec> {
        vec![
            IndexSpec::new(&[PATH_LEGACY_ID, PATH_LEGACY_SOURCE])
                .unique()
                .sparse(),
            IndexSpec::new(&["url_path", "deleted"]),
            IndexSpec::new(&["redirects", "deleted"]),
        ]
    }
}

#[async_trait]
impl Persister for DocumentPersister {
    fn configuration_slot(&self) -> &ConfigurationSlot {
        &self.slot
    }

    fn collection(&self, type_key: &str) -> Result<Arc<dyn Collection>> {
        self.engine.collection(type_key)
    }

    fn sanitize(&self, type_key: &str, record: Record) -> Result<Record> {
        self.engine.to_persistable_payload(type_key, record)
    }

    fn model_types(&self) -> Vec<String> {
        self.engine.model_types()
    }

    async fn wipe_data(&self) -> Result<()> {
        for type_key in self.model_types() {
            let removed = self
                .collection(&type_key)?
                .delete_many(&Criteria::new())
                .await?;
            info!(type_key = %type_key, removed, "wiped model type");
        }
        Ok(())
    }

    async fn update_schema(&self) -> Result<()> {
        let (should_wipe, schema_mode) = self
            .configuration_slot()
            .with(|c| (c.should_wipe(), c.schema_mode()))?;

        if should_wipe {
            self.wipe_data().await?;
        }

        if schema_mode == SchemaMode::None {
            return Ok(());
        }

        for type_key in self.model_types() {
            let collection = self.collection(&type_key)?;
            for spec in Self::index_specs() {
                collection.ensure_index(&spec).await?;
            }
        }
        Ok(())
    }

    fn subscriber_looper(&self, type_key: &str) -> Option<Arc<dyn Loopable>> {
        Some(Arc::new(DocumentSubscriberPass::new(
            type_key,
            Arc::clone(&self.engine),
        )))
    }
}

/// Teardown consistency pass: re-saves every document of one model type so
/// downstream listeners observe the imported state.
pub struct DocumentSubscriberPass {
    type_key: String,
    engine: Arc<dyn StorageEngine>,
}

impl DocumentSubscriberPass {
    pub fn new(type_key: impl Into<String>, engine: Arc<dyn StorageEngine>) -> Self {
        DocumentSubscriberPass {
            type_key: type_key.into(),
            engine,
        }
    }

    fn collection(&self) -> Result<Arc<dyn Collection>> {
        self.engine.collection(&self.type_key)
    }
}

#[async_trait]
impl Loopable for DocumentSubscriberPass {
    async fn count(&self) -> Result<i64> {
        self.collection()?.count(&Criteria::new()).await
    }

    async fn retrieve(&self, limit: usize, skip: i64) -> Result<Vec<Record>> {
        self.collection()?.find(&Criteria::new(), limit, skip).await
    }

    async fn persist(&self, items: Vec<Record>) -> Result<()> {
        let collection = self.collection()?;
        for item in items {
            let Some(id) = item.get(FIELD_ID).cloned() else {
                warn!(type_key = %self.type_key, "document without identifier skipped");
                continue;
            };
            let criteria = Criteria::new().eq(FIELD_ID, id);
            collection.upsert(&criteria, item, None).await?;
        }
        Ok(())
    }
}
