//! File-backed storage engine.
//!
//! Each model type's collection is a pretty-printed JSON array under the
//! engine's data directory, written through on every mutation with an
//! atomic temp-file-then-rename. Suited to operator runs against modest
//! data sets; the interface is identical to any other engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ImportError, Result};
use crate::record::Record;

use super::{
    Collection, Criteria, IndexSpec, MemoryCollection, ModelSchema, StorageEngine, UpsertOutcome,
};

struct FileCollection {
    path: PathBuf,
    inner: MemoryCollection,
}

impl FileCollection {
    fn open(path: PathBuf) -> Result<Self> {
        let docs = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str::<Vec<Record>>(&content)
                .map_err(|e| ImportError::storage(format!("{}: {}", path.display(), e)))?
        } else {
            Vec::new()
        };
        Ok(FileCollection {
            path,
            inner: MemoryCollection::from_documents(docs),
        })
    }

    /// Atomic write: temp file in the same directory, then rename.
    fn flush(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.inner.documents())?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl Collection for FileCollection {
    async fn count(&self, criteria: &Criteria) -> Result<i64> {
        self.inner.count(criteria).await
    }

    async fn find(&self, criteria: &Criteria, limit: usize, skip: i64) -> Result<Vec<Record>> {
        self.inner.find(criteria, limit, skip).await
    }

    async fn find_one(&self, criteria: &Criteria) -> Result<Option<Record>> {
        self.inner.find_one(criteria).await
    }

    async fn insert(&self, record: Record) -> Result<()> {
        self.inner.insert(record).await?;
        self.flush()
    }

    async fn insert_many(&self, records: Vec<Record>) -> Result<()> {
        self.inner.insert_many(records).await?;
        self.flush()
    }

    async fn upsert(
        &self,
        criteria: &Criteria,
        set: Record,
        set_on_insert: Option<Record>,
    ) -> Result<UpsertOutcome> {
        let outcome = self.inner.upsert(criteria, set, set_on_insert).await?;
        self.flush()?;
        Ok(outcome)
    }

    async fn delete_many(&self, criteria: &Criteria) -> Result<u64> {
        let removed = self.inner.delete_many(criteria).await?;
        self.flush()?;
        Ok(removed)
    }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()> {
        self.inner.ensure_index(spec).await
    }
}

/// Storage engine persisting each collection as a JSON file.
pub struct FileEngine {
    root: PathBuf,
    schemas: HashMap<String, ModelSchema>,
    collections: RwLock<HashMap<String, Arc<FileCollection>>>,
    types: RwLock<Vec<String>>,
}

impl FileEngine {
    /// Open an engine over a data directory, creating it when missing.
    /// Existing collection files register their model types.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        let mut types = Vec::new();
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        entries.sort();
        for path in entries {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                types.push(stem.to_string());
            }
        }

        debug!(root = %root.display(), types = types.len(), "opened file engine");

        Ok(FileEngine {
            root,
            schemas: HashMap::new(),
            collections: RwLock::new(HashMap::new()),
            types: RwLock::new(types),
        })
    }

    /// Declare a model type with its payload coercion schema.
    pub fn with_schema(mut self, type_key: impl Into<String>, schema: ModelSchema) -> Self {
        let type_key = type_key.into();
        let mut types = self.types.write().expect("engine lock poisoned");
        if !types.iter().any(|t| t == &type_key) {
            types.push(type_key.clone());
        }
        drop(types);
        self.schemas.insert(type_key, schema);
        self
    }

    fn file_collection(&self, type_key: &str) -> Result<Arc<FileCollection>> {
        let mut collections = self.collections.write().expect("engine lock poisoned");
        if let Some(existing) = collections.get(type_key) {
            return Ok(Arc::clone(existing));
        }
        let path = self.root.join(format!("{}.json", type_key));
        let collection = Arc::new(FileCollection::open(path)?);
        collections.insert(type_key.to_string(), Arc::clone(&collection));
        let mut types = self.types.write().expect("engine lock poisoned");
        if !types.iter().any(|t| t == type_key) {
            types.push(type_key.to_string());
        }
        Ok(collection)
    }
}

#[async_trait]
impl StorageEngine for FileEngine {
    fn collection(&self, type_key: &str) -> Result<Arc<dyn Collection>> {
        Ok(self.file_collection(type_key)? as Arc<dyn Collection>)
    }

    fn model_types(&self) -> Vec<String> {
        self.types.read().expect("engine lock poisoned").clone()
    }

    fn to_persistable_payload(&self, type_key: &str, record: Record) -> Result<Record> {
        match self.schemas.get(type_key) {
            Some(schema) => Ok(schema.coerce(record)),
            None => Ok(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let engine = FileEngine::open(dir.path()).unwrap();
            let collection = engine.collection("location").unwrap();
            collection
                .insert(record(json!({"name": "Springfield"})))
                .await
                .unwrap();
        }

        let engine = FileEngine::open(dir.path()).unwrap();
        assert_eq!(engine.model_types(), vec!["location"]);
        let collection = engine.collection("location").unwrap();
        assert_eq!(collection.count(&Criteria::new()).await.unwrap(), 1);
        let doc = collection.find_one(&Criteria::new()).await.unwrap().unwrap();
        assert_eq!(doc["name"], json!("Springfield"));
    }

    #[tokio::test]
    async fn test_upsert_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let criteria = Criteria::new().eq("legacy.id", 1).eq("legacy.source", "mysql");

        {
            let engine = FileEngine::open(dir.path()).unwrap();
            let collection = engine.collection("tag").unwrap();
            collection
                .upsert(
                    &criteria,
                    record(json!({"legacy": {"id": 1, "source": "mysql"}, "name": "a"})),
                    None,
                )
                .await
                .unwrap();
        }

        let engine = FileEngine::open(dir.path()).unwrap();
        let collection = engine.collection("tag").unwrap();
        let outcome = collection
            .upsert(
                &criteria,
                record(json!({"legacy": {"id": 1, "source": "mysql"}, "name": "b"})),
                None,
            )
            .await
            .unwrap();
        assert!(outcome.updated_existing);
        assert_eq!(collection.count(&Criteria::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wipe_clears_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        let collection = engine.collection("tag").unwrap();
        collection.insert(record(json!({"n": 1}))).await.unwrap();
        collection.delete_many(&Criteria::new()).await.unwrap();

        let reopened = FileEngine::open(dir.path()).unwrap();
        let collection = reopened.collection("tag").unwrap();
        assert_eq!(collection.count(&Criteria::new()).await.unwrap(), 0);
    }
}
