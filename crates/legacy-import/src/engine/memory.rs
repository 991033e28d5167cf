//! In-memory storage engine.
//!
//! Backs unit tests and embedded runs. Collections are plain document
//! vectors in insertion order, which keeps offset pagination stable.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ImportError, Result};
use crate::record::{Record, FIELD_ID};

use super::{Collection, Criteria, IndexSpec, ModelSchema, StorageEngine, UpsertOutcome};

/// One in-memory document collection.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    docs: RwLock<Vec<Record>>,
    indexes: RwLock<Vec<IndexSpec>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection pre-seeded with documents, preserving their order.
    pub fn from_documents(docs: Vec<Record>) -> Self {
        MemoryCollection {
            docs: RwLock::new(docs),
            indexes: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of every stored document, in insertion order.
    pub fn documents(&self) -> Vec<Record> {
        self.docs.read().expect("collection lock poisoned").clone()
    }

    /// Declared index specs.
    pub fn index_specs(&self) -> Vec<IndexSpec> {
        self.indexes.read().expect("collection lock poisoned").clone()
    }

    fn assign_id(record: &mut Record) -> Value {
        match record.get(FIELD_ID) {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                let id = Value::String(Uuid::new_v4().to_string());
                record.insert(FIELD_ID.into(), id.clone());
                id
            }
        }
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn count(&self, criteria: &Criteria) -> Result<i64> {
        let docs = self.docs.read().expect("collection lock poisoned");
        Ok(docs.iter().filter(|d| criteria.matches(d)).count() as i64)
    }

    async fn find(&self, criteria: &Criteria, limit: usize, skip: i64) -> Result<Vec<Record>> {
        let docs = self.docs.read().expect("collection lock poisoned");
        Ok(docs
            .iter()
            .filter(|d| criteria.matches(d))
            .skip(skip.max(0) as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_one(&self, criteria: &Criteria) -> Result<Option<Record>> {
        let docs = self.docs.read().expect("collection lock poisoned");
        Ok(docs.iter().find(|d| criteria.matches(d)).cloned())
    }

    async fn insert(&self, mut record: Record) -> Result<()> {
        Self::assign_id(&mut record);
        self.docs
            .write()
            .expect("collection lock poisoned")
            .push(record);
        Ok(())
    }

    async fn insert_many(&self, records: Vec<Record>) -> Result<()> {
        let mut docs = self.docs.write().expect("collection lock poisoned");
        for mut record in records {
            Self::assign_id(&mut record);
            docs.push(record);
        }
        Ok(())
    }

    async fn upsert(
        &self,
        criteria: &Criteria,
        mut set: Record,
        set_on_insert: Option<Record>,
    ) -> Result<UpsertOutcome> {
        if criteria.is_empty() {
            return Err(ImportError::InvalidArgument(
                "upsert requires a non-empty criteria".into(),
            ));
        }

        let mut docs = self.docs.write().expect("collection lock poisoned");
        if let Some(existing) = docs.iter_mut().find(|d| criteria.matches(d)) {
            // Update in place; the existing identifier always wins.
            set.remove(FIELD_ID);
            for (key, value) in set {
                existing.insert(key, value);
            }
            return Ok(UpsertOutcome {
                updated_existing: true,
                upserted_id: None,
            });
        }

        if let Some(extra) = set_on_insert {
            for (key, value) in extra {
                set.entry(key).or_insert(value);
            }
        }
        let id = Self::assign_id(&mut set);
        docs.push(set);

        Ok(UpsertOutcome {
            updated_existing: false,
            upserted_id: Some(id),
        })
    }

    async fn delete_many(&self, criteria: &Criteria) -> Result<u64> {
        let mut docs = self.docs.write().expect("collection lock poisoned");
        let before = docs.len();
        docs.retain(|d| !criteria.matches(d));
        Ok((before - docs.len()) as u64)
    }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut indexes = self.indexes.write().expect("collection lock poisoned");
        if !indexes.iter().any(|i| i == spec) {
            indexes.push(spec.clone());
        }
        Ok(())
    }
}

/// In-memory storage engine handing out [`MemoryCollection`] handles.
#[derive(Default)]
pub struct MemoryEngine {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
    schemas: HashMap<String, ModelSchema>,
    types: RwLock<Vec<String>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a model type with its payload coercion schema.
    pub fn with_schema(mut self, type_key: impl Into<String>, schema: ModelSchema) -> Self {
        let type_key = type_key.into();
        self.types
            .get_mut()
            .expect("engine lock poisoned")
            .push(type_key.clone());
        self.schemas.insert(type_key, schema);
        self
    }

    /// Direct handle to a concrete collection, for test assertions.
    pub fn memory_collection(&self, type_key: &str) -> Arc<MemoryCollection> {
        let mut collections = self.collections.write().expect("engine lock poisoned");
        if let Some(existing) = collections.get(type_key) {
            return Arc::clone(existing);
        }
        let collection = Arc::new(MemoryCollection::new());
        collections.insert(type_key.to_string(), Arc::clone(&collection));
        let mut types = self.types.write().expect("engine lock poisoned");
        if !types.iter().any(|t| t == type_key) {
            types.push(type_key.to_string());
        }
        collection
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    fn collection(&self, type_key: &str) -> Result<Arc<dyn Collection>> {
        Ok(self.memory_collection(type_key) as Arc<dyn Collection>)
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
    async fn test_insert_assigns_identifier() {
        let collection = MemoryCollection::new();
        collection.insert(record(json!({"name": "a"}))).await.unwrap();

        let docs = collection.documents();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].get(FIELD_ID).is_some());
    }

    #[tokio::test]
    async fn test_find_pagination() {
        let collection = MemoryCollection::new();
        for i in 0..10 {
            collection
                .insert(record(json!({"n": i})))
                .await
                .unwrap();
        }

        let page = collection.find(&Criteria::new(), 3, 4).await.unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0]["n"], json!(4));
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let collection = MemoryCollection::new();
        let criteria = Criteria::new().eq("legacy.id", 1).eq("legacy.source", "mysql");

        let first = collection
            .upsert(
                &criteria,
                record(json!({"legacy": {"id": 1, "source": "mysql"}, "name": "a"})),
                None,
            )
            .await
            .unwrap();
        assert!(!first.updated_existing);
        let id = first.upserted_id.clone().unwrap();

        let second = collection
            .upsert(
                &criteria,
                record(json!({"legacy": {"id": 1, "source": "mysql"}, "name": "b"})),
                None,
            )
            .await
            .unwrap();
        assert!(second.updated_existing);

        let docs = collection.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["name"], json!("b"));
        assert_eq!(docs[0][FIELD_ID], id);
    }

    #[tokio::test]
    async fn test_upsert_preserves_existing_identifier() {
        let collection = MemoryCollection::new();
        let criteria = Criteria::new().eq("legacy.id", 2).eq("legacy.source", "mysql");

        collection
            .insert(record(
                json!({"_id": "keep-me", "legacy": {"id": 2, "source": "mysql"}}),
            ))
            .await
            .unwrap();

        collection
            .upsert(
                &criteria,
                record(json!({"_id": "discard-me", "legacy": {"id": 2, "source": "mysql"}})),
                None,
            )
            .await
            .unwrap();

        let docs = collection.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0][FIELD_ID], json!("keep-me"));
    }

    #[tokio::test]
    async fn test_upsert_set_on_insert_only_applies_to_new_documents() {
        let collection = MemoryCollection::new();
        let criteria = Criteria::new().eq("legacy.id", 3).eq("legacy.source", "mysql");
        let mut soi = Record::new();
        soi.insert(FIELD_ID.into(), json!("generated"));

        let outcome = collection
            .upsert(
                &criteria,
                record(json!({"legacy": {"id": 3, "source": "mysql"}})),
                Some(soi),
            )
            .await
            .unwrap();
        assert_eq!(outcome.upserted_id, Some(json!("generated")));
    }

    #[tokio::test]
    async fn test_delete_many_with_empty_criteria_wipes() {
        let collection = MemoryCollection::new();
        for i in 0..5 {
            collection.insert(record(json!({"n": i}))).await.unwrap();
        }
        let removed = collection.delete_many(&Criteria::new()).await.unwrap();
        assert_eq!(removed, 5);
        assert!(collection.documents().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_index_dedupes() {
        let collection = MemoryCollection::new();
        let spec = IndexSpec::new(&["legacy.id", "legacy.source"]).unique().sparse();
        collection.ensure_index(&spec).await.unwrap();
        collection.ensure_index(&spec).await.unwrap();
        assert_eq!(collection.index_specs().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_payload_coercion() {
        use crate::engine::AttributeType;

        let engine = MemoryEngine::new().with_schema(
            "location",
            ModelSchema::new().attribute("population", AttributeType::Integer),
        );

        let payload = engine
            .to_persistable_payload("location", record(json!({"population": "12"})))
            .unwrap();
        assert_eq!(payload["population"], json!(12));

        // Unknown type passes through.
        let payload = engine
            .to_persistable_payload("tag", record(json!({"population": "12"})))
            .unwrap();
        assert_eq!(payload["population"], json!("12"));
    }

    #[tokio::test]
    async fn test_engine_registers_types_in_order() {
        let engine = MemoryEngine::new()
            .with_schema("location", ModelSchema::new())
            .with_schema("tag", ModelSchema::new());
        engine.memory_collection("publication");
        assert_eq!(engine.model_types(), vec!["location", "tag", "publication"]);
    }
}
