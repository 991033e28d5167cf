//! Shared test doubles for engine components.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::{Collection, MemoryEngine, StorageEngine};
use crate::error::{ImportError, Result};
use crate::importer::{Importer, Segment};
use crate::persister::{ConfigurationSlot, Persister};
use crate::record::Record;
use crate::source::{MemorySource, Source};

/// Persister double counting its lifecycle calls, backed by a memory
/// engine.
pub(crate) struct MockPersister {
    engine: MemoryEngine,
    slot: ConfigurationSlot,
    pub update_schema_calls: AtomicUsize,
    pub wipe_calls: AtomicUsize,
}

impl MockPersister {
    pub fn new() -> Self {
        MockPersister {
            engine: MemoryEngine::new(),
            slot: ConfigurationSlot::new(),
            update_schema_calls: AtomicUsize::new(0),
            wipe_calls: AtomicUsize::new(0),
        }
    }

    pub fn schema_updates(&self) -> usize {
        self.update_schema_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Persister for MockPersister {
    fn configuration_slot(&self) -> &ConfigurationSlot {
        &self.slot
    }

    fn collection(&self, type_key: &str) -> Result<Arc<dyn Collection>> {
        self.engine.collection(type_key)
    }

    fn sanitize(&self, _type_key: &str, record: Record) -> Result<Record> {
        Ok(record)
    }

    fn model_types(&self) -> Vec<String> {
        vec!["mock".to_string()]
    }

    async fn wipe_data(&self) -> Result<()> {
        self.wipe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_schema(&self) -> Result<()> {
        self.update_schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Segment double serving fixed records and logging persisted batches.
pub(crate) struct MockSegment {
    key: String,
    limit: usize,
    records: Vec<Record>,
    persisted: Arc<Mutex<Vec<Record>>>,
    fail_persist: bool,
    discard_all: bool,
}

impl MockSegment {
    pub fn new(key: &str) -> Self {
        MockSegment {
            key: key.to_string(),
            limit: crate::looper::DEFAULT_PAGE_SIZE,
            records: Vec::new(),
            persisted: Arc::new(Mutex::new(Vec::new())),
            fail_persist: false,
            discard_all: false,
        }
    }

    pub fn with_records(mut self, count: usize) -> Self {
        self.records = (0..count)
            .map(|i| {
                let mut record = Record::new();
                record.insert("n".into(), Value::from(i as i64));
                record
            })
            .collect();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_persist = true;
        self
    }

    pub fn discarding(mut self) -> Self {
        self.discard_all = true;
        self
    }

    pub fn persisted(&self) -> Arc<Mutex<Vec<Record>>> {
        Arc::clone(&self.persisted)
    }
}

#[async_trait]
impl Segment for MockSegment {
    fn key(&self) -> &str {
        &self.key
    }

    fn limit(&self) -> usize {
        self.limit
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.records.len() as i64)
    }

    async fn retrieve(&self, limit: usize, skip: i64) -> Result<Vec<Record>> {
        Ok(self
            .records
            .iter()
            .skip(skip.max(0) as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    fn transform(&self, item: Record) -> Option<Record> {
        if self.discard_all {
            None
        } else {
            Some(item)
        }
    }

    async fn persist(&self, items: Vec<Record>) -> Result<()> {
        if self.fail_persist {
            return Err(ImportError::Source("persist refused".into()));
        }
        self.persisted.lock().unwrap().extend(items);
        Ok(())
    }
}

/// Importer double grouping mock segments around a shared persister.
pub(crate) struct MockImporter {
    key: String,
    contexts: Vec<String>,
    segments: Vec<Arc<dyn Segment>>,
    persister: Arc<dyn Persister>,
    source: Arc<dyn Source>,
    pub post_schema_calls: AtomicUsize,
}

impl MockImporter {
    /// Importer with empty mock segments for the given keys, supporting the
    /// "default" context.
    pub fn new(key: &str, segment_keys: &[&str], persister: Arc<dyn Persister>) -> Self {
        let segments = segment_keys
            .iter()
            .map(|k| Arc::new(MockSegment::new(k)) as Arc<dyn Segment>)
            .collect();
        MockImporter {
            key: key.to_string(),
            contexts: vec!["default".to_string()],
            segments,
            persister,
            source: Arc::new(MemorySource::new()),
            post_schema_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_segments(
        key: &str,
        segments: Vec<Arc<dyn Segment>>,
        persister: Arc<dyn Persister>,
    ) -> Self {
        MockImporter {
            key: key.to_string(),
            contexts: vec!["default".to_string()],
            segments,
            persister,
            source: Arc::new(MemorySource::new()),
            post_schema_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_contexts(mut self, contexts: &[&str]) -> Self {
        self.contexts = contexts.iter().map(|c| c.to_string()).collect();
        self
    }
}

#[async_trait]
impl Importer for MockImporter {
    fn key(&self) -> &str {
        &self.key
    }

    fn supported_contexts(&self) -> &[String] {
        &self.contexts
    }

    fn segments(&self) -> Vec<Arc<dyn Segment>> {
        self.segments.clone()
    }

    fn persister(&self) -> Arc<dyn Persister> {
        Arc::clone(&self.persister)
    }

    fn source(&self) -> Arc<dyn Source> {
        Arc::clone(&self.source)
    }

    async fn post_update_schema(&self) -> Result<()> {
        self.post_schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
