//! Persisters: the write-mode state machine.
//!
//! A persister converts arbitrary record maps into sanitized, type-correct
//! documents and commits them under a write mode derived from the active
//! configuration's data mode. Persisters are long-lived and may be shared
//! by many importers; they hold a non-owning back-reference to the
//! configuration, bound once through an explicit attach step.

mod document;

pub use document::{DocumentPersister, DocumentSubscriberPass};

use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{Configuration, DataMode, SharedConfiguration};
use crate::engine::{Collection, Criteria};
use crate::error::{ImportError, Result};
use crate::looper::Loopable;
use crate::record::{natural_key, Record, FIELD_ID, PATH_LEGACY_ID, PATH_LEGACY_SOURCE};

/// How records are committed to the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Raw inserts, with generated identifiers where supported.
    Insert,

    /// Match by natural key, update in place or create.
    Upsert,

    /// Plain updates. Declared for forward compatibility; no data mode
    /// derives it.
    Update,
}

impl WriteMode {
    /// Pure transition function from the configured data mode, recomputed
    /// before every write.
    pub fn derive(data_mode: DataMode) -> WriteMode {
        match data_mode {
            DataMode::Wipe | DataMode::Progressive => WriteMode::Insert,
            DataMode::Overwrite => WriteMode::Upsert,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Insert => "insert",
            WriteMode::Upsert => "upsert",
            WriteMode::Update => "update",
        }
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WriteMode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "insert" => Ok(WriteMode::Insert),
            "upsert" => Ok(WriteMode::Upsert),
            "update" => Ok(WriteMode::Update),
            other => Err(ImportError::UnsupportedWriteMode(other.to_string())),
        }
    }
}

/// Non-owning back-reference to the active configuration.
///
/// Persister implementations embed one and expose it through
/// [`Persister::configuration_slot`]; the attach step stores a weak
/// reference so that a configuration owning its importers (which in turn
/// hold their persisters) never forms a reference cycle.
#[derive(Default)]
pub struct ConfigurationSlot {
    inner: RwLock<Option<Weak<RwLock<Configuration>>>>,
}

impl ConfigurationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the configuration. Called at registration time.
    pub fn attach(&self, configuration: &SharedConfiguration) {
        let mut slot = self.inner.write().expect("configuration slot poisoned");
        *slot = Some(Arc::downgrade(configuration));
    }

    /// The attached configuration handle.
    pub fn shared(&self) -> Result<SharedConfiguration> {
        let slot = self.inner.read().expect("configuration slot poisoned");
        slot.as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                ImportError::InvalidConfiguration("no configuration attached".into())
            })
    }

    /// Read from the attached configuration.
    pub fn with<R>(&self, f: impl FnOnce(&Configuration) -> R) -> Result<R> {
        let shared = self.shared()?;
        let config = shared.read().expect("configuration lock poisoned");
        Ok(f(&config))
    }

    pub fn data_mode(&self) -> Result<DataMode> {
        self.with(|c| c.data_mode())
    }
}

/// The write-mode state machine committing records to the target store.
#[async_trait]
pub trait Persister: Send + Sync {
    /// The embedded configuration back-reference.
    fn configuration_slot(&self) -> &ConfigurationSlot;

    /// Bind the active configuration. Write and data modes are read from it
    /// to keep every persister in sync.
    fn attach_configuration(&self, configuration: &SharedConfiguration) {
        self.configuration_slot().attach(configuration);
    }

    /// The attached configuration handle.
    fn configuration(&self) -> Result<SharedConfiguration> {
        self.configuration_slot().shared()
    }

    /// The active data mode.
    fn data_mode(&self) -> Result<DataMode> {
        self.configuration_slot().data_mode()
    }

    /// The current write mode, derived from the data mode. Never stored
    /// across calls.
    fn write_mode(&self) -> Result<WriteMode> {
        Ok(WriteMode::derive(self.data_mode()?))
    }

    /// Target collection for a model type.
    fn collection(&self, type_key: &str) -> Result<Arc<dyn Collection>>;

    /// Coerce a record into a type-correct document for the model type.
    fn sanitize(&self, type_key: &str, record: Record) -> Result<Record>;

    /// Generate an identifier for a new document, when the persister
    /// supports one.
    fn generate_id(&self, type_key: &str) -> Option<Value> {
        let _ = type_key;
        None
    }

    /// Model types this persister is responsible for.
    fn model_types(&self) -> Vec<String>;

    /// Remove all prior data for every model type. Destructive and
    /// irreversible; invoked at most once per run, at setup time, when the
    /// data mode is wipe.
    async fn wipe_data(&self) -> Result<()>;

    /// (Re)create required indexes and constraints. Invoked once per
    /// distinct persister instance during setup; under wipe data mode this
    /// must wipe first.
    async fn update_schema(&self) -> Result<()>;

    /// Optional loopable schema pass driven during setup.
    fn schema_looper(&self) -> Option<Arc<dyn Loopable>> {
        None
    }

    /// Loopable consistency pass for one model type, driven during
    /// teardown.
    fn subscriber_looper(&self, type_key: &str) -> Option<Arc<dyn Loopable>> {
        let _ = type_key;
        None
    }

    /// Sanitize and commit a single record under the derived write mode.
    async fn insert(&self, type_key: &str, record: Record) -> Result<Record> {
        let record = self.sanitize(type_key, record)?;
        match self.write_mode()? {
            WriteMode::Insert => {
                let record = self.append_generated_id(type_key, record);
                self.collection(type_key)?.insert(record.clone()).await?;
                Ok(record)
            }
            WriteMode::Upsert => self.upsert_record(type_key, record).await,
            WriteMode::Update => Err(ImportError::NotImplemented("update write mode")),
        }
    }

    /// Sanitize and commit a batch under the derived write mode. Fails on
    /// an empty batch.
    async fn batch_insert(&self, type_key: &str, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Err(ImportError::InvalidArgument("nothing to insert".into()));
        }
        let mut sanitized = Vec::with_capacity(records.len());
        for record in records {
            sanitized.push(self.sanitize(type_key, record)?);
        }
        match self.write_mode()? {
            WriteMode::Insert => {
                let records: Vec<Record> = sanitized
                    .into_iter()
                    .map(|r| self.append_generated_id(type_key, r))
                    .collect();
                self.collection(type_key)?
                    .insert_many(records.clone())
                    .await?;
                Ok(records)
            }
            WriteMode::Upsert => {
                let mut out = Vec::with_capacity(sanitized.len());
                for record in sanitized {
                    out.push(self.upsert_record(type_key, record).await?);
                }
                Ok(out)
            }
            WriteMode::Update => Err(ImportError::NotImplemented("batch update write mode")),
        }
    }

    /// Attach a generated identifier when the record has none and the
    /// persister supports generation.
    fn append_generated_id(&self, type_key: &str, mut record: Record) -> Record {
        if !record.contains_key(FIELD_ID) {
            if let Some(id) = self.generate_id(type_key) {
                record.insert(FIELD_ID.into(), id);
            }
        }
        record
    }

    /// The idempotency core: match by `(legacy.id, legacy.source)`, update
    /// in place preserving the existing identifier, or create with an
    /// optionally generated identifier under set-on-insert semantics.
    ///
    /// The natural key pair is a hard precondition; a record missing either
    /// half fails with UpsertPrecondition before any write.
    async fn upsert_record(&self, type_key: &str, mut record: Record) -> Result<Record> {
        let (legacy_id, legacy_source) = natural_key(&record)?;
        let criteria = Criteria::new()
            .eq(PATH_LEGACY_ID, legacy_id)
            .eq(PATH_LEGACY_SOURCE, legacy_source);
        let collection = self.collection(type_key)?;

        let set_on_insert = if record.contains_key(FIELD_ID) {
            None
        } else {
            self.generate_id(type_key).map(|id| {
                let mut extra = Record::new();
                extra.insert(FIELD_ID.into(), id);
                extra
            })
        };

        let outcome = collection
            .upsert(&criteria, record.clone(), set_on_insert)
            .await?;

        if outcome.updated_existing {
            // The stored identifier wins over anything the record carried.
            if let Some(existing) = collection.find_one(&criteria).await? {
                if let Some(id) = existing.get(FIELD_ID) {
                    record.insert(FIELD_ID.into(), id.clone());
                }
            }
        } else if !record.contains_key(FIELD_ID) {
            if let Some(id) = outcome.upserted_id {
                record.insert(FIELD_ID.into(), id);
            }
        }

        Ok(record)
    }
}
