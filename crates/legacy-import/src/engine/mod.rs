//! Target storage engine adapter.
//!
//! The persister commits documents through these interfaces rather than
//! talking to a store directly: a [`StorageEngine`] hands out per-model-type
//! [`Collection`] handles and owns the type-coercion contract that turns an
//! arbitrary record into a persistable payload. Conditional upsert
//! (match-or-insert on a criteria query) is a first-class collection
//! operation, so no engine internals ever need to be reached around.

mod file;
mod memory;

pub use file::FileEngine;
pub use memory::{MemoryCollection, MemoryEngine};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::record::{get_path, Record};
use crate::text;

/// Ordered equality predicates on dotted field paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    predicates: Vec<(String, Value)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality predicate on a dotted path.
    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push((path.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[(String, Value)] {
        &self.predicates
    }

    /// Whether a record satisfies every predicate.
    pub fn matches(&self, record: &Record) -> bool {
        self.predicates
            .iter()
            .all(|(path, value)| get_path(record, path) == Some(value))
    }
}

/// Sort direction for source retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Declaration of an index or constraint on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Dotted field paths covered by the index.
    pub fields: Vec<String>,

    /// Reject duplicate key tuples.
    pub unique: bool,

    /// Skip documents missing the indexed fields.
    pub sparse: bool,
}

impl IndexSpec {
    pub fn new(fields: &[&str]) -> Self {
        IndexSpec {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique: false,
            sparse: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }
}

/// Result of a conditional upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// An existing document matched the criteria and was updated in place.
    pub updated_existing: bool,

    /// Identifier assigned by the insert side, when a new document was
    /// created.
    pub upserted_id: Option<Value>,
}

/// Per-model-type handle into the target store.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Count documents matching the criteria.
    async fn count(&self, criteria: &Criteria) -> Result<i64>;

    /// Fetch matching documents with offset pagination, in stable store
    /// order.
    async fn find(&self, criteria: &Criteria, limit: usize, skip: i64) -> Result<Vec<Record>>;

    /// Fetch the first matching document.
    async fn find_one(&self, criteria: &Criteria) -> Result<Option<Record>>;

    /// Raw insert of a single document.
    async fn insert(&self, record: Record) -> Result<()>;

    /// Raw insert of a batch of documents.
    async fn insert_many(&self, records: Vec<Record>) -> Result<()>;

    /// Conditional upsert: if a document matches the criteria, merge `set`
    /// onto it, preserving its existing identifier; otherwise create a new
    /// document from `set`, additionally applying `set_on_insert` fields
    /// that only take effect on the insert side.
    async fn upsert(
        &self,
        criteria: &Criteria,
        set: Record,
        set_on_insert: Option<Record>,
    ) -> Result<UpsertOutcome>;

    /// Delete every document matching the criteria. An empty criteria
    /// deletes all documents.
    async fn delete_many(&self, criteria: &Criteria) -> Result<u64>;

    /// Create an index if it does not already exist.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()>;
}

/// The target storage engine: collection handles plus the payload contract.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Handle for a model type's collection.
    fn collection(&self, type_key: &str) -> Result<Arc<dyn Collection>>;

    /// Every model type this engine persists.
    fn model_types(&self) -> Vec<String>;

    /// Coerce an arbitrary record into a type-correct document for the
    /// model type, per the engine's declared schema. Unknown fields pass
    /// through unchanged.
    fn to_persistable_payload(&self, type_key: &str, record: Record) -> Result<Record>;
}

/// Declared attribute type for payload coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Object,
}

/// Per-model-type attribute declarations driving
/// [`StorageEngine::to_persistable_payload`].
#[derive(Debug, Clone, Default)]
pub struct ModelSchema {
    attributes: BTreeMap<String, AttributeType>,
}

impl ModelSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, field: impl Into<String>, kind: AttributeType) -> Self {
        self.attributes.insert(field.into(), kind);
        self
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&String, &AttributeType)> {
        self.attributes.iter()
    }

    /// Apply the declared coercions to a record. Fields without a
    /// declaration, along with `_id` and `legacy`, pass through unchanged.
    pub fn coerce(&self, mut record: Record) -> Record {
        for (field, kind) in &self.attributes {
            if field == crate::record::FIELD_ID || field == crate::record::FIELD_LEGACY {
                continue;
            }
            if let Some(value) = record.get(field) {
                if !value.is_null() {
                    let coerced = coerce_value(value, *kind);
                    record.insert(field.clone(), coerced);
                }
            }
        }
        record
    }
}

fn coerce_value(value: &Value, kind: AttributeType) -> Value {
    match kind {
        AttributeType::String => match value {
            Value::String(s) => Value::String(text::clean(s)),
            other => Value::String(text::clean(&other.to_string())),
        },
        AttributeType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => value.clone(),
            Value::Number(n) => n
                .as_f64()
                .map(|f| Value::from(f as i64))
                .unwrap_or_else(|| value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| value.clone()),
            Value::Bool(b) => Value::from(*b as i64),
            other => other.clone(),
        },
        AttributeType::Float => match value {
            Value::Number(_) => value.clone(),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
            other => other.clone(),
        },
        AttributeType::Boolean => match value {
            Value::Bool(_) => value.clone(),
            Value::Number(n) => Value::Bool(n.as_i64().map(|i| i != 0).unwrap_or(false)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "y" => Value::Bool(true),
                "0" | "false" | "no" | "n" | "" => Value::Bool(false),
                _ => value.clone(),
            },
            other => other.clone(),
        },
        AttributeType::DateTime => coerce_datetime(value),
        AttributeType::Object => value.clone(),
    }
}

/// Normalize date representations to RFC 3339 in UTC. Values that cannot
/// be parsed pass through unchanged.
fn coerce_datetime(value: &Value) -> Value {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Value::String(dt.with_timezone(&Utc).to_rfc3339());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Value::String(Utc.from_utc_datetime(&dt).to_rfc3339());
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                    return Value::String(Utc.from_utc_datetime(&dt).to_rfc3339());
                }
            }
            value.clone()
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_criteria_matches_dotted_paths() {
        let criteria = Criteria::new()
            .eq("legacy.id", 42)
            .eq("legacy.source", "mysql");
        let rec = record(json!({"legacy": {"id": 42, "source": "mysql"}, "x": 1}));
        assert!(criteria.matches(&rec));

        let other = record(json!({"legacy": {"id": 42, "source": "mongo"}}));
        assert!(!criteria.matches(&other));
    }

    #[test]
    fn test_empty_criteria_matches_everything() {
        assert!(Criteria::new().matches(&Record::new()));
    }

    #[test]
    fn test_schema_coerces_declared_attributes() {
        let schema = ModelSchema::new()
            .attribute("name", AttributeType::String)
            .attribute("population", AttributeType::Integer)
            .attribute("active", AttributeType::Boolean)
            .attribute("created", AttributeType::DateTime);

        let rec = record(json!({
            "name": "  Springfield \u{0000}",
            "population": "30720",
            "active": "1",
            "created": "2015-04-01 08:30:00",
            "extra": "untouched",
        }));

        let coerced = schema.coerce(rec);
        assert_eq!(coerced["name"], json!("Springfield"));
        assert_eq!(coerced["population"], json!(30720));
        assert_eq!(coerced["active"], json!(true));
        assert_eq!(coerced["created"], json!("2015-04-01T08:30:00+00:00"));
        assert_eq!(coerced["extra"], json!("untouched"));
    }

    #[test]
    fn test_schema_leaves_null_and_missing_alone() {
        let schema = ModelSchema::new().attribute("n", AttributeType::Integer);
        let rec = record(json!({"n": null}));
        let coerced = schema.coerce(rec);
        assert_eq!(coerced["n"], Value::Null);
    }

    #[test]
    fn test_datetime_from_epoch() {
        let value = coerce_datetime(&json!(0));
        assert_eq!(value, json!("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn test_unparseable_values_pass_through() {
        let schema = ModelSchema::new()
            .attribute("n", AttributeType::Integer)
            .attribute("d", AttributeType::DateTime);
        let rec = record(json!({"n": "not a number", "d": "someday"}));
        let coerced = schema.coerce(rec);
        assert_eq!(coerced["n"], json!("not a number"));
        assert_eq!(coerced["d"], json!("someday"));
    }

    #[test]
    fn test_index_spec_builder() {
        let spec = IndexSpec::new(&["legacy.id", "legacy.source"])
            .unique()
            .sparse();
        assert!(spec.unique);
        assert!(spec.sparse);
        assert_eq!(spec.fields.len(), 2);
    }
}
