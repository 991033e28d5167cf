//! Record types for heterogeneous legacy data.
//!
//! Every item flowing through the engine is a [`Record`]: an ordered map of
//! field names to JSON values. Sources produce them, segments transform
//! them, persisters sanitize and commit them. Legacy provenance is carried
//! in a nested `legacy` object holding the natural key used for idempotent
//! upserts.

use serde_json::Value;

use crate::error::{ImportError, Result};

/// An arbitrary record map as produced by a source connector.
pub type Record = serde_json::Map<String, Value>;

/// Identifier field on target documents.
pub const FIELD_ID: &str = "_id";

/// Nested field carrying legacy provenance.
pub const FIELD_LEGACY: &str = "legacy";

/// Dotted path to the legacy identifier.
pub const PATH_LEGACY_ID: &str = "legacy.id";

/// Dotted path to the legacy source key.
pub const PATH_LEGACY_SOURCE: &str = "legacy.source";

/// Look up a value by dotted path (`legacy.id` reaches `record["legacy"]["id"]`).
pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = record.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// The natural key pair `(legacy.id, legacy.source)` used to match
/// pre-existing target documents during upsert.
///
/// Both halves are required; a record missing either cannot be upserted
/// safely and fails with [`ImportError::UpsertPrecondition`].
pub fn natural_key(record: &Record) -> Result<(Value, Value)> {
    let id = get_path(record, PATH_LEGACY_ID)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| {
            ImportError::UpsertPrecondition("record is missing `legacy.id`".into())
        })?;
    let source = get_path(record, PATH_LEGACY_SOURCE)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| {
            ImportError::UpsertPrecondition("record is missing `legacy.source`".into())
        })?;
    Ok((id, source))
}

/// Build a record carrying only the legacy natural key, useful for tests
/// and for constructing upsert criteria payloads.
pub fn legacy_stub(id: impl Into<Value>, source: impl Into<String>) -> Record {
    let mut legacy = Record::new();
    legacy.insert("id".into(), id.into());
    legacy.insert("source".into(), Value::String(source.into()));

    let mut record = Record::new();
    record.insert(FIELD_LEGACY.into(), Value::Object(legacy));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_get_path_nested() {
        let rec = record(json!({"legacy": {"id": 42, "source": "mysql"}}));
        assert_eq!(get_path(&rec, "legacy.id"), Some(&json!(42)));
        assert_eq!(get_path(&rec, "legacy.source"), Some(&json!("mysql")));
        assert_eq!(get_path(&rec, "legacy.missing"), None);
        assert_eq!(get_path(&rec, "other"), None);
    }

    #[test]
    fn test_get_path_top_level() {
        let rec = record(json!({"name": "x"}));
        assert_eq!(get_path(&rec, "name"), Some(&json!("x")));
    }

    #[test]
    fn test_natural_key_present() {
        let rec = record(json!({"legacy": {"id": 7, "source": "mysql"}, "name": "a"}));
        let (id, source) = natural_key(&rec).unwrap();
        assert_eq!(id, json!(7));
        assert_eq!(source, json!("mysql"));
    }

    #[test]
    fn test_natural_key_missing_source() {
        let rec = record(json!({"legacy": {"id": 7}}));
        let err = natural_key(&rec).unwrap_err();
        assert!(matches!(err, ImportError::UpsertPrecondition(_)));
    }

    #[test]
    fn test_natural_key_null_id() {
        let rec = record(json!({"legacy": {"id": null, "source": "mysql"}}));
        assert!(natural_key(&rec).is_err());
    }

    #[test]
    fn test_legacy_stub() {
        let rec = legacy_stub(3, "mongo");
        let (id, source) = natural_key(&rec).unwrap();
        assert_eq!(id, json!(3));
        assert_eq!(source, json!("mongo"));
    }
}
