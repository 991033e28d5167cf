//! Durable configuration storage.
//!
//! A [`ConfigStore`] is a key→snapshot store keyed by generated filenames
//! under an operator-configured path. Only plain snapshots cross this
//! boundary; live services are re-bound by the manager after a load.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ConfigurationSnapshot;
use crate::error::{ImportError, Result};

/// Storage strategy for configuration snapshots.
pub trait ConfigStore: Send + Sync {
    /// Persist a snapshot under a filename.
    fn write(&self, filename: &str, snapshot: &ConfigurationSnapshot) -> Result<()>;

    /// Load a snapshot by filename.
    fn read(&self, filename: &str) -> Result<ConfigurationSnapshot>;

    /// Remove a stored snapshot. Removing an unknown filename is an error.
    fn delete(&self, filename: &str) -> Result<()>;

    /// Every stored snapshot, in storage listing order.
    fn list(&self) -> Result<Vec<ConfigurationSnapshot>>;

    /// The backend type name for logging.
    fn backend_type(&self) -> &'static str;
}

/// Generate a storage filename carrying the context key.
pub fn generate_filename(context_key: &str) -> String {
    format!("import_{}_{}.json", context_key, Uuid::new_v4())
}

/// File-backed store: one pretty-printed JSON snapshot per file, written
/// atomically via a temp file in the same directory.
pub struct FileConfigStore {
    root: PathBuf,
}

impl FileConfigStore {
    /// Open a store over a directory, creating it when missing.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        Ok(FileConfigStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf> {
        // Filenames are generated tokens; refuse anything path-like.
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(ImportError::InvalidArgument(format!(
                "invalid configuration filename `{}`",
                filename
            )));
        }
        Ok(self.root.join(filename))
    }
}

impl ConfigStore for FileConfigStore {
    fn write(&self, filename: &str, snapshot: &ConfigurationSnapshot) -> Result<()> {
        let path = self.path_for(filename)?;
        let content = serde_json::to_string_pretty(snapshot)?;

        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &path)?;

        debug!(filename, "wrote configuration snapshot");
        Ok(())
    }

    fn read(&self, filename: &str) -> Result<ConfigurationSnapshot> {
        let path = self.path_for(filename)?;
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn delete(&self, filename: &str) -> Result<()> {
        let path = self.path_for(filename)?;
        std::fs::remove_file(&path)?;
        debug!(filename, "deleted configuration snapshot");
        Ok(())
    }

    fn list(&self) -> Result<Vec<ConfigurationSnapshot>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut snapshots = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable snapshot");
                }
            }
        }
        Ok(snapshots)
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ConfigurationSnapshot, DataMode, ElasticMode, ProgressiveMode, SchemaMode,
        SubscriberMode, ToggleState,
    };
    use chrono::Utc;

    fn snapshot(filename: Option<&str>) -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            context_key: "default".into(),
            data_mode: DataMode::Overwrite,
            progressive_mode: ProgressiveMode::Id,
            schema_mode: SchemaMode::None,
            elastic_mode: ElasticMode::None,
            subscriber_mode: SubscriberMode::None,
            filename: filename.map(|f| f.to_string()),
            modified: Utc::now(),
            importers: vec![ToggleState {
                key: "location".into(),
                enabled: true,
            }],
            segments: Vec::new(),
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::open(dir.path()).unwrap();

        let filename = generate_filename("default");
        let snap = snapshot(Some(&filename));
        store.write(&filename, &snap).unwrap();

        let loaded = store.read(&filename).unwrap();
        assert_eq!(loaded, snap);
    }

    #[test]
    fn test_list_returns_all_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::open(dir.path()).unwrap();

        for _ in 0..3 {
            let filename = generate_filename("default");
            store.write(&filename, &snapshot(Some(&filename))).unwrap();
        }

        assert_eq!(store.list().unwrap().len(), 3);
    }

    #[test]
    fn test_delete_removes_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::open(dir.path()).unwrap();

        let filename = generate_filename("default");
        store.write(&filename, &snapshot(Some(&filename))).unwrap();
        store.delete(&filename).unwrap();

        assert!(store.read(&filename).is_err());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::open(dir.path()).unwrap();
        assert!(store.read("../escape.json").is_err());
    }

    #[test]
    fn test_filename_carries_context() {
        let filename = generate_filename("site-a");
        assert!(filename.starts_with("import_site-a_"));
        assert!(filename.ends_with(".json"));
    }
}
