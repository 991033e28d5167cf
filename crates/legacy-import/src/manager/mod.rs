//! Import manager: configuration lifecycle and context filtering.
//!
//! The manager owns the single active configuration of a run, mediates the
//! durable store, and narrows the injected importer services to those valid
//! for the current deployment context. Loading a stored configuration
//! re-binds the live services by key and restores every enabled bit exactly
//! as persisted.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{Configuration, ConfigurationSnapshot, SharedConfiguration};
use crate::error::Result;
use crate::importer::Importer;
use crate::persister::Persister;
use crate::store::{generate_filename, ConfigStore};

/// Owns the active configuration and the importer service registry.
pub struct Manager {
    context_key: String,
    store: Arc<dyn ConfigStore>,
    importers: Vec<Arc<dyn Importer>>,
    configuration: SharedConfiguration,
}

impl Manager {
    /// Create a manager with a fresh, empty configuration for its context.
    pub fn new(context_key: impl Into<String>, store: Arc<dyn ConfigStore>) -> Self {
        let context_key = context_key.into();
        let configuration = Configuration::new(context_key.as_str()).into_shared();
        Manager {
            context_key,
            store,
            importers: Vec::new(),
            configuration,
        }
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    /// The active configuration handle.
    pub fn configuration(&self) -> SharedConfiguration {
        Arc::clone(&self.configuration)
    }

    /// Inject an importer service and register it into the active
    /// configuration when it supports the current context.
    pub fn add_importer(&mut self, importer: Arc<dyn Importer>) {
        let supported = {
            let config = self.configuration.read().expect("configuration lock poisoned");
            importer.supports(&config)
        };
        self.importers.push(Arc::clone(&importer));
        if supported {
            self.register(importer);
        } else {
            debug!(key = importer.key(), "importer does not support this context");
        }
    }

    /// Register an importer into the active configuration and bind the
    /// configuration back-reference.
    fn register(&self, importer: Arc<dyn Importer>) {
        {
            let mut config = self
                .configuration
                .write()
                .expect("configuration lock poisoned");
            config.add_importer(Arc::clone(&importer));
        }
        importer.attach_configuration(&self.configuration);
    }

    /// Build a fresh configuration, registering every injected importer
    /// that supports this context.
    pub fn create(&mut self) -> SharedConfiguration {
        self.configuration = Configuration::new(self.context_key.as_str()).into_shared();
        for importer in self.importers.clone() {
            let supported = {
                let config = self.configuration.read().expect("configuration lock poisoned");
                importer.supports(&config)
            };
            if supported {
                self.register(importer);
            }
        }
        info!(context = %self.context_key, "created configuration");
        self.configuration()
    }

    /// Load a stored configuration and re-bind the injected importer
    /// services into it, restoring the persisted enabled bits by key.
    pub fn load(&mut self, filename: &str) -> Result<SharedConfiguration> {
        let snapshot = self.store.read(filename)?;
        self.configuration = Configuration::from_snapshot_header(&snapshot).into_shared();
        self.initialize_from_snapshot(&snapshot)?;
        info!(filename, "loaded configuration");
        Ok(self.configuration())
    }

    /// Translate stored importer/segment keys back into the currently
    /// loaded services: stored keys bind first (preserving the stored
    /// registration order), newly available importers append after, and
    /// finally every persisted bit is restored. Stored keys that no longer
    /// resolve are skipped.
    fn initialize_from_snapshot(&self, snapshot: &ConfigurationSnapshot) -> Result<()> {
        for state in &snapshot.importers {
            match self.service(&state.key) {
                Some(importer) => {
                    let supported = {
                        let config =
                            self.configuration.read().expect("configuration lock poisoned");
                        importer.supports(&config)
                    };
                    if supported {
                        self.register(importer);
                    } else {
                        warn!(key = %state.key, "stored importer no longer supports this context");
                    }
                }
                None => warn!(key = %state.key, "stored importer is no longer registered"),
            }
        }

        for importer in self.importers.clone() {
            let (known, supported) = {
                let config = self.configuration.read().expect("configuration lock poisoned");
                (config.has_importer(importer.key()), importer.supports(&config))
            };
            if !known && supported {
                self.register(importer);
            }
        }

        let mut config = self
            .configuration
            .write()
            .expect("configuration lock poisoned");
        for state in &snapshot.importers {
            if config.has_importer(&state.key) {
                config.set_importer_enabled(&state.key, state.enabled)?;
            }
        }
        for state in &snapshot.segments {
            if config.has_segment(&state.key) {
                config.set_segment_enabled(&state.key, state.enabled)?;
            } else {
                warn!(key = %state.key, "stored segment is no longer registered");
            }
        }
        Ok(())
    }

    /// Persist the active configuration, assigning its filename on first
    /// save, then reload it from storage; the round trip through the store
    /// is authoritative.
    pub fn save(&mut self) -> Result<SharedConfiguration> {
        let (filename, snapshot) = {
            let mut config = self
                .configuration
                .write()
                .expect("configuration lock poisoned");
            let filename = match config.filename() {
                Some(f) => f.to_string(),
                None => {
                    let f = generate_filename(config.context_key());
                    config.set_filename(f.clone());
                    f
                }
            };
            config.touch();
            (filename, config.snapshot())
        };

        self.store.write(&filename, &snapshot)?;
        info!(filename = %filename, "saved configuration");
        self.load(&filename)
    }

    /// Remove the backing durable record. A configuration that was never
    /// persisted is a no-op.
    pub fn delete(&self, configuration: &SharedConfiguration) -> Result<()> {
        let filename = {
            let config = configuration.read().expect("configuration lock poisoned");
            config.filename().map(|f| f.to_string())
        };
        match filename {
            Some(filename) => self.store.delete(&filename),
            None => {
                debug!("configuration was never persisted; nothing to delete");
                Ok(())
            }
        }
    }

    /// Remove a stored snapshot's backing record.
    pub fn delete_snapshot(&self, snapshot: &ConfigurationSnapshot) -> Result<()> {
        match &snapshot.filename {
            Some(filename) => self.store.delete(filename),
            None => Ok(()),
        }
    }

    /// Every persisted configuration snapshot, in storage listing order.
    pub fn all(&self) -> Result<Vec<ConfigurationSnapshot>> {
        self.store.list()
    }

    /// The configuration's importers re-filtered by `supports`, guarding
    /// against a loaded configuration carrying importers that are no longer
    /// valid in the running deployment.
    pub fn importers_for_context(&self, all: bool) -> Vec<Arc<dyn Importer>> {
        let config = self.configuration.read().expect("configuration lock poisoned");
        config
            .importers(all)
            .into_iter()
            .filter(|i| i.supports(&config))
            .collect()
    }

    /// Distinct concrete persister instances among currently enabled,
    /// context-valid importers. Deduplicated by instance identity: two
    /// importers sharing one persister yield it once.
    pub fn distinct_persisters(&self) -> Vec<Arc<dyn Persister>> {
        let mut seen: Vec<*const ()> = Vec::new();
        let mut persisters = Vec::new();
        for importer in self.importers_for_context(false) {
            let persister = importer.persister();
            let identity = Arc::as_ptr(&persister) as *const ();
            if !seen.contains(&identity) {
                seen.push(identity);
                persisters.push(persister);
            }
        }
        persisters
    }

    /// Global startup tasks: schema update once per distinct persister,
    /// then every importer's post-schema hook.
    pub async fn set_up(&self) -> Result<()> {
        let persisters = self.distinct_persisters();
        for persister in persisters {
            persister.update_schema().await?;
        }
        for importer in self.importers_for_context(false) {
            importer.post_update_schema().await?;
        }
        Ok(())
    }

    fn service(&self, key: &str) -> Option<Arc<dyn Importer>> {
        self.importers
            .iter()
            .find(|i| i.key() == key)
            .map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataMode;
    use crate::store::FileConfigStore;
    use crate::testing::{MockImporter, MockPersister};
    use std::sync::atomic::Ordering;

    fn manager_with_store() -> (Manager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileConfigStore::open(dir.path()).unwrap());
        (Manager::new("default", store), dir)
    }

    fn inject_two_importers(manager: &mut Manager) -> Arc<MockPersister> {
        let persister = Arc::new(MockPersister::new());
        manager.add_importer(Arc::new(MockImporter::new(
            "location",
            &["location.city", "location.country"],
            Arc::clone(&persister) as _,
        )));
        manager.add_importer(Arc::new(MockImporter::new(
            "tag",
            &["tag.family"],
            Arc::clone(&persister) as _,
        )));
        persister
    }

    #[test]
    fn test_add_importer_registers_supported_only() {
        let (mut manager, _dir) = manager_with_store();
        let persister = Arc::new(MockPersister::new());

        manager.add_importer(Arc::new(MockImporter::new(
            "location",
            &["location.city"],
            Arc::clone(&persister) as _,
        )));
        manager.add_importer(Arc::new(
            MockImporter::new("other", &["other.x"], persister as _)
                .with_contexts(&["another-context"]),
        ));

        let config = manager.configuration();
        let config = config.read().unwrap();
        assert!(config.has_importer("location"));
        assert!(!config.has_importer("other"));
    }

    #[test]
    fn test_create_rebuilds_from_services() {
        let (mut manager, _dir) = manager_with_store();
        inject_two_importers(&mut manager);

        {
            let config = manager.configuration();
            let mut config = config.write().unwrap();
            config.toggle_segment("tag.family").unwrap();
        }

        let fresh = manager.create();
        let fresh = fresh.read().unwrap();
        assert!(fresh.has_importer("location"));
        assert!(fresh.has_importer("tag"));
        // A fresh configuration starts with every segment disabled.
        assert!(!fresh.segment_enabled("tag.family").unwrap());
    }

    #[test]
    fn test_save_assigns_filename_once() {
        let (mut manager, _dir) = manager_with_store();
        inject_two_importers(&mut manager);

        manager.save().unwrap();
        let first = {
            let config = manager.configuration();
            let config = config.read().unwrap();
            config.filename().unwrap().to_string()
        };

        manager.save().unwrap();
        let second = {
            let config = manager.configuration();
            let config = config.read().unwrap();
            config.filename().unwrap().to_string()
        };
        assert_eq!(first, second);
        assert_eq!(manager.all().unwrap().len(), 1);
    }

    #[test]
    fn test_save_load_round_trip_restores_state() {
        let (mut manager, _dir) = manager_with_store();
        inject_two_importers(&mut manager);

        {
            let config = manager.configuration();
            let mut config = config.write().unwrap();
            config.set_data_mode(DataMode::Wipe);
            config.toggle_segment("location.city").unwrap();
            config.toggle_importer("tag").unwrap();
        }

        let saved_snapshot = {
            manager.save().unwrap();
            let config = manager.configuration();
            let config = config.read().unwrap();
            config.snapshot()
        };
        let filename = saved_snapshot.filename.clone().unwrap();

        // A different manager with the same services loads it back.
        let store = Arc::clone(&manager.store);
        let mut other = Manager {
            context_key: "default".into(),
            store,
            importers: manager.importers.clone(),
            configuration: Configuration::new("default").into_shared(),
        };
        let loaded = other.load(&filename).unwrap();
        let loaded = loaded.read().unwrap();

        assert_eq!(loaded.snapshot(), saved_snapshot);
        assert!(loaded.segment_enabled("location.city").unwrap());
        assert!(!loaded.importer_enabled("tag").unwrap());
        assert!(!loaded.segment_enabled("tag.family").unwrap());
    }

    #[test]
    fn test_load_skips_stale_keys() {
        let (mut manager, _dir) = manager_with_store();
        inject_two_importers(&mut manager);
        manager.save().unwrap();
        let filename = {
            let config = manager.configuration();
            let config = config.read().unwrap();
            config.filename().unwrap().to_string()
        };

        // A deployment that lost the tag importer still loads the config.
        let store = Arc::clone(&manager.store);
        let mut shrunk = Manager::new("default", store);
        let persister = Arc::new(MockPersister::new());
        shrunk.add_importer(Arc::new(MockImporter::new(
            "location",
            &["location.city", "location.country"],
            persister as _,
        )));

        let loaded = shrunk.load(&filename).unwrap();
        let loaded = loaded.read().unwrap();
        assert!(loaded.has_importer("location"));
        assert!(!loaded.has_importer("tag"));
    }

    #[test]
    fn test_delete_unpersisted_is_noop() {
        let (manager, _dir) = manager_with_store();
        let config = manager.configuration();
        manager.delete(&config).unwrap();
    }

    #[test]
    fn test_delete_removes_stored_record() {
        let (mut manager, _dir) = manager_with_store();
        inject_two_importers(&mut manager);
        manager.save().unwrap();
        assert_eq!(manager.all().unwrap().len(), 1);

        let config = manager.configuration();
        manager.delete(&config).unwrap();
        assert!(manager.all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_up_runs_schema_once_per_shared_persister() {
        let (mut manager, _dir) = manager_with_store();
        let persister = inject_two_importers(&mut manager);

        manager.set_up().await.unwrap();
        assert_eq!(persister.schema_updates(), 1);
    }

    #[tokio::test]
    async fn test_set_up_runs_schema_per_distinct_persister() {
        let (mut manager, _dir) = manager_with_store();
        let first = Arc::new(MockPersister::new());
        let second = Arc::new(MockPersister::new());
        manager.add_importer(Arc::new(MockImporter::new(
            "location",
            &["location.city"],
            Arc::clone(&first) as _,
        )));
        manager.add_importer(Arc::new(MockImporter::new(
            "tag",
            &["tag.family"],
            Arc::clone(&second) as _,
        )));

        manager.set_up().await.unwrap();
        assert_eq!(first.schema_updates(), 1);
        assert_eq!(second.schema_updates(), 1);
    }

    #[tokio::test]
    async fn test_set_up_skips_disabled_importers() {
        let (mut manager, _dir) = manager_with_store();
        let persister = inject_two_importers(&mut manager);

        {
            let config = manager.configuration();
            let mut config = config.write().unwrap();
            config.toggle_importer("location").unwrap();
            config.toggle_importer("tag").unwrap();
        }

        manager.set_up().await.unwrap();
        assert_eq!(persister.schema_updates(), 0);
    }

    #[tokio::test]
    async fn test_set_up_invokes_post_schema_hooks() {
        let (mut manager, _dir) = manager_with_store();
        let persister = Arc::new(MockPersister::new());
        let importer = Arc::new(MockImporter::new(
            "location",
            &["location.city"],
            persister as _,
        ));
        manager.add_importer(Arc::clone(&importer) as _);

        manager.set_up().await.unwrap();
        assert_eq!(importer.post_schema_calls.load(Ordering::SeqCst), 1);
    }
}
