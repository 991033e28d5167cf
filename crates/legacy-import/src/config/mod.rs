//! The durable migration plan.
//!
//! A [`Configuration`] holds the operator-selected modes, the ordered set
//! of registered importers and segments with their enabled bits, and the
//! identity/modification metadata used by the durable store. It owns its
//! importer and segment registrations; importers and persisters hold only
//! non-owning back-references, bound through an explicit attach step at
//! registration time.

mod types;

pub use types::*;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{ImportError, Result};
use crate::importer::{Importer, Segment};

/// Shared handle to the single active configuration of a run.
///
/// The wizard mutates it in place while importers, segments and persisters
/// read it; a run has no concurrent writers.
pub type SharedConfiguration = Arc<RwLock<Configuration>>;

struct ImporterEntry {
    importer: Arc<dyn Importer>,
    toggle: Toggle,
}

struct SegmentEntry {
    importer_key: String,
    segment: Arc<dyn Segment>,
    toggle: Toggle,
}

/// The durable migration plan: selected modes plus the registered
/// importer/segment sets and their enabled bits, in registration order.
pub struct Configuration {
    context_key: String,
    data_mode: DataMode,
    progressive_mode: ProgressiveMode,
    schema_mode: SchemaMode,
    elastic_mode: ElasticMode,
    subscriber_mode: SubscriberMode,
    filename: Option<String>,
    modified: DateTime<Utc>,
    importers: Vec<ImporterEntry>,
    segments: Vec<SegmentEntry>,
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("context_key", &self.context_key)
            .field("data_mode", &self.data_mode)
            .field("progressive_mode", &self.progressive_mode)
            .field("schema_mode", &self.schema_mode)
            .field("elastic_mode", &self.elastic_mode)
            .field("subscriber_mode", &self.subscriber_mode)
            .field("filename", &self.filename)
            .field("modified", &self.modified)
            .field(
                "importers",
                &self
                    .importers
                    .iter()
                    .map(|e| e.importer.key())
                    .collect::<Vec<_>>(),
            )
            .field(
                "segments",
                &self
                    .segments
                    .iter()
                    .map(|e| &e.importer_key)
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Configuration {
    /// Create an empty configuration with mode defaults for a context.
    pub fn new(context_key: impl Into<String>) -> Self {
        Configuration {
            context_key: context_key.into(),
            data_mode: DataMode::default(),
            progressive_mode: ProgressiveMode::default(),
            schema_mode: SchemaMode::default(),
            elastic_mode: ElasticMode::default(),
            subscriber_mode: SubscriberMode::default(),
            filename: None,
            modified: Utc::now(),
            importers: Vec::new(),
            segments: Vec::new(),
        }
    }

    /// Factory: register the given importers, initialize every segment
    /// disabled, then selectively re-enable per `segment_toggles`.
    ///
    /// Fails with NotFound when a toggle names an unregistered segment.
    pub fn create(
        context_key: impl Into<String>,
        importers: Vec<Arc<dyn Importer>>,
        segment_toggles: &HashMap<String, bool>,
    ) -> Result<Self> {
        let mut config = Configuration::new(context_key);
        for importer in importers {
            config.add_importer(importer);
        }
        for (key, enabled) in segment_toggles {
            if *enabled {
                config.set_segment_enabled(key, true)?;
            }
        }
        config.touch();
        Ok(config)
    }

    /// Rebuild the mode/identity header from a stored snapshot. The
    /// importer/segment registries start empty; the manager re-binds live
    /// services by key and restores their bits.
    pub fn from_snapshot_header(snapshot: &ConfigurationSnapshot) -> Self {
        Configuration {
            context_key: snapshot.context_key.clone(),
            data_mode: snapshot.data_mode,
            progressive_mode: snapshot.progressive_mode,
            schema_mode: snapshot.schema_mode,
            elastic_mode: snapshot.elastic_mode,
            subscriber_mode: snapshot.subscriber_mode,
            filename: snapshot.filename.clone(),
            modified: snapshot.modified,
            importers: Vec::new(),
            segments: Vec::new(),
        }
    }

    /// Wrap into the shared handle used across a run.
    pub fn into_shared(self) -> SharedConfiguration {
        Arc::new(RwLock::new(self))
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Identity once persisted; assigned on first save, stable thereafter.
    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = Some(filename.into());
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    /// Stamp the current time into the modification marker.
    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }

    pub fn data_mode(&self) -> DataMode {
        self.data_mode
    }

    pub fn progressive_mode(&self) -> ProgressiveMode {
        self.progressive_mode
    }

    pub fn schema_mode(&self) -> SchemaMode {
        self.schema_mode
    }

    pub fn elastic_mode(&self) -> ElasticMode {
        self.elastic_mode
    }

    pub fn subscriber_mode(&self) -> SubscriberMode {
        self.subscriber_mode
    }

    /// Set the data mode. Wipe destroys prior data, so it forces schema
    /// creation.
    pub fn set_data_mode(&mut self, mode: DataMode) {
        self.data_mode = mode;
        if mode == DataMode::Wipe {
            self.set_schema_mode(SchemaMode::Create);
        }
        self.touch();
    }

    pub fn set_progressive_mode(&mut self, mode: ProgressiveMode) {
        self.progressive_mode = mode;
        self.touch();
    }

    pub fn set_schema_mode(&mut self, mode: SchemaMode) {
        self.schema_mode = mode;
        self.touch();
    }

    pub fn set_elastic_mode(&mut self, mode: ElasticMode) {
        self.elastic_mode = mode;
        self.touch();
    }

    pub fn set_subscriber_mode(&mut self, mode: SubscriberMode) {
        self.subscriber_mode = mode;
        self.touch();
    }

    pub fn should_wipe(&self) -> bool {
        self.data_mode == DataMode::Wipe
    }

    pub fn should_populate(&self) -> bool {
        self.elastic_mode == ElasticMode::Full
    }

    pub fn should_run_subscribers(&self) -> bool {
        self.subscriber_mode == SubscriberMode::Full
    }

    /// Register an importer and all of its segments. Idempotent by key:
    /// re-registering an existing importer is a no-op, and segments already
    /// present are not duplicated. New segments start disabled.
    pub fn add_importer(&mut self, importer: Arc<dyn Importer>) {
        if self.has_importer(importer.key()) {
            debug!(key = importer.key(), "importer already registered");
            return;
        }
        let importer_key = importer.key().to_string();
        for segment in importer.segments() {
            if !self.has_segment(segment.key()) {
                self.segments.push(SegmentEntry {
                    importer_key: importer_key.clone(),
                    segment,
                    toggle: Toggle::disabled(),
                });
            }
        }
        self.importers.push(ImporterEntry {
            importer,
            toggle: Toggle::enabled(),
        });
    }

    pub fn has_importer(&self, key: &str) -> bool {
        self.importers.iter().any(|e| e.importer.key() == key)
    }

    pub fn has_segment(&self, key: &str) -> bool {
        self.segments.iter().any(|e| e.segment.key() == key)
    }

    /// Retrieve a registered importer by key.
    pub fn importer(&self, key: &str) -> Result<Arc<dyn Importer>> {
        self.importers
            .iter()
            .find(|e| e.importer.key() == key)
            .map(|e| Arc::clone(&e.importer))
            .ok_or_else(|| ImportError::importer_not_found(key))
    }

    /// Retrieve a registered segment by key, regardless of its importer's
    /// state.
    pub fn segment(&self, key: &str) -> Result<Arc<dyn Segment>> {
        self.segments
            .iter()
            .find(|e| e.segment.key() == key)
            .map(|e| Arc::clone(&e.segment))
            .ok_or_else(|| ImportError::segment_not_found(key))
    }

    /// Key of the importer owning a segment.
    pub fn segment_owner(&self, key: &str) -> Result<&str> {
        self.segments
            .iter()
            .find(|e| e.segment.key() == key)
            .map(|e| e.importer_key.as_str())
            .ok_or_else(|| ImportError::segment_not_found(key))
    }

    pub fn importer_enabled(&self, key: &str) -> Result<bool> {
        self.importers
            .iter()
            .find(|e| e.importer.key() == key)
            .map(|e| e.toggle.is_enabled())
            .ok_or_else(|| ImportError::importer_not_found(key))
    }

    pub fn segment_enabled(&self, key: &str) -> Result<bool> {
        self.segments
            .iter()
            .find(|e| e.segment.key() == key)
            .map(|e| e.toggle.is_enabled())
            .ok_or_else(|| ImportError::segment_not_found(key))
    }

    /// Flip an importer's enabled bit and cascade the new state to every
    /// segment it owns. Returns the new state.
    pub fn toggle_importer(&mut self, key: &str) -> Result<bool> {
        let entry = self
            .importers
            .iter_mut()
            .find(|e| e.importer.key() == key)
            .ok_or_else(|| ImportError::importer_not_found(key))?;
        let enabled = entry.toggle.toggle();
        for segment in self.segments.iter_mut().filter(|s| s.importer_key == key) {
            segment.toggle.set(enabled);
        }
        self.touch();
        Ok(enabled)
    }

    /// Flip a single segment's enabled bit, independent of its importer's
    /// state. Returns the new state.
    pub fn toggle_segment(&mut self, key: &str) -> Result<bool> {
        let entry = self
            .segments
            .iter_mut()
            .find(|e| e.segment.key() == key)
            .ok_or_else(|| ImportError::segment_not_found(key))?;
        let enabled = entry.toggle.toggle();
        self.touch();
        Ok(enabled)
    }

    /// Set an importer's bit directly, without cascading. Used by snapshot
    /// restoration.
    pub fn set_importer_enabled(&mut self, key: &str, enabled: bool) -> Result<()> {
        let entry = self
            .importers
            .iter_mut()
            .find(|e| e.importer.key() == key)
            .ok_or_else(|| ImportError::importer_not_found(key))?;
        entry.toggle.set(enabled);
        Ok(())
    }

    /// Set a segment's bit directly. Used by the factory and by snapshot
    /// restoration.
    pub fn set_segment_enabled(&mut self, key: &str, enabled: bool) -> Result<()> {
        let entry = self
            .segments
            .iter_mut()
            .find(|e| e.segment.key() == key)
            .ok_or_else(|| ImportError::segment_not_found(key))?;
        entry.toggle.set(enabled);
        Ok(())
    }

    /// Registered importers in registration order. `all = false` filters to
    /// enabled-only; this ordering determines execution order.
    pub fn importers(&self, all: bool) -> Vec<Arc<dyn Importer>> {
        self.importers
            .iter()
            .filter(|e| all || e.toggle.is_enabled())
            .map(|e| Arc::clone(&e.importer))
            .collect()
    }

    /// Registered segments in registration order. `all = false` filters to
    /// enabled-only.
    pub fn segments(&self, all: bool) -> Vec<Arc<dyn Segment>> {
        self.segments
            .iter()
            .filter(|e| all || e.toggle.is_enabled())
            .map(|e| Arc::clone(&e.segment))
            .collect()
    }

    /// Importer keys with their enabled bits, in registration order.
    pub fn importer_states(&self) -> Vec<ToggleState> {
        self.importers
            .iter()
            .map(|e| ToggleState {
                key: e.importer.key().to_string(),
                enabled: e.toggle.is_enabled(),
            })
            .collect()
    }

    /// Segment keys with their enabled bits, in registration order.
    pub fn segment_states(&self) -> Vec<ToggleState> {
        self.segments
            .iter()
            .map(|e| ToggleState {
                key: e.segment.key().to_string(),
                enabled: e.toggle.is_enabled(),
            })
            .collect()
    }

    /// The plain serializable snapshot persisted by the durable store.
    pub fn snapshot(&self) -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            context_key: self.context_key.clone(),
            data_mode: self.data_mode,
            progressive_mode: self.progressive_mode,
            schema_mode: self.schema_mode,
            elastic_mode: self.elastic_mode,
            subscriber_mode: self.subscriber_mode,
            filename: self.filename.clone(),
            modified: self.modified,
            importers: self.importer_states(),
            segments: self.segment_states(),
        }
    }
}
