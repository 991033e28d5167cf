//! Configuration type definitions: mode enums, toggle state, snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};

/// Write-semantics policy for a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    /// Upsert onto existing target data.
    #[default]
    Overwrite,

    /// Append-only incremental import.
    Progressive,

    /// Destroy prior data, then raw inserts.
    Wipe,
}

impl DataMode {
    /// All members of the closed set, in wizard display order.
    pub fn variants() -> &'static [DataMode] {
        &[DataMode::Progressive, DataMode::Overwrite, DataMode::Wipe]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataMode::Overwrite => "overwrite",
            DataMode::Progressive => "progressive",
            DataMode::Wipe => "wipe",
        }
    }
}

impl std::fmt::Display for DataMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataMode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "overwrite" => Ok(DataMode::Overwrite),
            "progressive" => Ok(DataMode::Progressive),
            "wipe" => Ok(DataMode::Wipe),
            other => Err(ImportError::InvalidConfiguration(format!(
                "passed data mode \"{}\" is invalid",
                other
            ))),
        }
    }
}

/// Watermark strategy when [`DataMode::Progressive`] is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressiveMode {
    /// Resume from the highest imported legacy identifier.
    #[default]
    Id,

    /// Resume from the most recent imported timestamp.
    Date,
}

impl ProgressiveMode {
    pub fn variants() -> &'static [ProgressiveMode] {
        &[ProgressiveMode::Id, ProgressiveMode::Date]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressiveMode::Id => "id",
            ProgressiveMode::Date => "date",
        }
    }
}

impl std::fmt::Display for ProgressiveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProgressiveMode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "id" => Ok(ProgressiveMode::Id),
            "date" => Ok(ProgressiveMode::Date),
            other => Err(ImportError::InvalidConfiguration(format!(
                "passed progressive mode \"{}\" is invalid",
                other
            ))),
        }
    }
}

/// Target schema provisioning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMode {
    /// Leave the target schema untouched.
    #[default]
    None,

    /// Create indexes and constraints from scratch.
    Create,

    /// Refresh indexes and constraints in place.
    Update,
}

impl SchemaMode {
    pub fn variants() -> &'static [SchemaMode] {
        &[SchemaMode::None, SchemaMode::Create, SchemaMode::Update]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaMode::None => "none",
            SchemaMode::Create => "create",
            SchemaMode::Update => "update",
        }
    }
}

impl std::fmt::Display for SchemaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SchemaMode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(SchemaMode::None),
            "create" => Ok(SchemaMode::Create),
            "update" => Ok(SchemaMode::Update),
            other => Err(ImportError::InvalidConfiguration(format!(
                "passed schema mode \"{}\" is invalid",
                other
            ))),
        }
    }
}

/// Downstream search-population flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElasticMode {
    /// No search population requested.
    #[default]
    None,

    /// Request full search population after the run.
    Full,
}

impl ElasticMode {
    pub fn variants() -> &'static [ElasticMode] {
        &[ElasticMode::None, ElasticMode::Full]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ElasticMode::None => "none",
            ElasticMode::Full => "full",
        }
    }
}

impl std::fmt::Display for ElasticMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ElasticMode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ElasticMode::None),
            "full" => Ok(ElasticMode::Full),
            other => Err(ImportError::InvalidConfiguration(format!(
                "passed elastic mode \"{}\" is invalid",
                other
            ))),
        }
    }
}

/// Whether teardown consistency passes run after the main import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberMode {
    /// Skip teardown passes.
    #[default]
    None,

    /// Run every persister's subscriber pass per model type.
    Full,
}

impl SubscriberMode {
    pub fn variants() -> &'static [SubscriberMode] {
        &[SubscriberMode::None, SubscriberMode::Full]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberMode::None => "none",
            SubscriberMode::Full => "full",
        }
    }
}

impl std::fmt::Display for SubscriberMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriberMode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(SubscriberMode::None),
            "full" => Ok(SubscriberMode::Full),
            other => Err(ImportError::InvalidConfiguration(format!(
                "passed subscriber mode \"{}\" is invalid",
                other
            ))),
        }
    }
}

/// On/off capability for toggleable entities (importers, segments).
///
/// The enabled bits live in the configuration's registration entries, not
/// in the live service objects, so reloading a stored configuration can
/// restore them by key lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggle {
    enabled: bool,
}

impl Default for Toggle {
    fn default() -> Self {
        Toggle { enabled: true }
    }
}

impl Toggle {
    /// A toggle starting in the enabled state.
    pub fn enabled() -> Self {
        Toggle { enabled: true }
    }

    /// A toggle starting in the disabled state.
    pub fn disabled() -> Self {
        Toggle { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn set(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Flip the state, returning the new value.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }
}

/// Persisted on/off state for one importer or segment key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    pub key: String,
    pub enabled: bool,
}

/// Plain serializable snapshot of a [`Configuration`](super::Configuration).
///
/// This is what the durable store holds: mode enums, key sets with their
/// enabled bits in registration order, the identity filename and the
/// modification stamp. Live importer/segment/persister services are never
/// serialized; reconstruction re-binds them by key lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    pub context_key: String,
    pub data_mode: DataMode,
    pub progressive_mode: ProgressiveMode,
    pub schema_mode: SchemaMode,
    pub elastic_mode: ElasticMode,
    pub subscriber_mode: SubscriberMode,
    pub filename: Option<String>,
    pub modified: DateTime<Utc>,
    pub importers: Vec<ToggleState>,
    pub segments: Vec<ToggleState>,
}

impl ConfigurationSnapshot {
    /// Keys of enabled importers, in registration order.
    pub fn enabled_importer_keys(&self) -> Vec<&str> {
        self.importers
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.key.as_str())
            .collect()
    }

    /// Keys of enabled segments, in registration order.
    pub fn enabled_segment_keys(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.key.as_str())
            .collect()
    }
}
