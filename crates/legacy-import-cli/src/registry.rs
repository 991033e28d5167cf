//! Runtime deployment config: declares the importers, segments and sources
//! available to this installation, and builds the manager from them.
//!
//! The declarations are plumbing around the engine: every declared segment
//! is a generic table segment that pages its origin through the declared
//! source and persists records under its model type with the identity
//! transform.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use legacy_import::engine::AttributeType;
use legacy_import::{
    Criteria, DocumentPersister, FileConfigStore, FileEngine, ImportError, Importer, Manager,
    ModelSchema, Persister, Record, Result, Segment, Source, DEFAULT_PAGE_SIZE,
};

fn default_context() -> String {
    "default".to_string()
}

fn default_contexts() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_character_set() -> String {
    "UTF-8".to_string()
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_connections() -> u32 {
    4
}

fn default_storage_path() -> PathBuf {
    std::env::temp_dir().join("legacy-import/configs")
}

fn default_data_path() -> PathBuf {
    std::env::temp_dir().join("legacy-import/data")
}

/// Root runtime configuration, loaded from YAML.
#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Deployment context key.
    #[serde(default = "default_context")]
    pub context: String,

    /// Directory for stored configurations.
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Data directory for the file-backed target engine.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Payload coercion schemas per model type: field name → attribute type.
    #[serde(default)]
    pub schemas: BTreeMap<String, BTreeMap<String, String>>,

    /// Importer declarations.
    #[serde(default)]
    pub importers: Vec<ImporterSpec>,
}

/// One importer declaration.
#[derive(Debug, Deserialize)]
pub struct ImporterSpec {
    pub key: String,

    #[serde(default = "default_contexts")]
    pub contexts: Vec<String>,

    #[serde(default = "default_character_set")]
    pub character_set: String,

    pub source: SourceSpec,

    pub segments: Vec<SegmentSpec>,
}

/// Declared source connector.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
    Mysql {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
    Http {
        base_url: String,
    },
    Memory,
}

/// One segment declaration.
#[derive(Debug, Deserialize)]
pub struct SegmentSpec {
    pub key: String,

    /// Table, collection or endpoint at the source.
    pub origin: String,

    /// Target model type the records persist under.
    pub model_type: String,

    /// Equality criteria applied at the source.
    #[serde(default)]
    pub criteria: BTreeMap<String, serde_json::Value>,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl RuntimeConfig {
    /// Load and validate a runtime configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ImportError::InvalidConfiguration(format!(
                "cannot read runtime config {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: RuntimeConfig = serde_yaml::from_str(&content)
            .map_err(|e| ImportError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for importer in &self.importers {
            if importer.segments.is_empty() {
                return Err(ImportError::InvalidConfiguration(format!(
                    "importer `{}` declares no segments",
                    importer.key
                )));
            }
        }
        for (type_key, fields) in &self.schemas {
            for kind in fields.values() {
                parse_attribute_type(kind).ok_or_else(|| {
                    ImportError::InvalidConfiguration(format!(
                        "unknown attribute type `{}` in schema `{}`",
                        kind, type_key
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Build the manager: open the target engine and configuration store,
    /// connect declared sources, and inject one importer per declaration.
    pub async fn build_manager(&self) -> Result<Manager> {
        let mut engine = FileEngine::open(&self.data_path)?;
        for (type_key, fields) in &self.schemas {
            let mut schema = ModelSchema::new();
            for (field, kind) in fields {
                // Validated at load time.
                if let Some(kind) = parse_attribute_type(kind) {
                    schema = schema.attribute(field.as_str(), kind);
                }
            }
            engine = engine.with_schema(type_key.as_str(), schema);
        }
        let persister: Arc<dyn Persister> = Arc::new(DocumentPersister::new(Arc::new(engine)));

        let store = Arc::new(FileConfigStore::open(&self.storage_path)?);
        let mut manager = Manager::new(self.context.as_str(), store);

        for spec in &self.importers {
            let source = build_source(&spec.source).await?;
            let importer = TableImporter::from_spec(spec, source, Arc::clone(&persister));
            manager.add_importer(Arc::new(importer));
        }

        info!(
            context = %self.context,
            importers = self.importers.len(),
            "built import manager"
        );
        Ok(manager)
    }
}

fn parse_attribute_type(kind: &str) -> Option<AttributeType> {
    match kind {
        "string" => Some(AttributeType::String),
        "integer" => Some(AttributeType::Integer),
        "float" => Some(AttributeType::Float),
        "boolean" => Some(AttributeType::Boolean),
        "datetime" => Some(AttributeType::DateTime),
        "object" => Some(AttributeType::Object),
        _ => None,
    }
}

async fn build_source(spec: &SourceSpec) -> Result<Arc<dyn Source>> {
    Ok(match spec {
        SourceSpec::Mysql {
            url,
            max_connections,
        } => Arc::new(legacy_import::MySqlSource::connect(url, *max_connections).await?),
        SourceSpec::Http { base_url } => {
            Arc::new(legacy_import::HttpSource::new(base_url.as_str())?)
        }
        SourceSpec::Memory => Arc::new(legacy_import::MemorySource::new()),
    })
}

/// Declaration-driven importer over one source.
pub struct TableImporter {
    key: String,
    contexts: Vec<String>,
    character_set: String,
    segments: Vec<Arc<dyn Segment>>,
    persister: Arc<dyn Persister>,
    source: Arc<dyn Source>,
}

impl TableImporter {
    fn from_spec(spec: &ImporterSpec, source: Arc<dyn Source>, persister: Arc<dyn Persister>) -> Self {
        let segments = spec
            .segments
            .iter()
            .map(|s| {
                Arc::new(TableSegment::from_spec(
                    s,
                    Arc::clone(&source),
                    Arc::clone(&persister),
                )) as Arc<dyn Segment>
            })
            .collect();
        TableImporter {
            key: spec.key.clone(),
            contexts: spec.contexts.clone(),
            character_set: spec.character_set.clone(),
            segments,
            persister,
            source,
        }
    }
}

#[async_trait]
impl Importer for TableImporter {
    fn key(&self) -> &str {
        &self.key
    }

    fn character_set(&self) -> &str {
        &self.character_set
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
}

/// Declaration-driven segment: identity transform, offset paging over the
/// origin, persistence under the declared model type.
pub struct TableSegment {
    key: String,
    origin: String,
    model_type: String,
    criteria: Criteria,
    limit: usize,
    source: Arc<dyn Source>,
    persister: Arc<dyn Persister>,
}

impl TableSegment {
    fn from_spec(spec: &SegmentSpec, source: Arc<dyn Source>, persister: Arc<dyn Persister>) -> Self {
        let mut criteria = Criteria::new();
        for (path, value) in &spec.criteria {
            criteria = criteria.eq(path.clone(), value.clone());
        }
        TableSegment {
            key: spec.key.clone(),
            origin: spec.origin.clone(),
            model_type: spec.model_type.clone(),
            criteria,
            limit: spec.limit,
            source,
            persister,
        }
    }
}

#[async_trait]
impl Segment for TableSegment {
    fn key(&self) -> &str {
        &self.key
    }

    fn limit(&self) -> usize {
        self.limit
    }

    async fn count(&self) -> Result<i64> {
        self.source.count(&self.origin, &self.criteria).await
    }

    async fn retrieve(&self, limit: usize, skip: i64) -> Result<Vec<Record>> {
        self.source
            .retrieve(&self.origin, &self.criteria, &[], &[], limit, skip)
            .await
    }

    async fn persist(&self, items: Vec<Record>) -> Result<()> {
        self.persister
            .batch_insert(&self.model_type, items)
            .await
            .map(|_| ())
    }
}
