//! Interactive configuration wizard.
//!
//! Walks the operator through selecting, building or modifying a stored
//! configuration: load/delete/create flows, mode prompts validated against
//! the closed enum sets, and importer/segment toggling.

use dialoguer::{Confirm, MultiSelect, Select};

use legacy_import::{
    ConfigurationSnapshot, DataMode, ElasticMode, ImportError, Manager, ProgressiveMode,
    SchemaMode, SubscriberMode,
};

/// Result type for wizard operations.
pub type WizardResult<T> = Result<T, WizardError>;

/// Errors that can occur during wizard execution.
#[derive(Debug)]
pub enum WizardError {
    /// User declined to start the import.
    Cancelled,
    /// Terminal/prompt error.
    Io(std::io::Error),
    /// Engine error (storage, configuration).
    Engine(ImportError),
}

impl std::fmt::Display for WizardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Configuration cancelled"),
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Engine(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for WizardError {}

impl From<dialoguer::Error> for WizardError {
    fn from(e: dialoguer::Error) -> Self {
        Self::Io(std::io::Error::other(e.to_string()))
    }
}

impl From<ImportError> for WizardError {
    fn from(e: ImportError) -> Self {
        Self::Engine(e)
    }
}

enum ConfigSelection {
    Existing(ConfigurationSnapshot),
    CreateNew,
}

/// Run the configuration phase interactively. Returns `Ok(true)` when the
/// operator confirmed the import should begin.
pub fn configure(manager: &mut Manager) -> WizardResult<bool> {
    println!();
    println!("Legacy Import - Configuration");
    println!("=============================");
    println!();

    loop {
        match select_configuration(manager)? {
            ConfigSelection::CreateNew => {
                manager.create();
                modify_configuration(manager)?;
                break;
            }
            ConfigSelection::Existing(snapshot) => {
                let delete = Confirm::new()
                    .with_prompt("Delete this configuration?")
                    .default(false)
                    .interact()?;
                if delete {
                    manager.delete_snapshot(&snapshot)?;
                    continue;
                }

                if let Some(filename) = &snapshot.filename {
                    manager.load(filename)?;
                }
                let modify = Confirm::new()
                    .with_prompt("Modify loaded configuration?")
                    .default(false)
                    .interact()?;
                if modify {
                    modify_configuration(manager)?;
                }
                break;
            }
        }
    }

    let begin = Confirm::new()
        .with_prompt("Begin import?")
        .default(false)
        .interact()?;
    Ok(begin)
}

fn describe(snapshot: &ConfigurationSnapshot) -> String {
    let importers = snapshot.enabled_importer_keys().join(", ");
    let segments = snapshot.enabled_segment_keys().join(", ");
    format!(
        "{} [{}] importers: {} | segments: {}",
        snapshot.filename.as_deref().unwrap_or("(unsaved)"),
        snapshot.data_mode,
        if importers.is_empty() { "-" } else { importers.as_str() },
        if segments.is_empty() { "-" } else { segments.as_str() },
    )
}

fn select_configuration(manager: &Manager) -> WizardResult<ConfigSelection> {
    let mut snapshots = manager.all()?;
    // Most recently modified first.
    snapshots.sort_by(|a, b| b.modified.cmp(&a.modified));

    let mut items: Vec<String> = snapshots.iter().map(describe).collect();
    items.push("Create new configuration".to_string());

    let choice = Select::new()
        .with_prompt("Load configuration")
        .items(&items)
        .default(items.len() - 1)
        .interact()?;

    if choice == snapshots.len() {
        Ok(ConfigSelection::CreateNew)
    } else {
        Ok(ConfigSelection::Existing(snapshots.swap_remove(choice)))
    }
}

fn select_mode<T: Copy + std::fmt::Display + PartialEq>(
    prompt: &str,
    variants: &[T],
    current: T,
) -> WizardResult<T> {
    let items: Vec<String> = variants.iter().map(|v| v.to_string()).collect();
    let default = variants.iter().position(|v| *v == current).unwrap_or(0);
    let choice = Select::new()
        .with_prompt(prompt)
        .items(&items)
        .default(default)
        .interact()?;
    Ok(variants[choice])
}

fn modify_configuration(manager: &mut Manager) -> WizardResult<()> {
    {
        let configuration = manager.configuration();
        let mut config = configuration.write().expect("configuration lock poisoned");

        let data_mode = select_mode("Data mode", DataMode::variants(), config.data_mode())?;
        config.set_data_mode(data_mode);

        if config.data_mode() == DataMode::Progressive {
            let mode = select_mode(
                "Progressive data mode",
                ProgressiveMode::variants(),
                config.progressive_mode(),
            )?;
            config.set_progressive_mode(mode);
        }

        // Wipe already forced schema creation.
        if config.data_mode() != DataMode::Wipe {
            let mode = select_mode("Schema mode", SchemaMode::variants(), config.schema_mode())?;
            config.set_schema_mode(mode);
        }

        let mode = select_mode(
            "Elastic mode",
            ElasticMode::variants(),
            config.elastic_mode(),
        )?;
        config.set_elastic_mode(mode);

        let mode = select_mode(
            "Subscriber mode",
            SubscriberMode::variants(),
            config.subscriber_mode(),
        )?;
        config.set_subscriber_mode(mode);
    }

    configure_importers(manager)?;
    configure_segments(manager)?;

    let save = Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?;
    if save {
        manager.save()?;
    }
    Ok(())
}

fn configure_importers(manager: &Manager) -> WizardResult<()> {
    let configuration = manager.configuration();

    let (keys, states): (Vec<String>, Vec<bool>) = {
        let config = configuration.read().expect("configuration lock poisoned");
        config
            .importer_states()
            .into_iter()
            .map(|s| (s.key, s.enabled))
            .unzip()
    };
    if keys.is_empty() {
        return Ok(());
    }

    let selected = MultiSelect::new()
        .with_prompt("Enabled importers (space toggles, enter confirms)")
        .items(&keys)
        .defaults(&states)
        .interact()?;

    let mut config = configuration.write().expect("configuration lock poisoned");
    for (index, key) in keys.iter().enumerate() {
        let wanted = selected.contains(&index);
        if wanted != config.importer_enabled(key).map_err(WizardError::from)? {
            config.toggle_importer(key).map_err(WizardError::from)?;
        }
    }

    let enabled: Vec<String> = config
        .importer_states()
        .into_iter()
        .filter(|s| s.enabled)
        .map(|s| s.key)
        .collect();
    println!("Importers to run: {}", enabled.join(", "));
    Ok(())
}

fn configure_segments(manager: &Manager) -> WizardResult<()> {
    let configuration = manager.configuration();

    let (keys, states): (Vec<String>, Vec<bool>) = {
        let config = configuration.read().expect("configuration lock poisoned");
        config
            .segment_states()
            .into_iter()
            .map(|s| (s.key, s.enabled))
            .unzip()
    };
    if keys.is_empty() {
        return Ok(());
    }

    let selected = MultiSelect::new()
        .with_prompt("Enabled segments (space toggles, enter confirms)")
        .items(&keys)
        .defaults(&states)
        .interact()?;

    let mut config = configuration.write().expect("configuration lock poisoned");
    for (index, key) in keys.iter().enumerate() {
        let wanted = selected.contains(&index);
        if wanted != config.segment_enabled(key).map_err(WizardError::from)? {
            config.toggle_segment(key).map_err(WizardError::from)?;
        }
    }

    let enabled: Vec<String> = config
        .segment_states()
        .into_iter()
        .filter(|s| s.enabled)
        .map(|s| s.key)
        .collect();
    println!("Segments to run: {}", enabled.join(", "));
    Ok(())
}
