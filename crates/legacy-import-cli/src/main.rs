//! legacy-import CLI - configurable batch import of legacy data.

mod registry;
mod wizard;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use legacy_import::{ImportError, ImportOutcome, LoopExecutor, Manager, Phase};

#[derive(Parser)]
#[command(name = "legacy-import")]
#[command(about = "Imports legacy data under a stored configuration")]
#[command(version)]
struct Cli {
    /// Phase to execute: all, configuration, setup, import or teardown.
    /// `all` runs every phase in declaration order.
    #[arg(default_value = "all")]
    action: String,

    /// Skip interactive prompts and use the most recently modified stored
    /// configuration
    #[arg(long)]
    assume: bool,

    /// Path to the runtime deployment config
    #[arg(short, long, default_value = "import.yaml")]
    config: PathBuf,

    /// Override the stored-configuration directory
    #[arg(long)]
    storage_path: Option<PathBuf>,

    /// Output the import result as JSON
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ImportError> {
    let cli = Cli::parse();

    // Validate the action before any setup work.
    let phases: Vec<Phase> = if cli.action == "all" {
        Phase::ALL.to_vec()
    } else {
        match Phase::from_name(&cli.action) {
            Some(phase) => vec![phase],
            None => {
                return Err(ImportError::InvalidArgument(format!(
                    "unknown action `{}` (expected all, configuration, setup, import or teardown)",
                    cli.action
                )))
            }
        }
    };

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(ImportError::InvalidConfiguration)?;

    let mut runtime = registry::RuntimeConfig::load(&cli.config)?;
    if let Some(path) = cli.storage_path {
        runtime.storage_path = path;
    }
    let mut manager = runtime.build_manager().await?;
    info!(config = %cli.config.display(), "runtime configuration loaded");

    let executor = LoopExecutor::new();
    let mut outcome: Option<ImportOutcome> = None;

    for phase in phases {
        match phase {
            Phase::Configuration => {
                if !run_configuration_phase(&mut manager, cli.assume)? {
                    println!("Import not started.");
                    return Ok(());
                }
            }
            Phase::Setup => {
                legacy_import::runner::set_up(&manager, &executor).await?;
            }
            Phase::Import => {
                outcome = Some(legacy_import::runner::run_import(&manager).await);
            }
            Phase::Teardown => {
                let reports = legacy_import::runner::tear_down(&manager, &executor).await;
                for report in &reports {
                    println!(
                        "  subscriber pass {}: {} counted, {} modified",
                        report.label, report.counted, report.modified
                    );
                }
            }
        }
    }

    if let Some(outcome) = outcome {
        if cli.output_json {
            println!("{}", outcome.to_json()?);
        } else {
            print_summary(&outcome);
        }
        if outcome.segments_failed > 0 {
            return Err(ImportError::Source(format!(
                "{} segment(s) failed: {}",
                outcome.segments_failed,
                outcome.failed_segments.join(", ")
            )));
        }
    }

    println!("Command complete.");
    Ok(())
}

/// Configuration phase. With `--assume`, auto-selects the most recently
/// modified stored configuration and skips every prompt. Returns whether
/// the run should proceed.
fn run_configuration_phase(manager: &mut Manager, assume: bool) -> Result<bool, ImportError> {
    if assume {
        let mut snapshots = manager.all()?;
        snapshots.sort_by(|a, b| b.modified.cmp(&a.modified));
        if let Some(filename) = snapshots.first().and_then(|s| s.filename.clone()) {
            manager.load(&filename)?;
            info!(filename = %filename, "assumed most recent configuration");
        } else {
            info!("no stored configuration; using defaults");
        }
        return Ok(true);
    }

    match wizard::configure(manager) {
        Ok(proceed) => Ok(proceed),
        Err(wizard::WizardError::Cancelled) => Ok(false),
        Err(wizard::WizardError::Engine(e)) => Err(e),
        Err(wizard::WizardError::Io(e)) => Err(ImportError::Io(e)),
    }
}

fn print_summary(outcome: &ImportOutcome) {
    println!("\nImport {}!", outcome.status);
    println!("  Duration: {:.2}s", outcome.duration_seconds);
    println!(
        "  Segments: {}/{}",
        outcome.segments_succeeded, outcome.segments_total
    );
    println!("  Counted: {}", outcome.records_counted);
    println!("  Modified: {}", outcome.records_modified);
    if !outcome.failed_segments.is_empty() {
        println!("  Failed segments: {:?}", outcome.failed_segments);
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
