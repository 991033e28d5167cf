//! Run phases: setup, main import, teardown.
//!
//! Phases are an explicit ordered list, executed in declaration order,
//! never discovered at runtime. Each enabled segment is an independent
//! unit of failure: a fatal segment aborts its own pass and the run moves
//! on to the next segment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::looper::{LoopExecutor, LoopOutcome, LoopReport, SegmentUnit};
use crate::manager::Manager;

/// The fixed phases of an import run, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Select, build or modify the configuration.
    Configuration,

    /// Schema updates and per-importer post-schema hooks.
    Setup,

    /// The main import pass over every enabled segment.
    Import,

    /// Subscriber consistency passes.
    Teardown,
}

impl Phase {
    /// Declaration order; `all` runs exactly this sequence.
    pub const ALL: [Phase; 4] = [
        Phase::Configuration,
        Phase::Setup,
        Phase::Import,
        Phase::Teardown,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Configuration => "configuration",
            Phase::Setup => "setup",
            Phase::Import => "import",
            Phase::Teardown => "teardown",
        }
    }

    pub fn from_name(name: &str) -> Option<Phase> {
        Phase::ALL.iter().copied().find(|p| p.name() == name)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal state of one segment's pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Completed,
    NothingToProcess,
    Failed,
}

/// Accounting for one segment's pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentReport {
    pub key: String,
    pub status: SegmentStatus,
    pub counted: i64,
    pub modified: i64,
    pub error: Option<String>,
}

impl SegmentReport {
    fn from_loop(key: &str, report: &LoopReport) -> Self {
        SegmentReport {
            key: key.to_string(),
            status: match report.outcome {
                LoopOutcome::Completed => SegmentStatus::Completed,
                LoopOutcome::NothingToProcess => SegmentStatus::NothingToProcess,
            },
            counted: report.counted,
            modified: report.modified,
            error: None,
        }
    }

    fn failed(key: &str, error: String) -> Self {
        SegmentReport {
            key: key.to_string(),
            status: SegmentStatus::Failed,
            counted: 0,
            modified: 0,
            error: Some(error),
        }
    }
}

/// Result of a main import pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    /// Final status.
    pub status: String,

    /// When the pass started.
    pub started_at: DateTime<Utc>,

    /// When the pass completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Segments driven.
    pub segments_total: usize,

    /// Segments that completed (including empty ones).
    pub segments_succeeded: usize,

    /// Segments that failed.
    pub segments_failed: usize,

    /// Records counted across all segments.
    pub records_counted: i64,

    /// Records persisted after transform filtering.
    pub records_modified: i64,

    /// Keys of failed segments.
    pub failed_segments: Vec<String>,

    /// Per-segment accounting.
    pub segments: Vec<SegmentReport>,
}

impl ImportOutcome {
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Setup phase: the manager's schema/hook tasks, then any loopable schema
/// pass a persister exposes.
pub async fn set_up(manager: &Manager, executor: &LoopExecutor) -> crate::error::Result<()> {
    info!("executing setup tasks");
    manager.set_up().await?;

    for persister in manager.distinct_persisters() {
        if let Some(looper) = persister.schema_looper() {
            executor.run(looper.as_ref(), "schema").await?;
        }
    }

    info!("setup tasks complete");
    Ok(())
}

/// Main import pass: every enabled segment in configuration order, each
/// through the loop executor at its own page size. A failed segment is
/// recorded and does not stop subsequent segments.
pub async fn run_import(manager: &Manager) -> ImportOutcome {
    let started_at = Utc::now();
    info!("starting import");

    let segments = {
        let configuration = manager.configuration();
        let config = configuration.read().expect("configuration lock poisoned");
        config.segments(false)
    };

    let mut reports = Vec::with_capacity(segments.len());
    for segment in &segments {
        let key = segment.key().to_string();
        info!(segment = %key, "started segment");

        let executor = LoopExecutor::new().with_page_size(segment.limit());
        let unit = SegmentUnit::new(segment.as_ref());
        match executor.run(&unit, &key).await {
            Ok(report) => {
                reports.push(SegmentReport::from_loop(&key, &report));
                info!(segment = %key, "finished segment");
            }
            Err(e) => {
                error!(segment = %key, error = %e, "segment failed");
                reports.push(SegmentReport::failed(&key, e.to_string()));
            }
        }
    }

    let completed_at = Utc::now();
    let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

    let segments_failed = reports
        .iter()
        .filter(|r| r.status == SegmentStatus::Failed)
        .count();
    let failed_segments: Vec<String> = reports
        .iter()
        .filter(|r| r.status == SegmentStatus::Failed)
        .map(|r| r.key.clone())
        .collect();

    let outcome = ImportOutcome {
        status: if segments_failed > 0 {
            "completed_with_failures".to_string()
        } else {
            "completed".to_string()
        },
        started_at,
        completed_at,
        duration_seconds,
        segments_total: reports.len(),
        segments_succeeded: reports.len() - segments_failed,
        segments_failed,
        records_counted: reports.iter().map(|r| r.counted).sum(),
        records_modified: reports.iter().map(|r| r.modified).sum(),
        failed_segments,
        segments: reports,
    };

    info!(
        segments = outcome.segments_total,
        failed = outcome.segments_failed,
        counted = outcome.records_counted,
        modified = outcome.records_modified,
        "import complete"
    );
    outcome
}

/// Teardown phase: when subscriber mode is full, every distinct persister's
/// subscriber pass runs per model type. Each pass is an independent unit of
/// failure.
pub async fn tear_down(manager: &Manager, executor: &LoopExecutor) -> Vec<LoopReport> {
    info!("executing teardown tasks");

    let (run_subscribers, populate) = {
        let configuration = manager.configuration();
        let config = configuration.read().expect("configuration lock poisoned");
        (config.should_run_subscribers(), config.should_populate())
    };

    let mut reports = Vec::new();
    if run_subscribers {
        for persister in manager.distinct_persisters() {
            for type_key in persister.model_types() {
                let Some(looper) = persister.subscriber_looper(&type_key) else {
                    continue;
                };
                match executor.run(looper.as_ref(), &type_key).await {
                    Ok(report) => reports.push(report),
                    Err(e) => {
                        error!(type_key = %type_key, error = %e, "subscriber pass failed");
                    }
                }
            }
        }
    }

    if populate {
        info!("full search population requested for downstream indexing");
    }

    info!(passes = reports.len(), "teardown tasks complete");
    reports
}
