//! Generic paginated execution loop.
//!
//! Every migration unit runs through the same driver, whether it is a
//! segment import pass, a schema-update pass or a teardown subscriber
//! pass: count the origin, page forward with retrieve, filter each item
//! through the modifier, persist the surviving batch, and account for
//! progress.
//!
//! The loop is purely forward-paging: it never re-queries consumed offsets
//! and offers no consistency guarantee against an origin mutated mid-scan.
//! Safe restart after a crash comes from upsert idempotency, not from the
//! loop itself.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::importer::Segment;
use crate::record::Record;

/// Default page size for loopable units.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// A unit of work drivable by the [`LoopExecutor`].
#[async_trait]
pub trait Loopable: Send + Sync {
    /// Count of items to process.
    async fn count(&self) -> Result<i64>;

    /// Fetch one page of items.
    async fn retrieve(&self, limit: usize, skip: i64) -> Result<Vec<Record>>;

    /// Per-item modifier. Returning `None` discards the item, an explicit
    /// skip signal, not an error.
    fn modify(&self, item: Record) -> Option<Record> {
        Some(item)
    }

    /// Persist a batch of modified items.
    async fn persist(&self, items: Vec<Record>) -> Result<()>;
}

/// How a loop run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// All pages were processed.
    Completed,

    /// The counter reported nothing to do. A normal, non-error termination.
    NothingToProcess,
}

/// Accounting for one loop run.
#[derive(Debug, Clone)]
pub struct LoopReport {
    /// Label of the unit that ran.
    pub label: String,

    /// Items reported by the counter (after subtracting the initial skip).
    pub counted: i64,

    /// Items that survived the modifier and were persisted.
    pub modified: i64,

    /// Number of retrieve/persist steps performed.
    pub steps: u32,

    /// Wall-clock duration of the run.
    pub elapsed: Duration,

    /// How the run ended.
    pub outcome: LoopOutcome,
}

impl LoopReport {
    fn nothing(label: &str) -> Self {
        LoopReport {
            label: label.to_string(),
            counted: 0,
            modified: 0,
            steps: 0,
            elapsed: Duration::ZERO,
            outcome: LoopOutcome::NothingToProcess,
        }
    }
}

/// The paginated count→retrieve→modify→persist driver.
#[derive(Debug, Clone)]
pub struct LoopExecutor {
    page_size: usize,
    skip: i64,
}

impl Default for LoopExecutor {
    fn default() -> Self {
        LoopExecutor {
            page_size: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }
}

impl LoopExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size for subsequent runs.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the initial offset for subsequent runs.
    pub fn with_skip(mut self, skip: i64) -> Self {
        self.skip = skip.max(0);
        self
    }

    /// Drive a unit to completion.
    ///
    /// `total = count() - skip`; a non-positive total reports "nothing to
    /// process" and returns without any retrieve or persist call. Otherwise
    /// the loop fetches `ceil(total / page_size)` pages at offsets
    /// `page_size * step + skip`, filters each page through the modifier,
    /// and persists the surviving items.
    pub async fn run(&self, unit: &dyn Loopable, label: &str) -> Result<LoopReport> {
        let started = Instant::now();
        let total = unit.count().await? - self.skip;

        if total <= 0 {
            info!(label, "nothing to process");
            return Ok(LoopReport::nothing(label));
        }

        info!(label, total, page_size = self.page_size, "processing");

        let mut remaining = total;
        let mut modified: i64 = 0;
        let mut steps: u32 = 0;

        while remaining > 0 {
            let offset = self.page_size as i64 * steps as i64 + self.skip;
            let items = unit.retrieve(self.page_size, offset).await?;
            let batch: Vec<Record> = items.into_iter().filter_map(|i| unit.modify(i)).collect();

            if !batch.is_empty() {
                modified += batch.len() as i64;
                unit.persist(batch).await?;
            }

            steps += 1;
            remaining -= self.page_size as i64;
            debug!(
                label,
                step = steps,
                processed = (total - remaining.max(0)),
                total,
                modified,
                "page complete"
            );
        }

        let elapsed = started.elapsed();
        info!(
            label,
            counted = total,
            modified,
            steps,
            elapsed_ms = elapsed.as_millis() as u64,
            "finished"
        );

        Ok(LoopReport {
            label: label.to_string(),
            counted: total,
            modified,
            steps,
            elapsed,
            outcome: LoopOutcome::Completed,
        })
    }
}

/// Adapter driving a [`Segment`] through the executor: count and retrieve
/// against the segment's source, transform as the modifier, persist through
/// the owning importer's persister.
pub struct SegmentUnit<'a> {
    segment: &'a dyn Segment,
}

impl<'a> SegmentUnit<'a> {
    pub fn new(segment: &'a dyn Segment) -> Self {
        SegmentUnit { segment }
    }
}

#[async_trait]
impl Loopable for SegmentUnit<'_> {
    async fn count(&self) -> Result<i64> {
        self.segment.count().await
    }

    async fn retrieve(&self, limit: usize, skip: i64) -> Result<Vec<Record>> {
        self.segment.retrieve(limit, skip).await
    }

    fn modify(&self, item: Record) -> Option<Record> {
        self.segment.transform(item)
    }

    async fn persist(&self, items: Vec<Record>) -> Result<()> {
        self.segment.persist(items).await
    }
}
