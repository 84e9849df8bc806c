//! Per-item outcomes and the aggregate report of a concurrent batch.
//!
//! Concurrent jobs never raise into their siblings. Each job produces a
//! [`JobOutcome`]; the stage folds them into one [`BatchReport`] whose counts
//! are the only meaningful result (completion order is unspecified).

use std::fmt;
use std::time::Duration;

/// Pipeline stage a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Model-weight asset downloads.
    Fetch,
    /// Component repository clones.
    Clone,
    /// Dependency manifest installs.
    Install,
    /// Supervised server launches.
    Launch,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 4] = [Stage::Fetch, Stage::Clone, Stage::Install, Stage::Launch];

    /// Short lowercase name used as the log field value.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Clone => "clone",
            Self::Install => "install",
            Self::Launch => "launch",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Fetch => 0,
            Self::Clone => 1,
            Self::Install => 2,
            Self::Launch => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tagged outcome of one job in a batch.
#[derive(Debug)]
pub enum JobOutcome<T, E> {
    /// The job did its work.
    Success(T),
    /// The destination already existed; nothing was done.
    Skipped,
    /// The job failed after exhausting its retries.
    Failure(E),
}

impl<T, E> JobOutcome<T, E> {
    /// Returns true for `Success` and `Skipped`.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }
}

/// A failed item with its rendered error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Human-readable item label (category/url, component name, manifest path).
    pub item: String,
    /// Rendered error message.
    pub reason: String,
}

/// Aggregate result of a concurrent batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Stage this batch ran in.
    pub stage: Stage,
    /// Number of items in the batch.
    pub total: usize,
    /// Items that did their work.
    pub succeeded: usize,
    /// Items skipped because their destination already existed.
    pub skipped: usize,
    /// Items that failed.
    pub failures: Vec<ItemFailure>,
    /// Bytes written (fetch stage only).
    pub bytes: u64,
    /// Wall-clock time of the whole batch.
    pub elapsed: Duration,
}

impl BatchReport {
    /// Creates an empty report for a batch of `total` items.
    pub fn new(stage: Stage, total: usize) -> Self {
        Self {
            stage,
            total,
            succeeded: 0,
            skipped: 0,
            failures: Vec::new(),
            bytes: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Folds one job outcome into the report.
    pub fn record<T, E: fmt::Display>(&mut self, item: impl Into<String>, outcome: &JobOutcome<T, E>) {
        match outcome {
            JobOutcome::Success(_) => self.succeeded += 1,
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Failure(e) => self.failures.push(ItemFailure {
                item: item.into(),
                reason: e.to_string(),
            }),
        }
    }

    /// Adds transferred bytes.
    pub fn add_bytes(&mut self, bytes: u64) {
        self.bytes += bytes;
    }

    /// Number of failed items.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Number of items that ended in a good state (done or already present).
    pub fn ok_count(&self) -> usize {
        self.succeeded + self.skipped
    }

    /// Check if any item failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Check if every item ended in a good state.
    pub fn is_complete(&self) -> bool {
        self.ok_count() == self.total && self.failures.is_empty()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} ok ({} done, {} skipped, {} failed) in {:.1}s",
            self.stage,
            self.ok_count(),
            self.total,
            self.succeeded,
            self.skipped,
            self.failed(),
            self.elapsed.as_secs_f64()
        )
    }
}
