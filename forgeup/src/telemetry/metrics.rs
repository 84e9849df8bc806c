//! Atomic per-stage counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::snapshot::{StageSnapshot, TelemetrySnapshot};
use crate::report::Stage;

#[derive(Debug, Default)]
struct StageCounters {
    started: AtomicU64,
    succeeded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
}

impl StageCounters {
    fn snapshot(&self, stage: Stage) -> StageSnapshot {
        StageSnapshot {
            stage,
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Shared counters for one provisioning run.
///
/// Cheap to update from any number of concurrent jobs; wrap in an `Arc` and
/// hand a clone to every stage.
#[derive(Debug)]
pub struct ProvisionMetrics {
    stages: [StageCounters; 4],
    started_at: Instant,
}

impl Default for ProvisionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisionMetrics {
    /// Creates zeroed counters; uptime starts now.
    pub fn new() -> Self {
        Self {
            stages: Default::default(),
            started_at: Instant::now(),
        }
    }

    fn counters(&self, stage: Stage) -> &StageCounters {
        &self.stages[stage.index()]
    }

    /// An item began running (after any skip check).
    pub fn item_started(&self, stage: Stage) {
        self.counters(stage).started.fetch_add(1, Ordering::Relaxed);
    }

    /// An item finished its work.
    pub fn item_succeeded(&self, stage: Stage) {
        self.counters(stage).succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// An item was skipped because its destination already existed.
    pub fn item_skipped(&self, stage: Stage) {
        self.counters(stage).skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// An item failed after exhausting its retries.
    pub fn item_failed(&self, stage: Stage) {
        self.counters(stage).failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes were written to a final destination.
    pub fn bytes_written(&self, stage: Stage, bytes: u64) {
        self.counters(stage).bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of all counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime: self.started_at.elapsed(),
            stages: Stage::ALL.map(|stage| self.counters(stage).snapshot(stage)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_metrics_are_zero() {
        let metrics = ProvisionMetrics::new();
        let snapshot = metrics.snapshot();
        for stage in Stage::ALL {
            let s = snapshot.stage(stage);
            assert_eq!(s.stage, stage);
            assert_eq!(s.started + s.succeeded + s.skipped + s.failed + s.bytes, 0);
        }
    }

    #[test]
    fn test_stages_are_counted_separately() {
        let metrics = ProvisionMetrics::new();

        metrics.item_started(Stage::Fetch);
        metrics.item_succeeded(Stage::Fetch);
        metrics.bytes_written(Stage::Fetch, 2048);
        metrics.item_skipped(Stage::Clone);
        metrics.item_failed(Stage::Install);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.stage(Stage::Fetch).succeeded, 1);
        assert_eq!(snapshot.stage(Stage::Fetch).bytes, 2048);
        assert_eq!(snapshot.stage(Stage::Clone).skipped, 1);
        assert_eq!(snapshot.stage(Stage::Install).failed, 1);
        assert_eq!(snapshot.stage(Stage::Launch).started, 0);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(ProvisionMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.item_succeeded(Stage::Install);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().stage(Stage::Install).succeeded, 800);
    }
}
