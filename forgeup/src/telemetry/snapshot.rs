//! Point-in-time copies of provisioning counters.

use std::time::Duration;

use crate::report::Stage;

/// Counters for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSnapshot {
    pub stage: Stage,
    pub started: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes: u64,
}

impl StageSnapshot {
    /// Check if the stage saw any item at all.
    pub fn is_idle(&self) -> bool {
        self.started == 0 && self.skipped == 0
    }
}

/// Snapshot of every stage plus run uptime.
#[derive(Debug, Clone)]
pub struct TelemetrySnapshot {
    pub uptime: Duration,
    pub stages: [StageSnapshot; 4],
}

impl TelemetrySnapshot {
    /// Counters for a single stage.
    pub fn stage(&self, stage: Stage) -> &StageSnapshot {
        &self.stages[stage.index()]
    }

    /// Uptime as `1h 02m 03s`, `2m 03s` or `3s`.
    pub fn uptime_human(&self) -> String {
        let secs = self.uptime.as_secs();
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if h > 0 {
            format!("{}h {:02}m {:02}s", h, m, s)
        } else if m > 0 {
            format!("{}m {:02}s", m, s)
        } else {
            format!("{}s", s)
        }
    }

    /// Total bytes fetched, human readable.
    pub fn bytes_fetched_human(&self) -> String {
        format_bytes(self.stage(Stage::Fetch).bytes)
    }
}

/// Formats a byte count using binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
