//! Provisioning telemetry for observability and user feedback.
//!
//! Stages record item-level events into lock-free atomic counters. The CLI
//! takes a point-in-time snapshot for its summary. Nothing here influences
//! control flow.
//!
//! ```text
//! Fetch / Clone / Install / Launch ───► ProvisionMetrics ───► TelemetrySnapshot ───► CLI
//!                                       (atomic counters)     (point-in-time copy)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use forgeup::report::Stage;
//! use forgeup::telemetry::ProvisionMetrics;
//!
//! let metrics = ProvisionMetrics::new();
//! metrics.item_started(Stage::Fetch);
//! metrics.bytes_written(Stage::Fetch, 1_048_576);
//! metrics.item_succeeded(Stage::Fetch);
//!
//! let snapshot = metrics.snapshot();
//! println!("{} fetched", snapshot.stage(Stage::Fetch).succeeded);
//! ```

mod metrics;
mod snapshot;

pub use metrics::ProvisionMetrics;
pub use snapshot::{format_bytes, StageSnapshot, TelemetrySnapshot};
