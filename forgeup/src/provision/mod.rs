//! Pipeline wiring.
//!
//! [`Provisioner`] owns one instance of every stage, built from a single
//! [`ForgeConfig`](crate::config::ForgeConfig), and shares one
//! [`ProvisionMetrics`](crate::telemetry::ProvisionMetrics) between them.
//!
//! ```text
//!   asset manifest ──► FetchEngine ─────────────────────────────┐
//!                                                                ├─► ProcessSupervisor
//!   component manifest ──► RepositoryMaterializer ──► Installer ─┘        │
//!                                                        ▲               │
//!                                                        └─ remediation ─┘
//! ```
//!
//! In [`Provisioner::up`] the fetch branch and the component branch run
//! concurrently; the server is launched once both have settled, whatever
//! their per-item results.

mod pipeline;

pub use pipeline::{ComponentsReport, Provisioner, UpReport};
