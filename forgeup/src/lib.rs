//! forgeup - provisioning and supervision for a GPU generative-media server
//!
//! This library fetches model assets, materializes component repositories,
//! installs their dependencies around a pinned protected package, and keeps
//! the server process alive through allow-listed dependency remediation.

pub mod config;
pub mod deps;
pub mod exec;
pub mod fetch;
pub mod limiter;
pub mod logging;
pub mod manifest;
pub mod provision;
pub mod repo;
pub mod report;
pub mod retry;
pub mod supervisor;
pub mod telemetry;

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
