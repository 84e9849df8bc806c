//! Server process supervision.
//!
//! The supervisor launches the server, streams its merged output, and reacts
//! to two kinds of lines: startup markers (the server is healthy) and
//! missing-module reports. A missing module on the allow-list is installed
//! through a [`Remediator`] and the server is relaunched. Anything else
//! ends the run.
//!
//! ```text
//!               ┌───────────────┐   line   ┌────────────────┐
//!  LaunchSpec ─►│ ChildProcess  │─────────►│ LineClassifier │
//!               └───────────────┘          └───────┬────────┘
//!                      ▲                           │ MissingModule(m)
//!                      │ relaunch (≤ max)          ▼
//!               ┌──────┴────────┐  resolve  ┌────────────┐
//!               │  Remediator   │◄──────────│ AllowList  │
//!               └───────────────┘           └────────────┘
//! ```
//!
//! Relaunches are bounded by a [`RetryPolicy`](crate::retry::RetryPolicy);
//! an interrupt stops the child with SIGTERM and ends the run in COMPLETED.

mod allow_list;
mod child;
mod classifier;
mod error;
mod process;
mod remediation;
mod state;

pub use allow_list::{AllowList, DEFAULT_OPTIONAL_MODULES};
pub use child::{ChildProcess, LaunchSpec};
pub use classifier::{LineClassifier, LineEvent, DEFAULT_STARTUP_MARKERS};
pub use error::SupervisorError;
pub use process::ProcessSupervisor;
pub use remediation::Remediator;
pub use state::{RemediationEvent, SupervisorReport, SupervisorState};
