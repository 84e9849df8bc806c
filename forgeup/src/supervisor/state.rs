//! Supervisor states, remediation records and the final report.

use std::fmt;

use super::error::SupervisorError;

/// Lifecycle state of the supervised server.
///
/// ```text
/// STARTING ──► RUNNING ──► HEALTHY
///    ▲            │           │
///    │            ├───────────┴──► MISSING_MODULE ──► (remediate) ──┐
///    │            └──────────────► CRASHED ─────────────────────────┤
///    └───────────────────────────── RESTARTING ◄────────────────────┘
///
/// terminal: COMPLETED, FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Healthy,
    MissingModule,
    Crashed,
    Restarting,
    Completed,
    Failed,
}

impl SupervisorState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Healthy => "HEALTHY",
            Self::MissingModule => "MISSING_MODULE",
            Self::Crashed => "CRASHED",
            Self::Restarting => "RESTARTING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One handled missing-module report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationEvent {
    /// Module named by the child.
    pub module: String,
    /// Package the allow-list resolved it to, if allowed.
    pub package: Option<String>,
    /// Whether the install succeeded. Always false when not allowed.
    pub installed: bool,
}

impl RemediationEvent {
    /// Check if the module was on the allow-list.
    pub fn allowed(&self) -> bool {
        self.package.is_some()
    }
}

/// Outcome of a supervised run.
#[derive(Debug)]
pub struct SupervisorReport {
    /// Terminal state reached.
    pub final_state: SupervisorState,
    /// Relaunches performed.
    pub restarts: u32,
    /// Remediations attempted, in order.
    pub remediations: Vec<RemediationEvent>,
    /// Whether any launch reached HEALTHY.
    pub healthy: bool,
    /// Why the run failed, when it did.
    pub error: Option<SupervisorError>,
}

impl SupervisorReport {
    /// Process exit code: 0 for COMPLETED, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.final_state {
            SupervisorState::Completed => 0,
            _ => 1,
        }
    }

    /// Check if the run ended cleanly.
    pub fn is_success(&self) -> bool {
        self.final_state == SupervisorState::Completed
    }
}
