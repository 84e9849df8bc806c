//! Command implementations.
//!
//! Each command returns the process exit code on completion, or a
//! [`CliError`](crate::error::CliError) when it cannot run at all.

pub mod fetch;
pub mod install;
pub mod launch;
pub mod nodes;
pub mod up;

use crate::error::EXIT_FAILURE;
use forgeup::report::BatchReport;

/// Exit code for a set of batch results: 0 only if every item ended well.
pub fn batch_exit_code(reports: &[&BatchReport]) -> i32 {
    if reports.iter().all(|r| !r.has_failures()) {
        0
    } else {
        EXIT_FAILURE
    }
}
