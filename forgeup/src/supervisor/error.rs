//! Error types for the process supervisor.

use thiserror::Error;

/// Reasons a supervised run ends in FAILED.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The child reported a missing module that may not be installed.
    #[error("missing module {module} is not on the allow-list")]
    MissingDependency { module: String },

    /// Installing an allowed missing module failed.
    #[error("failed to install {package} for missing module {module}: {reason}")]
    RemediationFailed {
        module: String,
        package: String,
        reason: String,
    },

    /// The child exited with a failure status.
    #[error("server exited with {}", describe_exit(.code))]
    ProcessCrash { code: Option<i32> },

    /// The relaunch bound was reached.
    #[error("giving up after {restarts} restart(s)")]
    RetriesExhausted { restarts: u32 },

    /// The child could not be started.
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            SupervisorError::ProcessCrash { code: Some(2) }.to_string(),
            "server exited with exit code 2"
        );
        assert_eq!(
            SupervisorError::ProcessCrash { code: None }.to_string(),
            "server exited with a signal"
        );
        assert!(SupervisorError::MissingDependency {
            module: "evil".into()
        }
        .to_string()
        .contains("allow-list"));
    }
}
