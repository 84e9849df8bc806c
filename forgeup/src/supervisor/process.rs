//! The supervision loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::allow_list::AllowList;
use super::child::{ChildProcess, LaunchSpec};
use super::classifier::{LineClassifier, LineEvent};
use super::error::SupervisorError;
use super::remediation::Remediator;
use super::state::{RemediationEvent, SupervisorReport, SupervisorState};
use crate::config::{ForgeConfig, SupervisorSettings};
use crate::report::Stage;
use crate::retry::RetryPolicy;
use crate::telemetry::ProvisionMetrics;

/// Log a progress line every this many output lines.
const PROGRESS_EVERY: u64 = 20;

/// How one launch ended.
enum LaunchEnd {
    Interrupted,
    MissingModule(String),
    Exited(Option<i32>),
}

/// Launches the server and keeps it alive through allow-listed remediations.
pub struct ProcessSupervisor {
    launch: LaunchSpec,
    classifier: LineClassifier,
    allow_list: AllowList,
    remediator: Arc<dyn Remediator>,
    metrics: Arc<ProvisionMetrics>,
    relaunch: RetryPolicy,
    terminate_grace: Duration,
    echo: bool,
}

impl ProcessSupervisor {
    /// Create a supervisor for an arbitrary launch spec.
    pub fn new(
        launch: LaunchSpec,
        remediator: Arc<dyn Remediator>,
        metrics: Arc<ProvisionMetrics>,
    ) -> Self {
        let defaults = SupervisorSettings::default();
        Self {
            launch,
            classifier: LineClassifier::default(),
            allow_list: AllowList::default(),
            remediator,
            metrics,
            relaunch: defaults.relaunch,
            terminate_grace: defaults.terminate_grace,
            echo: true,
        }
    }

    /// Create a supervisor running `<python> <entry>` in the server directory.
    pub fn from_config(
        config: &ForgeConfig,
        remediator: Arc<dyn Remediator>,
        metrics: Arc<ProvisionMetrics>,
    ) -> Self {
        let settings = &config.supervisor;
        let launch = LaunchSpec::new(&config.python, config.server_dir())
            .base_arg(&settings.server_entry);
        Self::new(launch, remediator, metrics)
            .with_allow_list(AllowList::default().with_extra(&settings.extra_modules))
            .with_relaunch(settings.relaunch.clone())
            .with_terminate_grace(settings.terminate_grace)
    }

    pub fn with_classifier(mut self, classifier: LineClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Bound relaunches with `policy`: its attempts count launches, its delay
    /// is the pause before each relaunch.
    pub fn with_relaunch(mut self, policy: RetryPolicy) -> Self {
        self.relaunch = policy;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.relaunch = SupervisorSettings::relaunch_policy(max_restarts, self.relaunch.delay());
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.relaunch = RetryPolicy::fixed(self.relaunch.max_attempts(), delay);
        self
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Echo child output to stdout (on by default).
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Run the server until it exits, fails for good, or `cancel` fires.
    ///
    /// Relaunches (after remediation or a failed spawn) are bounded by the
    /// relaunch policy. A cancelled run ends in COMPLETED.
    pub async fn run(&self, args: &[String], cancel: CancellationToken) -> SupervisorReport {
        let mut run = RunState::default();

        loop {
            run.transition(SupervisorState::Starting);
            tracing::info!(
                launch = run.restarts + 1,
                max_launches = self.relaunch.max_attempts(),
                program = %self.launch.program.display(),
                dir = %self.launch.working_dir.display(),
                "Starting server"
            );
            self.metrics.item_started(Stage::Launch);

            let mut child = match ChildProcess::spawn(&self.launch, args) {
                Ok(child) => child,
                Err(e) => {
                    run.transition(SupervisorState::Crashed);
                    let error = SupervisorError::Spawn {
                        program: self.launch.program.display().to_string(),
                        reason: e.to_string(),
                    };
                    tracing::error!(error = %error, "Server failed to start");
                    let Some(delay) = self.next_relaunch(&run) else {
                        return self.finish(run, Some(error));
                    };
                    if !self.wait_before_restart(&mut run, delay, &cancel).await {
                        return self.finish(run, None);
                    }
                    continue;
                }
            };
            run.transition(SupervisorState::Running);
            tracing::debug!(pid = ?child.id(), "Server process started");

            match self.watch(&mut child, &mut run, &cancel).await {
                LaunchEnd::Interrupted => {
                    tracing::info!("Interrupt received, stopping server");
                    child.terminate(self.terminate_grace).await;
                    return self.finish(run, None);
                }
                LaunchEnd::Exited(Some(0)) => {
                    tracing::info!("Server exited cleanly");
                    return self.finish(run, None);
                }
                LaunchEnd::Exited(code) => {
                    run.transition(SupervisorState::Crashed);
                    return self.finish(run, Some(SupervisorError::ProcessCrash { code }));
                }
                LaunchEnd::MissingModule(module) => {
                    run.transition(SupervisorState::MissingModule);
                    child.terminate(self.terminate_grace).await;
                    drop(child);

                    if let Err(error) = self.remediate(&module, &mut run).await {
                        return self.finish(run, Some(error));
                    }
                    let Some(delay) = self.next_relaunch(&run) else {
                        let error = SupervisorError::RetriesExhausted {
                            restarts: run.restarts,
                        };
                        return self.finish(run, Some(error));
                    };
                    if !self.wait_before_restart(&mut run, delay, &cancel).await {
                        return self.finish(run, None);
                    }
                }
            }
        }
    }

    /// Stream the child's output until a decisive event.
    async fn watch(
        &self,
        child: &mut ChildProcess,
        run: &mut RunState,
        cancel: &CancellationToken,
    ) -> LaunchEnd {
        let started = Instant::now();
        let mut line_count: u64 = 0;

        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return LaunchEnd::Interrupted,
                line = child.next_line() => line,
            };
            let Some(line) = line else {
                break;
            };

            line_count += 1;
            if self.echo {
                println!("{}", line);
            }
            if line_count % PROGRESS_EVERY == 0 {
                tracing::debug!(
                    lines = line_count,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Server output progress"
                );
            }

            match self.classifier.classify(&line) {
                LineEvent::MissingModule(module) => {
                    tracing::warn!(
                        module = %module,
                        elapsed_secs = started.elapsed().as_secs_f64(),
                        "Server reported a missing module"
                    );
                    return LaunchEnd::MissingModule(module);
                }
                LineEvent::StartupComplete if run.state != SupervisorState::Healthy => {
                    run.transition(SupervisorState::Healthy);
                    run.healthy = true;
                    tracing::info!(
                        elapsed_secs = started.elapsed().as_secs_f64(),
                        "Server is up"
                    );
                }
                _ => {}
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return LaunchEnd::Interrupted,
            status = child.wait() => status,
        };
        match status {
            Ok(status) => LaunchEnd::Exited(status.code()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to collect server exit status");
                LaunchEnd::Exited(None)
            }
        }
    }

    /// Install the missing module if it is allowed. Fails closed.
    async fn remediate(&self, module: &str, run: &mut RunState) -> Result<(), SupervisorError> {
        let Some(package) = self.allow_list.resolve(module) else {
            tracing::error!(module = %module, "Missing module is not on the allow-list");
            run.remediations.push(RemediationEvent {
                module: module.to_string(),
                package: None,
                installed: false,
            });
            return Err(SupervisorError::MissingDependency {
                module: module.to_string(),
            });
        };

        if self.next_relaunch(run).is_none() {
            return Ok(());
        }

        tracing::info!(module = %module, package = %package, "Installing missing module");
        let result = self.remediator.install(&package).await;
        run.remediations.push(RemediationEvent {
            module: module.to_string(),
            package: Some(package.clone()),
            installed: result.is_ok(),
        });

        result.map_err(|e| SupervisorError::RemediationFailed {
            module: module.to_string(),
            package,
            reason: e.to_string(),
        })
    }

    /// Pause before the next launch, or `None` once the policy is spent.
    fn next_relaunch(&self, run: &RunState) -> Option<Duration> {
        self.relaunch.delay_for_attempt(run.restarts + 1)
    }

    /// Count a restart and sleep; returns false if interrupted meanwhile.
    async fn wait_before_restart(
        &self,
        run: &mut RunState,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        run.restarts += 1;
        run.transition(SupervisorState::Restarting);
        tracing::info!(
            restart = run.restarts,
            max_launches = self.relaunch.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            "Restarting server"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn finish(&self, mut run: RunState, error: Option<SupervisorError>) -> SupervisorReport {
        let final_state = if error.is_some() {
            SupervisorState::Failed
        } else {
            SupervisorState::Completed
        };
        run.transition(final_state);

        match &error {
            None => {
                self.metrics.item_succeeded(Stage::Launch);
                tracing::info!(restarts = run.restarts, "Supervisor finished");
            }
            Some(e) => {
                self.metrics.item_failed(Stage::Launch);
                tracing::error!(restarts = run.restarts, error = %e, "Supervisor failed");
            }
        }

        SupervisorReport {
            final_state,
            restarts: run.restarts,
            remediations: run.remediations,
            healthy: run.healthy,
            error,
        }
    }
}

struct RunState {
    state: SupervisorState,
    restarts: u32,
    remediations: Vec<RemediationEvent>,
    healthy: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            state: SupervisorState::Starting,
            restarts: 0,
            remediations: Vec::new(),
            healthy: false,
        }
    }
}

impl RunState {
    fn transition(&mut self, next: SupervisorState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "Supervisor state");
        }
        self.state = next;
    }
}
