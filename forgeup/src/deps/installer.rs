//! Manifest and single-package installation through `uv pip`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::OnceCell;

use super::constraints::{parse_show_version, reports_not_found, ConstraintSet};
use super::discovery::find_manifests;
use super::error::InstallError;
use crate::config::{ForgeConfig, ProtectedPackage};
use crate::exec::{CommandRunner, CommandSpec};
use crate::limiter::StageLimiter;
use crate::report::{BatchReport, ItemFailure, JobOutcome, Stage};
use crate::retry::{retry_until, RetryPolicy};
use crate::telemetry::ProvisionMetrics;

const UV: &str = "uv";

/// Installs component dependencies without disturbing the protected package.
pub struct DependencyInstaller {
    runner: Arc<dyn CommandRunner>,
    python: PathBuf,
    temp_dir: PathBuf,
    protected: ProtectedPackage,
    limiter: StageLimiter,
    retry: RetryPolicy,
    metrics: Arc<ProvisionMetrics>,
    constraints: OnceCell<ConstraintSet>,
}

impl DependencyInstaller {
    /// Create an installer for the configured interpreter.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        config: &ForgeConfig,
        metrics: Arc<ProvisionMetrics>,
    ) -> Self {
        Self {
            runner,
            python: config.python.clone(),
            temp_dir: config.temp_dir.clone(),
            protected: config.protected.clone(),
            limiter: StageLimiter::new(config.install.concurrency, Stage::Install.name()),
            retry: config.install.retry.clone(),
            metrics,
            constraints: OnceCell::new(),
        }
    }

    /// The constraint set of this run, snapshotted on first use.
    ///
    /// Once computed it never changes, even if installs alter the
    /// environment later in the run.
    pub async fn constraints(&self) -> Result<&ConstraintSet, InstallError> {
        self.constraints
            .get_or_try_init(|| async {
                let set = self.snapshot_protected().await?;
                set.write_to(&self.temp_dir).await
            })
            .await
    }

    async fn snapshot_protected(&self) -> Result<ConstraintSet, InstallError> {
        let package = &self.protected.name;
        let spec = self.uv_pip("show").arg(package);

        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| InstallError::ConstraintSnapshot {
                package: package.clone(),
                reason: format!("failed to run {}: {}", UV, e),
            })?;

        if !output.success() {
            if reports_not_found(&output.stderr) || reports_not_found(&output.stdout) {
                tracing::warn!(
                    package = %package,
                    "Protected package not installed, installing without constraints"
                );
                return Ok(ConstraintSet::empty());
            }
            return Err(InstallError::ConstraintSnapshot {
                package: package.clone(),
                reason: output.failure_summary(),
            });
        }

        let version =
            parse_show_version(&output.stdout).ok_or_else(|| InstallError::ConstraintSnapshot {
                package: package.clone(),
                reason: "no Version field in package metadata".to_string(),
            })?;
        tracing::info!(
            package = %package,
            version = %version,
            unpinned = ?self.protected.companions,
            "Pinned protected package"
        );
        Ok(ConstraintSet::pinned(package.clone(), version))
    }

    /// Install every non-empty `<base_dir>/*/requirements.txt`.
    ///
    /// Failures are reported per manifest and never abort the batch.
    pub async fn install_all(&self, base_dir: &Path) -> BatchReport {
        let started = Instant::now();

        let manifests = match find_manifests(base_dir).await {
            Ok(manifests) => manifests,
            Err(e) => {
                let mut report = BatchReport::new(Stage::Install, 1);
                self.record_failure(&mut report, base_dir.display().to_string(), &e);
                report.elapsed = started.elapsed();
                return report;
            }
        };

        let mut report = BatchReport::new(Stage::Install, manifests.len());
        if manifests.is_empty() {
            tracing::info!(stage = "install", dest = %base_dir.display(), "No requirements to install");
            return report;
        }

        let constraints = match self.constraints().await {
            Ok(constraints) => constraints,
            Err(e) => {
                for manifest in &manifests {
                    self.record_failure(&mut report, label(manifest, base_dir), &e);
                }
                report.elapsed = started.elapsed();
                return report;
            }
        };

        tracing::info!(
            stage = self.limiter.label(),
            manifests = manifests.len(),
            concurrency = self.limiter.permits(),
            "Installing requirements"
        );

        let results = join_all(manifests.iter().map(|manifest| async move {
            let item = label(manifest, base_dir);
            let outcome = self.install_manifest_with(manifest, &item, constraints).await;
            (item, outcome)
        }))
        .await;

        for (item, outcome) in &results {
            report.record(item.as_str(), outcome);
        }
        report.elapsed = started.elapsed();

        tracing::info!(stage = "install", "{}", report);
        report
    }

    /// Install one requirements file with the run's constraints.
    pub async fn install_manifest(&self, manifest: &Path) -> Result<(), InstallError> {
        let constraints = self.constraints().await?;
        let item = manifest.display().to_string();
        match self.install_manifest_with(manifest, &item, constraints).await {
            JobOutcome::Failure(e) => Err(e),
            _ => Ok(()),
        }
    }

    async fn install_manifest_with(
        &self,
        manifest: &Path,
        item: &str,
        constraints: &ConstraintSet,
    ) -> JobOutcome<(), InstallError> {
        let _permit = self.limiter.acquire().await;
        self.metrics.item_started(Stage::Install);

        let spec = self
            .uv_install(constraints)
            .arg("-r")
            .arg(manifest.as_os_str());

        let outcome = retry_until(
            &self.retry,
            |attempt| {
                tracing::debug!(stage = "install", item = %item, attempt, "Installing");
                self.run_install(&spec, item)
            },
            Result::is_ok,
        )
        .await;

        match outcome.value {
            Ok(()) => {
                tracing::info!(
                    stage = "install",
                    item = %item,
                    status = "success",
                    attempts = outcome.attempts,
                    "Installed"
                );
                self.metrics.item_succeeded(Stage::Install);
                JobOutcome::Success(())
            }
            Err(e) => {
                tracing::error!(
                    stage = "install",
                    item = %item,
                    status = "failure",
                    attempts = outcome.attempts,
                    error = %e,
                    "Install failed"
                );
                self.metrics.item_failed(Stage::Install);
                JobOutcome::Failure(e)
            }
        }
    }

    /// Install a single package under the run's constraints.
    ///
    /// Used for remediation; one attempt, no limiter.
    pub async fn install_package(&self, name: &str) -> Result<(), InstallError> {
        let name = name.trim();
        if name.is_empty() || name.starts_with('-') || name.chars().any(char::is_whitespace) {
            return Err(InstallError::InvalidPackage(name.to_string()));
        }

        let constraints = self.constraints().await?;
        let spec = self.uv_install(constraints).arg(name);

        tracing::info!(package = %name, "Installing package");
        let result = self.run_install(&spec, name).await;
        match &result {
            Ok(()) => tracing::info!(package = %name, status = "success", "Package installed"),
            Err(e) => tracing::error!(package = %name, status = "failure", error = %e, "Package install failed"),
        }
        result
    }

    async fn run_install(&self, spec: &CommandSpec, target: &str) -> Result<(), InstallError> {
        let failure = |reason: String| InstallError::Command {
            target: target.to_string(),
            reason,
        };
        match self.runner.run(spec).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(failure(output.failure_summary())),
            Err(e) => Err(failure(format!("failed to run {}: {}", UV, e))),
        }
    }

    fn uv_pip(&self, subcommand: &str) -> CommandSpec {
        let mut python = std::ffi::OsString::from("--python=");
        python.push(self.python.as_os_str());
        CommandSpec::new(UV)
            .args(["pip", subcommand])
            .arg(python)
            .env("TMPDIR", self.temp_dir.as_os_str())
    }

    fn uv_install(&self, constraints: &ConstraintSet) -> CommandSpec {
        let spec = self.uv_pip("install").arg("--no-cache");
        match constraints.path() {
            Some(path) => spec.arg("-c").arg(path.as_os_str()),
            None => spec,
        }
    }

    fn record_failure(&self, report: &mut BatchReport, item: String, error: &InstallError) {
        tracing::error!(stage = "install", item = %item, status = "failure", error = %error, "Install failed");
        self.metrics.item_failed(Stage::Install);
        report.failures.push(ItemFailure {
            item,
            reason: error.to_string(),
        });
    }
}

/// `<component>/requirements.txt`, relative to the base directory.
fn label(manifest: &Path, base_dir: &Path) -> String {
    manifest
        .strip_prefix(base_dir)
        .unwrap_or(manifest)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::discovery::REQUIREMENTS_FILE;
    use crate::exec::tests::MockRunner;
    use crate::exec::CommandOutput;
    use std::ffi::OsString;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Fixture {
        root: tempfile::TempDir,
        config: ForgeConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::TempDir::new().unwrap();
            let config = ForgeConfig::default()
                .with_base_dir(root.path().join("comfyui"))
                .with_temp_dir(root.path().join("tmp"))
                .with_python(PathBuf::from("/env/bin/python"))
                .with_retry_delay(Duration::ZERO);
            Self { root, config }
        }

        fn nodes(&self) -> PathBuf {
            self.config.custom_nodes_dir()
        }

        fn component(&self, name: &str, requirements: &str) {
            let dir = self.nodes().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(REQUIREMENTS_FILE), requirements).unwrap();
        }

        fn installer(&self, runner: Arc<MockRunner>) -> DependencyInstaller {
            DependencyInstaller::new(runner, &self.config, Arc::new(ProvisionMetrics::new()))
        }
    }

    fn is_show(spec: &CommandSpec) -> bool {
        spec.args.get(1).is_some_and(|a| a == "show")
    }

    fn arg_after(spec: &CommandSpec, flag: &str) -> Option<String> {
        let idx = spec.args.iter().position(|a| a == flag)?;
        spec.args.get(idx + 1).map(|a| a.to_string_lossy().into_owned())
    }

    fn torch_installed(version: &'static str) -> impl Fn(&CommandSpec) -> std::io::Result<CommandOutput> {
        move |spec| {
            if is_show(spec) {
                Ok(CommandOutput::ok(format!("Name: torch\nVersion: {}\n", version)))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }
    }

    #[tokio::test]
    async fn test_empty_manifest_is_not_attempted() {
        let f = Fixture::new();
        f.component("A", "numpy\n");
        f.component("B", "");
        let runner = Arc::new(MockRunner::new(torch_installed("2.1.0")));

        let report = f.installer(runner.clone()).install_all(&f.nodes()).await;

        assert_eq!(report.total, 1);
        assert_eq!(report.succeeded, 1);
        let installs: Vec<_> = runner.calls().into_iter().filter(|c| !is_show(c)).collect();
        assert_eq!(installs.len(), 1);
        assert_eq!(
            arg_after(&installs[0], "-r").map(PathBuf::from),
            Some(f.nodes().join("A").join(REQUIREMENTS_FILE))
        );
    }

    #[tokio::test]
    async fn test_every_install_carries_the_pin() {
        let f = Fixture::new();
        for name in ["A", "B", "C", "D"] {
            f.component(name, "some-package\n");
        }
        let runner = Arc::new(MockRunner::new(|spec| {
            if is_show(spec) {
                return Ok(CommandOutput::ok("Name: torch\nVersion: 2.3.1+cu121\n"));
            }
            let constraints = arg_after(spec, "-c").expect("constraints flag");
            let content = std::fs::read_to_string(constraints).unwrap();
            assert_eq!(content, "torch==2.3.1+cu121\n");
            Ok(CommandOutput::ok(""))
        }));
        let installer = f.installer(runner.clone());

        let report = installer.install_all(&f.nodes()).await;

        assert!(report.is_complete());
        let calls = runner.calls();
        assert_eq!(calls.iter().filter(|c| is_show(c)).count(), 1);
        let installs: Vec<_> = calls.iter().filter(|c| !is_show(c)).collect();
        assert_eq!(installs.len(), 4);
        for call in installs {
            assert_eq!(call.program, "uv");
            assert!(call.has_arg("--no-cache"));
            assert!(call.has_arg("--python=/env/bin/python"));
            assert!(call.env.contains(&(
                "TMPDIR".to_string(),
                OsString::from(f.root.path().join("tmp"))
            )));
        }
        assert_eq!(
            installer.constraints().await.unwrap().version_of("torch"),
            Some("2.3.1+cu121")
        );
    }

    #[tokio::test]
    async fn test_snapshot_is_taken_once_per_run() {
        let f = Fixture::new();
        f.component("A", "x\n");
        let shows = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&shows);
        let runner = Arc::new(MockRunner::new(move |spec| {
            if is_show(spec) {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let version = if n == 0 { "2.1.0" } else { "9.9.9" };
                return Ok(CommandOutput::ok(format!("Version: {}\n", version)));
            }
            Ok(CommandOutput::ok(""))
        }));
        let installer = f.installer(runner);

        installer.install_all(&f.nodes()).await;
        installer.install_package("kornia").await.unwrap();

        assert_eq!(shows.load(Ordering::SeqCst), 1);
        assert_eq!(
            installer.constraints().await.unwrap().version_of("torch"),
            Some("2.1.0")
        );
    }

    #[tokio::test]
    async fn test_missing_protected_package_installs_unpinned() {
        let f = Fixture::new();
        f.component("A", "x\n");
        let runner = Arc::new(MockRunner::new(|spec| {
            if is_show(spec) {
                Ok(CommandOutput::failed(1, "warning: Package(s) not found for: torch"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));

        let report = f.installer(runner.clone()).install_all(&f.nodes()).await;

        assert!(report.is_complete());
        let install = runner.calls().into_iter().find(|c| !is_show(c)).unwrap();
        assert!(!install.has_arg("-c"));
    }

    #[tokio::test]
    async fn test_failed_snapshot_fails_the_batch() {
        let f = Fixture::new();
        f.component("A", "x\n");
        f.component("B", "y\n");
        let runner = Arc::new(MockRunner::new(|spec| {
            if is_show(spec) {
                Ok(CommandOutput::failed(
                    2,
                    "error: No interpreter found for path `/env/bin/python`",
                ))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));
        let installer = f.installer(runner.clone());

        let report = installer.install_all(&f.nodes()).await;

        assert_eq!(report.failed(), 2);
        assert!(runner.calls().iter().all(is_show));
        assert!(report.failures[0].reason.contains("No interpreter found"));
        assert!(matches!(
            installer.install_package("kornia").await,
            Err(InstallError::ConstraintSnapshot { .. })
        ));
    }

    #[tokio::test]
    async fn test_snapshot_without_version_fails_the_batch() {
        let f = Fixture::new();
        f.component("A", "x\n");
        let runner = Arc::new(MockRunner::new(|spec| {
            if is_show(spec) {
                Ok(CommandOutput::ok("Name: torch\n"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));

        let report = f.installer(runner.clone()).install_all(&f.nodes()).await;

        assert_eq!(report.failed(), 1);
        assert!(runner.calls().iter().all(is_show));
    }

    #[tokio::test]
    async fn test_missing_uv_fails_every_manifest() {
        let f = Fixture::new();
        f.component("A", "x\n");
        f.component("B", "y\n");
        let runner = Arc::new(MockRunner::new(|_| {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "uv"))
        }));

        let report = f.installer(runner.clone()).install_all(&f.nodes()).await;

        assert_eq!(report.failed(), 2);
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_manifest_retried_and_isolated() {
        let f = Fixture::new();
        f.component("Bad", "broken-pkg\n");
        f.component("Good", "fine-pkg\n");
        let runner = Arc::new(MockRunner::new(|spec| {
            if is_show(spec) {
                return Ok(CommandOutput::ok("Version: 2.1.0\n"));
            }
            if arg_after(spec, "-r").is_some_and(|r| r.contains("Bad")) {
                Ok(CommandOutput::failed(1, "error: No solution found"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));

        let report = f.installer(runner.clone()).install_all(&f.nodes()).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].item, format!("Bad/{}", REQUIREMENTS_FILE));
        assert!(report.failures[0].reason.contains("No solution found"));
        // show + Good once + Bad twice
        assert_eq!(runner.call_count(), 4);
    }

    #[tokio::test]
    async fn test_install_package_uses_constraints() {
        let f = Fixture::new();
        let runner = Arc::new(MockRunner::new(torch_installed("2.1.0")));
        let installer = f.installer(runner.clone());

        installer.install_package("omegaconf").await.unwrap();

        let install = runner.calls().into_iter().find(|c| !is_show(c)).unwrap();
        assert_eq!(install.args.last(), Some(&OsString::from("omegaconf")));
        assert!(install.has_arg("-c"));
    }

    #[tokio::test]
    async fn test_install_package_rejects_options() {
        let f = Fixture::new();
        let runner = Arc::new(MockRunner::new(torch_installed("2.1.0")));
        let installer = f.installer(runner.clone());

        let err = installer.install_package("--index-url=http://evil").await.unwrap_err();
        assert!(matches!(err, InstallError::InvalidPackage(_)));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_components() {
        let f = Fixture::new();
        let runner = Arc::new(MockRunner::new(torch_installed("2.1.0")));
        let report = f.installer(runner.clone()).install_all(&f.nodes()).await;
        assert_eq!(report.total, 0);
        assert_eq!(runner.call_count(), 0);
    }
}
