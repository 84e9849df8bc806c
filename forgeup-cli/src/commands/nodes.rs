//! Nodes command - clone components and install their dependencies.

use std::path::Path;

use forgeup::manifest::Manifest;

use super::batch_exit_code;
use crate::error::CliError;
use crate::output;
use crate::runner::CliRunner;
use crate::GlobalArgs;

/// Run the nodes command.
pub fn run(args: &GlobalArgs, manifest: &Path) -> Result<i32, CliError> {
    let runner = CliRunner::new(args)?;
    runner.log_startup("nodes");
    let manifest = Manifest::from_path(manifest)?;

    println!("forgeup v{}", forgeup::VERSION);
    println!(
        "Provisioning {} component(s) into {}",
        manifest.len(),
        runner.config().custom_nodes_dir().display()
    );
    println!();

    let provisioner = runner.provisioner()?;
    let report = runner.block_on(provisioner.provision_components(&manifest));

    output::print_batch(&report.clone);
    output::print_batch(&report.install);
    output::print_session_summary(&provisioner.metrics().snapshot());
    Ok(batch_exit_code(&[&report.clone, &report.install]))
}
