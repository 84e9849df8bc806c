//! Up command - full pipeline, then supervise the server.

use std::path::PathBuf;

use forgeup::manifest::Manifest;

use crate::error::CliError;
use crate::output;
use crate::runner::CliRunner;
use crate::GlobalArgs;

/// Arguments for the up command.
pub struct UpArgs {
    pub models: PathBuf,
    pub nodes: PathBuf,
    pub server_args: Vec<String>,
}

/// Run the up command.
///
/// Stage failures are reported but do not prevent the launch; the exit code
/// is the supervisor's.
pub fn run(args: &GlobalArgs, up: UpArgs) -> Result<i32, CliError> {
    let runner = CliRunner::new(args)?;
    runner.log_startup("up");

    // Both manifests are validated before anything runs.
    let assets = Manifest::from_path(&up.models)?;
    let components = Manifest::from_path(&up.nodes)?;
    let cancel = runner.cancel_on_interrupt()?;

    println!("forgeup v{}", forgeup::VERSION);
    println!("==============");
    println!();
    println!("Base dir:   {}", runner.config().base_dir.display());
    println!("Assets:     {}", assets.locator_count());
    println!("Components: {}", components.len());
    println!();

    let provisioner = runner.provisioner()?;
    let report = runner.block_on(provisioner.up(&assets, &components, &up.server_args, cancel));

    println!();
    output::print_batch(&report.fetch);
    output::print_batch(&report.components.clone);
    output::print_batch(&report.components.install);
    output::print_supervisor(&report.launch);
    output::print_session_summary(&provisioner.metrics().snapshot());
    Ok(report.exit_code())
}
