//! Fetch command - download model assets.

use std::path::Path;

use forgeup::manifest::Manifest;

use super::batch_exit_code;
use crate::error::CliError;
use crate::output;
use crate::runner::CliRunner;
use crate::GlobalArgs;

/// Run the fetch command.
pub fn run(args: &GlobalArgs, manifest: &Path) -> Result<i32, CliError> {
    let runner = CliRunner::new(args)?;
    runner.log_startup("fetch");
    let manifest = Manifest::from_path(manifest)?;

    println!("forgeup v{}", forgeup::VERSION);
    println!(
        "Fetching {} asset(s) into {}",
        manifest.locator_count(),
        runner.config().models_dir().display()
    );
    println!();

    let provisioner = runner.provisioner()?;
    let report = runner.block_on(provisioner.fetch_assets(&manifest));

    output::print_batch(&report);
    output::print_session_summary(&provisioner.metrics().snapshot());
    Ok(batch_exit_code(&[&report]))
}
