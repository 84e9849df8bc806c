//! Install command - install dependencies of components already present.

use super::batch_exit_code;
use crate::error::CliError;
use crate::output;
use crate::runner::CliRunner;
use crate::GlobalArgs;

/// Run the install command.
pub fn run(args: &GlobalArgs) -> Result<i32, CliError> {
    let runner = CliRunner::new(args)?;
    runner.log_startup("install");

    println!("forgeup v{}", forgeup::VERSION);
    println!(
        "Installing requirements under {} with {}",
        runner.config().custom_nodes_dir().display(),
        runner.config().python.display()
    );
    println!();

    let provisioner = runner.provisioner()?;
    let report = runner.block_on(provisioner.install_dependencies());

    output::print_batch(&report);
    Ok(batch_exit_code(&[&report]))
}
