//! Launch command - start and supervise the server.

use crate::error::CliError;
use crate::output;
use crate::runner::CliRunner;
use crate::GlobalArgs;

/// Run the launch command.
pub fn run(args: &GlobalArgs, server_args: &[String]) -> Result<i32, CliError> {
    let runner = CliRunner::new(args)?;
    runner.log_startup("launch");
    let cancel = runner.cancel_on_interrupt()?;

    let config = runner.config();
    println!("forgeup v{}", forgeup::VERSION);
    println!(
        "Launching {} {} in {}",
        config.python.display(),
        config.supervisor.server_entry,
        config.server_dir().display()
    );
    println!("Press Ctrl+C to stop the server");
    println!();

    let provisioner = runner.provisioner()?;
    let report = runner.block_on(provisioner.launch(server_args, cancel));

    println!();
    output::print_supervisor(&report);
    Ok(report.exit_code())
}
