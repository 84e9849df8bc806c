//! forgeup CLI - Command-line interface
//!
//! Provisions a GPU generative-media server tree and supervises the server.
//!
//! Exit codes: 0 on success, 1 on provisioning or supervision failure,
//! 2 on configuration or manifest errors.

mod commands;
mod error;
mod output;
mod runner;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "forgeup")]
#[command(version = forgeup::VERSION)]
#[command(about = "Provision and supervise a GPU generative-media server", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command; each overrides its environment variable.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Server tree root (FORGEUP_BASE_DIR)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Interpreter of the shared environment (FORGEUP_PYTHON)
    #[arg(long, global = true)]
    pub python: Option<PathBuf>,

    /// Also write logs to <DIR>/forgeup.log (FORGEUP_LOG_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download model assets listed in a manifest
    Fetch {
        /// Asset manifest: {"category": ["url", ...]}
        #[arg(long)]
        manifest: PathBuf,
    },

    /// Clone component repositories and install their dependencies
    Nodes {
        /// Component manifest: {"name": ["mirror", ...]}
        #[arg(long)]
        manifest: PathBuf,
    },

    /// Install dependencies of the components already present
    Install,

    /// Launch and supervise the server
    Launch {
        /// Arguments passed through to the server
        #[arg(last = true)]
        server_args: Vec<String>,
    },

    /// Fetch assets and provision components, then launch the server
    Up {
        /// Asset manifest
        #[arg(long)]
        models: PathBuf,

        /// Component manifest
        #[arg(long)]
        nodes: PathBuf,

        /// Arguments passed through to the server
        #[arg(last = true)]
        server_args: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fetch { manifest } => commands::fetch::run(&cli.global, &manifest),
        Commands::Nodes { manifest } => commands::nodes::run(&cli.global, &manifest),
        Commands::Install => commands::install::run(&cli.global),
        Commands::Launch { server_args } => commands::launch::run(&cli.global, &server_args),
        Commands::Up {
            models,
            nodes,
            server_args,
        } => commands::up::run(
            &cli.global,
            commands::up::UpArgs {
                models,
                nodes,
                server_args,
            },
        ),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn report_error(error: &CliError) {
    tracing::error!(error = %error, "forgeup failed");
    eprintln!("{} {}", output::error_prefix(), error);
}
