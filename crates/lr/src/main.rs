//! lr CLI - Live reload server.
//!
//! Provides commands for:
//! - `serve`: Serve a static directory with live reload injected
//! - `listen`: Serve only the reload event stream for pages served elsewhere

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ListenArgs, ServeArgs};
use error::CliError;
use output::Output;

/// lr - Reload the browser when files change.
#[derive(Parser)]
#[command(name = "lr", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve static files with live reload.
    Serve(ServeArgs),
    /// Serve only the live reload event stream.
    Listen(ListenArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::Serve(args) => args.common.verbose,
            Self::Listen(args) => args.common.verbose,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables DEBUG level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.command.verbose() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(cli.command) {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    let rt = tokio::runtime::Runtime::new()?;
    match command {
        Commands::Serve(args) => rt.block_on(args.execute()),
        Commands::Listen(args) => rt.block_on(args.execute()),
    }
}
