//! `lr serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use lr_server::{run_server, server_config_from_config};

use super::{CommonArgs, load_config};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Directory of static files to serve (overrides config).
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let mut settings = self.common.cli_settings();
        settings.port = self.port;
        settings.static_dir = self.dir;
        let config = load_config(&self.common, &settings)?;

        output.field("Serving", config.static_resolved.dir.display());
        output.url(
            "Listening",
            &format!("http://{}:{}", config.server.host, config.server.port),
        );

        run_server(server_config_from_config(&config, false)).await?;

        Ok(())
    }
}
