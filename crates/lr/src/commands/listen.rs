//! `lr listen` command implementation.

use clap::Args;
use lr_server::{run_listener, server_config_from_config};

use super::{CommonArgs, load_config};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the listen command.
#[derive(Args, Debug)]
pub(crate) struct ListenArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Port to bind to (overrides config `server.listen_port`).
    #[arg(short, long)]
    port: Option<u16>,
}

impl ListenArgs {
    /// Execute the listen command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the listener fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let mut settings = self.common.cli_settings();
        settings.listen_port = self.port;
        let config = load_config(&self.common, &settings)?;

        let url = format!(
            "http://{}:{}{}",
            config.server.host, config.server.listen_port, config.reload.path
        );
        output.url("Subscribe", &url);
        if config.reload.serve_client_script {
            output.field("Add to your pages", format!("<script src=\"{url}\"></script>"));
        }

        run_listener(server_config_from_config(&config, true)).await?;

        Ok(())
    }
}
