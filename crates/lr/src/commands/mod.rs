//! CLI command implementations.

pub(crate) mod listen;
pub(crate) mod serve;

use std::path::PathBuf;

use clap::Args;
use lr_config::{CliSettings, Config};

use crate::error::CliError;
use crate::output::Output;

pub(crate) use listen::ListenArgs;
pub(crate) use serve::ServeArgs;

/// Options shared by every command.
#[derive(Args, Debug)]
pub(crate) struct CommonArgs {
    /// Path to configuration file (default: auto-discover livereload.toml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory to watch for changes (overrides config).
    #[arg(short, long)]
    pub watch: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long, env = "LR_HOST")]
    pub host: Option<String>,

    /// Subscribe path browsers connect to (overrides config).
    #[arg(long)]
    pub path: Option<String>,

    /// Enable verbose output (debug logs for every change and publish).
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Settings overriding the config file.
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.host.clone(),
            path: self.path.clone(),
            watch_root: self.watch.clone(),
            ..CliSettings::default()
        }
    }
}

/// Load config with `settings` applied and print the shared startup lines.
fn load_config(common: &CommonArgs, settings: &CliSettings) -> Result<Config, CliError> {
    let config = Config::load(common.config.as_deref(), Some(settings))?;
    if !config.watch_resolved.root.is_dir() {
        return Err(CliError::Validation(format!(
            "Watch directory does not exist: {}",
            config.watch_resolved.root.display()
        )));
    }

    let output = Output::new();
    if let Some(path) = &config.config_path {
        output.field("Config", path.display());
    }
    output.field("Watching", config.watch_resolved.root.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_settings_from_common_args() {
        let args = CommonArgs {
            config: None,
            watch: Some(PathBuf::from("site")),
            host: Some("0.0.0.0".to_owned()),
            path: Some("/__reload".to_owned()),
            verbose: false,
        };

        let settings = args.cli_settings();

        assert_eq!(settings.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(settings.path.as_deref(), Some("/__reload"));
        assert_eq!(settings.watch_root, Some(PathBuf::from("site")));
        assert_eq!(settings.port, None);
        assert_eq!(settings.static_dir, None);
    }
}
