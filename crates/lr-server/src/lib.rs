//! Live reload server.
//!
//! This crate reloads browser pages when files on disk change, without a
//! browser extension:
//! - A response-rewriting middleware appends a small client script to every
//!   HTML or plain-text response
//! - A watch loop turns debounced filesystem batches into one notification
//! - Notifications reach browsers over server-sent events
//!
//! # Modes
//!
//! - **Embedded** ([`run_server`]): serves a static directory with the
//!   middleware in front of it. The script subscribes to the URL the page
//!   was requested from.
//! - **Standalone** ([`run_listener`]): serves only the subscribe endpoint,
//!   for pages served by some other process.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use axum::{Router, routing::get};
//! use lr_server::live_reload::{ReloadOptions, Reloader};
//! use tokio_util::sync::CancellationToken;
//!
//! let reloader = Arc::new(Reloader::new(ReloadOptions::default()));
//! let app = reloader.attach(Router::new().route("/", get(|| async { "<p>hi</p>" })));
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn({
//!     let reloader = Arc::clone(&reloader);
//!     let cancel = cancel.clone();
//!     async move { reloader.watch("public", cancel).await }
//! });
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum router
//!    ▲                  │
//!    │                  ├─► live_reload middleware ──► downstream handler
//!    │                  │        (buffer, sniff, append script)
//!    │                  │
//!    └──── SSE ─────────┴─► subscribe path ◄── broadcast ◄── watch loop
//!                                                              │
//!                                                   lr-watch (notify)
//! ```

mod app;
mod error;
pub mod live_reload;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use lr_watch::FsWatcher;
use tokio_util::sync::CancellationToken;

pub use error::ServerError;
use live_reload::{ReloadOptions, Reloader};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory served in embedded mode.
    pub static_dir: PathBuf,
    /// Directory watched for changes.
    pub watch_root: PathBuf,
    /// Include globs (empty reports every change).
    pub watch_patterns: Vec<String>,
    /// Ignore globs.
    pub watch_ignore: Vec<String>,
    /// Quiet window that closes a change batch.
    pub debounce: Duration,
    /// Reload service settings.
    pub reload: ReloadOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
            static_dir: PathBuf::from("public"),
            watch_root: PathBuf::from("."),
            watch_patterns: Vec::new(),
            watch_ignore: Vec::new(),
            debounce: lr_watch::DEFAULT_DEBOUNCE,
            reload: ReloadOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Socket address from host and port.
    pub fn addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(SocketAddr::from_str(&format!(
            "{}:{}",
            self.host, self.port
        ))?)
    }

    fn watcher(&self) -> Result<FsWatcher, ServerError> {
        Ok(FsWatcher::new(&self.watch_root)
            .with_patterns(&self.watch_patterns)?
            .with_ignore(&self.watch_ignore)?
            .with_debounce(self.debounce))
    }
}

/// Run the embedded server: static files with live reload.
///
/// Serves `static_dir`, injects the client into pages and publishes changes
/// under `watch_root`. Stops on Ctrl-C or when the watcher fails.
///
/// # Errors
///
/// Returns an error if the server cannot bind or the watcher fails.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let addr = config.addr()?;
    let watcher = config.watcher()?;
    let reloader = Arc::new(Reloader::new(config.reload.clone()));
    let app = app::create_router(&reloader, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, static_dir = %config.static_dir.display(), "Starting server");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let serve = async {
        let shutdown = {
            let cancel = cancel.clone();
            let reloader = Arc::clone(&reloader);
            async move {
                cancel.cancelled().await;
                reloader.close();
            }
        };
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;
        cancel.cancel();
        result.map_err(ServerError::from)
    };

    tokio::try_join!(watch(&reloader, &watcher, &cancel), serve)?;
    Ok(())
}

/// Run the standalone listener: only the subscribe endpoint.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the watcher fails.
pub async fn run_listener(config: ServerConfig) -> Result<(), ServerError> {
    let addr = config.addr()?;
    let watcher = config.watcher()?;
    let reloader = Arc::new(Reloader::new(config.reload.clone()));

    tracing::info!(address = %addr, path = %reloader.path(), "Starting listener");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let serve = async {
        let result = reloader.listen_and_serve(addr, cancel.clone()).await;
        cancel.cancel();
        result
    };

    tokio::try_join!(watch(&reloader, &watcher, &cancel), serve)?;
    Ok(())
}

/// Watch loop that stops the server when it ends.
async fn watch(
    reloader: &Reloader,
    watcher: &FsWatcher,
    cancel: &CancellationToken,
) -> Result<(), ServerError> {
    let result = reloader.watch_with(watcher, cancel.clone()).await;
    cancel.cancel();
    Ok(result?)
}

/// Cancel `cancel` on Ctrl-C.
async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "Failed to install Ctrl+C handler");
                return;
            }
            tracing::info!("Shutdown signal received, stopping server...");
            cancel.cancel();
        }
        () = cancel.cancelled() => {}
    }
}

/// Create server configuration from the loaded config file.
///
/// # Arguments
///
/// * `config` - Loaded configuration
/// * `standalone` - Use the standalone listener port instead of the server port
#[must_use]
pub fn server_config_from_config(config: &lr_config::Config, standalone: bool) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: if standalone {
            config.server.listen_port
        } else {
            config.server.port
        },
        static_dir: config.static_resolved.dir.clone(),
        watch_root: config.watch_resolved.root.clone(),
        watch_patterns: config.watch_resolved.patterns.clone(),
        watch_ignore: config.watch_resolved.ignore.clone(),
        debounce: config.watch_resolved.debounce(),
        reload: ReloadOptions::from(&config.reload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_addr() {
        let config = ServerConfig::default();

        assert_eq!(config.addr().unwrap(), "127.0.0.1:3000".parse().unwrap());
    }

    #[test]
    fn test_invalid_host_is_addr_error() {
        let config = ServerConfig {
            host: "not a host".to_owned(),
            ..ServerConfig::default()
        };

        assert!(matches!(config.addr(), Err(ServerError::Addr(_))));
    }

    #[test]
    fn test_invalid_watch_pattern_is_watch_error() {
        let config = ServerConfig {
            watch_patterns: vec!["[unclosed".to_owned()],
            ..ServerConfig::default()
        };

        assert!(matches!(config.watcher(), Err(ServerError::Watch(_))));
    }

    #[test]
    fn test_server_config_from_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("livereload.toml");
        std::fs::write(&config_path, "[watch]\nignore = []\n").unwrap();
        let config = lr_config::Config::load(Some(&config_path), None).unwrap();

        let embedded = server_config_from_config(&config, false);
        let standalone = server_config_from_config(&config, true);

        assert_eq!(embedded.port, 3000);
        assert_eq!(standalone.port, 35729);
        assert_eq!(embedded.static_dir, temp_dir.path().join("public"));
        assert_eq!(embedded.watch_root, temp_dir.path());
        assert!(embedded.watch_ignore.is_empty());
        assert_eq!(embedded.debounce, Duration::from_millis(100));
        assert_eq!(embedded.reload, ReloadOptions::default());
    }
}
