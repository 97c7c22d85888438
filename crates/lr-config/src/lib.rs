//! Configuration management for live reload.
//!
//! Parses `livereload.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! `server.host`, `reload.path`, `watch.root` and `static.dir` support
//! `${VAR}` and `${VAR:-default}`. The two directories also expand a
//! leading `~`.
//!
//! ## Example
//!
//! ```toml
//! [server]
//! port = 3000
//!
//! [reload]
//! path = "/livereload"
//! publish_empty_batches = false
//!
//! [watch]
//! root = "."
//! ignore = ["**/.git/**"]
//!
//! [static]
//! dir = "public"
//! ```

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override embedded server port.
    pub port: Option<u16>,
    /// Override standalone listener port.
    pub listen_port: Option<u16>,
    /// Override the subscribe path.
    pub path: Option<String>,
    /// Override the watch root.
    pub watch_root: Option<PathBuf>,
    /// Override the static file directory.
    pub static_dir: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "livereload.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Reload behaviour.
    pub reload: ReloadConfig,
    /// Watch configuration (paths are relative strings from TOML).
    watch: WatchConfigRaw,
    /// Static file configuration (paths are relative strings from TOML).
    #[serde(rename = "static")]
    static_files: StaticConfigRaw,

    /// Resolved watch configuration (set after loading).
    #[serde(skip)]
    pub watch_resolved: WatchConfig,
    /// Resolved static file configuration (set after loading).
    #[serde(skip)]
    pub static_resolved: StaticConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Port for `lr serve` (static files with embedded reload).
    pub port: u16,
    /// Port for `lr listen` (standalone reload side channel).
    pub listen_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
            listen_port: 35729,
        }
    }
}

/// Reload behaviour.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Path browsers subscribe to.
    pub path: String,
    /// Reconnect hint sent with every event, in milliseconds (0 disables).
    pub retry_ms: u64,
    /// Publish batches whose changes all cancelled out.
    pub publish_empty_batches: bool,
    /// Inject the client into responses with status >= 400.
    pub inject_error_responses: bool,
    /// Serve the client script at the subscribe path in standalone mode.
    pub serve_client_script: bool,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            path: "/livereload".to_owned(),
            retry_ms: 1000,
            publish_empty_batches: false,
            inject_error_responses: false,
            serve_client_script: false,
        }
    }
}

impl ReloadConfig {
    /// Reconnect hint, if enabled.
    #[must_use]
    pub fn retry(&self) -> Option<Duration> {
        (self.retry_ms > 0).then_some(Duration::from_millis(self.retry_ms))
    }
}

/// Raw watch configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct WatchConfigRaw {
    root: Option<String>,
    patterns: Option<Vec<String>>,
    ignore: Option<Vec<String>>,
    debounce_ms: Option<u64>,
}

/// Resolved watch configuration with absolute paths.
#[derive(Debug)]
pub struct WatchConfig {
    /// Directory to watch.
    pub root: PathBuf,
    /// Include globs (empty = everything).
    pub patterns: Vec<String>,
    /// Ignore globs.
    pub ignore: Vec<String>,
    /// Quiet window that closes a batch, in milliseconds.
    pub debounce_ms: u64,
}

impl WatchConfig {
    /// Quiet window as a duration.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            patterns: Vec::new(),
            ignore: default_ignore(),
            debounce_ms: 100,
        }
    }
}

fn default_ignore() -> Vec<String> {
    ["**/.git/**", "**/node_modules/**", "**/target/**"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Raw static file configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StaticConfigRaw {
    dir: Option<String>,
}

/// Resolved static file configuration.
#[derive(Debug, Default)]
pub struct StaticConfig {
    /// Directory served by `lr serve`.
    pub dir: PathBuf,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`LR_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a port to be non-zero.
fn require_port(port: u16, field: &str) -> Result<(), ConfigError> {
    // 0 would bind a random port the browser cannot know about
    if port == 0 {
        return Err(ConfigError::Validation(format!("{field} cannot be 0")));
    }
    Ok(())
}

/// Require every glob in the list to compile.
fn require_globs(patterns: &[String], field: &str) -> Result<(), ConfigError> {
    for pattern in patterns {
        glob::Pattern::new(pattern).map_err(|e| {
            ConfigError::Validation(format!("{field} has invalid glob {pattern:?}: {e}"))
        })?;
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `livereload.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails, or
    /// the resulting configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(listen_port) = settings.listen_port {
            self.server.listen_port = listen_port;
        }
        if let Some(path) = &settings.path {
            self.reload.path.clone_from(path);
        }
        if let Some(root) = &settings.watch_root {
            self.watch_resolved.root.clone_from(root);
        }
        if let Some(dir) = &settings.static_dir {
            self.static_resolved.dir.clone_from(dir);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            reload: ReloadConfig::default(),
            watch: WatchConfigRaw::default(),
            static_files: StaticConfigRaw::default(),
            watch_resolved: WatchConfig {
                root: base.to_path_buf(),
                ..WatchConfig::default()
            },
            static_resolved: StaticConfig {
                dir: base.join("public"),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file and after CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_reload()?;
        self.validate_watch()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        require_port(self.server.port, "server.port")?;
        require_port(self.server.listen_port, "server.listen_port")?;
        Ok(())
    }

    fn validate_reload(&self) -> Result<(), ConfigError> {
        let path = &self.reload.path;
        if !path.starts_with('/') || path.len() < 2 {
            return Err(ConfigError::Validation(format!(
                "reload.path must start with / and name a path, got {path:?}"
            )));
        }
        Ok(())
    }

    fn validate_watch(&self) -> Result<(), ConfigError> {
        if self.watch_resolved.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.debounce_ms must be greater than 0".to_owned(),
            ));
        }
        require_globs(&self.watch_resolved.patterns, "watch.patterns")?;
        require_globs(&self.watch_resolved.ignore, "watch.ignore")?;
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.expand_with(&expand::process_env)
    }

    /// Expand `${VAR}` in host and path, and `~` in directories.
    fn expand_with(&mut self, lookup: expand::Lookup<'_>) -> Result<(), ConfigError> {
        self.server.host = expand::expand_value(&self.server.host, "server.host", lookup)?;
        self.reload.path = expand::expand_value(&self.reload.path, "reload.path", lookup)?;
        if let Some(root) = &self.watch.root {
            self.watch.root = Some(expand::expand_path(root, "watch.root", lookup)?);
        }
        if let Some(dir) = &self.static_files.dir {
            self.static_files.dir = Some(expand::expand_path(dir, "static.dir", lookup)?);
        }
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));
        let defaults = WatchConfig::default();

        self.watch_resolved = WatchConfig {
            root: resolve(self.watch.root.as_deref(), "."),
            patterns: self.watch.patterns.clone().unwrap_or(defaults.patterns),
            ignore: self.watch.ignore.clone().unwrap_or(defaults.ignore),
            debounce_ms: self.watch.debounce_ms.unwrap_or(defaults.debounce_ms),
        };

        self.static_resolved = StaticConfig {
            dir: resolve(self.static_files.dir.as_deref(), "public"),
        };
    }
}
