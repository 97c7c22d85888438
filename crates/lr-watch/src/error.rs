//! Watcher error types.

use std::path::PathBuf;

/// Fatal watcher error.
///
/// Every variant ends the watch; callers decide whether to restart.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The watch root could not be resolved.
    #[error("watch root not found: {}", path.display())]
    RootMissing {
        /// Root as given by the caller.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The watch root disappeared while watching.
    #[error("watch root was removed: {}", .0.display())]
    RootRemoved(PathBuf),

    /// The OS watcher failed.
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// An include or ignore glob did not compile.
    #[error("invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        /// Pattern text.
        pattern: String,
        /// Glob compile error.
        #[source]
        source: glob::PatternError,
    },

    /// The background thread could not be spawned.
    #[error("failed to start watcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}
