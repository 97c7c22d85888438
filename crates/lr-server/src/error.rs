//! Server error type.

use std::net::AddrParseError;

use lr_watch::WatchError;

/// Errors that stop the live reload server or its watch loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or serving the listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The filesystem watcher failed.
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    /// Host and port do not form a socket address.
    #[error("invalid address: {0}")]
    Addr(#[from] AddrParseError),
}
