//! Live reload: response rewriting and change notification.

mod aggregate;
mod buffer;
mod channel;
mod logger;
mod reloader;
mod rewrite;
mod sniff;

pub use aggregate::aggregate;
pub use buffer::{BufferedResponse, Capture};
pub use channel::{
    EventChannel, PublishError, RELOAD_EVENT, ReloadEvent, accepts_event_stream, not_found,
};
pub use logger::{Fields, Logger, TracingLogger};
pub use reloader::{DEFAULT_PATH, DEFAULT_RETRY, ReloadOptions, Reloader, live_reload};
pub use rewrite::{client_script, rewrite, script_block};
pub use sniff::{SNIFF_LEN, Sniffed, sniff};
