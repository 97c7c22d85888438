//! Filesystem change batches for live reload.
//!
//! [`FsWatcher`] watches a directory tree with `notify`, coalesces bursts of
//! raw events per path, and delivers them as ordered [`Batch`]es once the
//! tree has been quiet for the debounce window.
//!
//! [`MockBatches`] (behind the `mock` feature) feeds batches by hand for
//! consumers' tests.
//!
//! # Example
//!
//! ```ignore
//! use lr_watch::FsWatcher;
//!
//! let (mut batches, _handle) = FsWatcher::new("public").watch()?;
//! for batch in batches.iter() {
//!     for record in batch? {
//!         println!("{record}"); // e.g. "write:/index.html"
//!     }
//! }
//! ```

mod debouncer;
mod error;
mod event;
mod fs;
#[cfg(feature = "mock")]
mod mock;

pub use error::WatchError;
pub use event::{Batch, BatchReceiver, ChangeOp, ChangeRecord, WatchHandle};
pub use fs::{DEFAULT_DEBOUNCE, FsWatcher};
#[cfg(feature = "mock")]
pub use mock::MockBatches;
