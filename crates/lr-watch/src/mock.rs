//! Hand-fed batch source for tests.

use tokio::sync::mpsc as async_mpsc;

use crate::error::WatchError;
use crate::event::{Batch, BatchReceiver, ChangeOp, ChangeRecord};

/// Feeds batches into a [`BatchReceiver`] without touching the filesystem.
///
/// Dropping the mock closes the receiver, like a stopped watcher.
///
/// # Example
///
/// ```ignore
/// use lr_watch::{ChangeOp, MockBatches};
///
/// let (batches, mut receiver) = MockBatches::new();
/// batches.emit_one(ChangeOp::Write, "/index.html");
/// let batch = receiver.try_recv().unwrap().unwrap();
/// assert_eq!(batch[0].to_string(), "write:/index.html");
/// ```
#[derive(Debug)]
pub struct MockBatches {
    tx: async_mpsc::UnboundedSender<Result<Batch, WatchError>>,
}

impl MockBatches {
    /// Create a mock and the receiver it feeds.
    #[must_use]
    pub fn new() -> (Self, BatchReceiver) {
        let (tx, rx) = async_mpsc::unbounded_channel();
        (Self { tx }, BatchReceiver::new(rx))
    }

    /// Deliver a batch.
    pub fn emit(&self, batch: Batch) {
        let _ = self.tx.send(Ok(batch));
    }

    /// Deliver a batch holding a single record.
    pub fn emit_one(&self, op: ChangeOp, path: impl Into<String>) {
        self.emit(vec![ChangeRecord::new(op, path)]);
    }

    /// Deliver a fatal error and close the receiver.
    pub fn fail(self, err: WatchError) {
        let _ = self.tx.send(Err(err));
    }
}
