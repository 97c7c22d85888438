//! Change record types and batch delivery.
//!
//! Provides the types returned by [`FsWatcher::watch`](crate::FsWatcher::watch).

use std::fmt;
use std::sync::mpsc;

use tokio::sync::mpsc as async_mpsc;

use crate::error::WatchError;

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeOp {
    /// File or directory was created.
    Create,
    /// File contents or metadata changed.
    Write,
    /// File or directory was removed.
    Remove,
    /// File or directory was renamed (reported for both names).
    Rename,
}

impl ChangeOp {
    /// Wire name of the operation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Write => "write",
            Self::Remove => "remove",
            Self::Rename => "rename",
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single filesystem change observed by the watcher.
///
/// `path` is relative to the watch root, `/`-separated, with a leading `/`
/// (e.g. `/css/site.css`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChangeRecord {
    /// Kind of change.
    pub op: ChangeOp,
    /// Root-relative path.
    pub path: String,
}

impl ChangeRecord {
    /// Create a new change record.
    #[must_use]
    pub fn new(op: ChangeOp, path: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
        }
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.op, self.path)
    }
}

/// Changes delivered together by one watcher cycle, in observation order.
pub type Batch = Vec<ChangeRecord>;

/// Receiver for change batches.
///
/// Yields `Ok(batch)` for every debounced cycle. A fatal watcher error is
/// delivered once as `Err`, after which the receiver is closed.
pub struct BatchReceiver {
    rx: async_mpsc::UnboundedReceiver<Result<Batch, WatchError>>,
}

impl BatchReceiver {
    pub(crate) fn new(rx: async_mpsc::UnboundedReceiver<Result<Batch, WatchError>>) -> Self {
        Self { rx }
    }

    /// Wait for the next batch.
    ///
    /// Returns `None` once the watcher has stopped.
    pub async fn recv(&mut self) -> Option<Result<Batch, WatchError>> {
        self.rx.recv().await
    }

    /// Try to receive a batch without waiting.
    pub fn try_recv(&mut self) -> Option<Result<Batch, WatchError>> {
        self.rx.try_recv().ok()
    }

    /// Returns a blocking iterator over batches.
    ///
    /// Must not be used from inside an async runtime; use [`recv`](Self::recv) there.
    pub fn iter(&mut self) -> impl Iterator<Item = Result<Batch, WatchError>> + '_ {
        std::iter::from_fn(move || self.rx.blocking_recv())
    }
}

/// Handle to stop watching.
///
/// Dropping the handle stops the watcher thread and releases the OS watcher.
pub struct WatchHandle {
    _shutdown: Option<mpsc::Sender<()>>,
}

impl WatchHandle {
    pub(crate) fn new(shutdown: mpsc::Sender<()>) -> Self {
        Self {
            _shutdown: Some(shutdown),
        }
    }

    /// Stop watching immediately (consumes the handle).
    pub fn stop(mut self) {
        self._shutdown.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_op_wire_names() {
        assert_eq!(ChangeOp::Create.to_string(), "create");
        assert_eq!(ChangeOp::Write.to_string(), "write");
        assert_eq!(ChangeOp::Remove.to_string(), "remove");
        assert_eq!(ChangeOp::Rename.to_string(), "rename");
    }

    #[test]
    fn test_change_record_display() {
        let record = ChangeRecord::new(ChangeOp::Write, "/index.html");
        assert_eq!(record.to_string(), "write:/index.html");
    }

    #[tokio::test]
    async fn test_receiver_recv_in_order() {
        let (tx, rx) = async_mpsc::unbounded_channel();
        let mut receiver = BatchReceiver::new(rx);

        let first = vec![ChangeRecord::new(ChangeOp::Create, "/a")];
        let second = vec![ChangeRecord::new(ChangeOp::Remove, "/b")];
        tx.send(Ok(first.clone())).unwrap();
        tx.send(Ok(second.clone())).unwrap();
        drop(tx);

        assert_eq!(receiver.recv().await.unwrap().unwrap(), first);
        assert_eq!(receiver.recv().await.unwrap().unwrap(), second);
        assert!(receiver.recv().await.is_none());
    }

    #[test]
    fn test_receiver_try_recv_empty() {
        let (_tx, rx) = async_mpsc::unbounded_channel();
        let mut receiver = BatchReceiver::new(rx);

        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_receiver_iter_stops_on_close() {
        let (tx, rx) = async_mpsc::unbounded_channel();
        let mut receiver = BatchReceiver::new(rx);

        tx.send(Ok(vec![ChangeRecord::new(ChangeOp::Write, "/a")]))
            .unwrap();
        tx.send(Err(WatchError::RootRemoved("/site".into()))).unwrap();
        drop(tx);

        let received: Vec<_> = receiver.iter().collect();
        assert_eq!(received.len(), 2);
        assert!(received[0].is_ok());
        assert!(matches!(received[1], Err(WatchError::RootRemoved(_))));
    }

    #[test]
    fn test_watch_handle_stop() {
        let (tx, rx) = mpsc::channel();
        let handle = WatchHandle::new(tx);

        handle.stop();

        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_watch_handle_drop() {
        let (tx, rx) = mpsc::channel();
        let handle = WatchHandle::new(tx);

        drop(handle);

        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_receiver_and_handle_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WatchHandle>();
        assert_send::<BatchReceiver>();
    }
}
