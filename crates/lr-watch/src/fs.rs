//! Filesystem watcher built on `notify`.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use glob::Pattern;
use notify::event::ModifyKind;
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

use crate::debouncer::BatchDebouncer;
use crate::error::WatchError;
use crate::event::{BatchReceiver, ChangeOp, WatchHandle};

/// Default quiet window before a batch is emitted.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// How often the watcher thread checks for ready batches.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Recursive filesystem watcher that yields debounced change batches.
#[derive(Clone, Debug)]
pub struct FsWatcher {
    root: PathBuf,
    patterns: Vec<Pattern>,
    ignore: Vec<Pattern>,
    debounce: Duration,
}

impl FsWatcher {
    /// Create a watcher for `root` that reports every change.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patterns: Vec::new(),
            ignore: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Only report paths matching one of these globs (root-relative).
    ///
    /// An empty list reports everything.
    pub fn with_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self, WatchError> {
        self.patterns = compile(patterns)?;
        Ok(self)
    }

    /// Never report paths matching one of these globs (root-relative).
    pub fn with_ignore<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self, WatchError> {
        self.ignore = compile(patterns)?;
        Ok(self)
    }

    /// Set the quiet window that closes a batch.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Watch root as configured.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start watching.
    ///
    /// Spawns a background thread that drains the debouncer and delivers
    /// batches to the returned receiver. Dropping the [`WatchHandle`] stops it.
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist or the OS watcher cannot
    /// be created.
    pub fn watch(&self) -> Result<(BatchReceiver, WatchHandle), WatchError> {
        let root = self
            .root
            .canonicalize()
            .map_err(|source| WatchError::RootMissing {
                path: self.root.clone(),
                source,
            })?;

        let (batch_tx, batch_rx) = async_mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let debouncer = Arc::new(BatchDebouncer::new(self.debounce));

        let filter = PathFilter {
            root: root.clone(),
            patterns: self.patterns.clone(),
            ignore: self.ignore.clone(),
        };
        let debouncer_for_watcher = Arc::clone(&debouncer);
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(err) => {
                        debouncer_for_watcher.fail(WatchError::Notify(err));
                        return;
                    }
                };
                let Some(op) = change_op(&event.kind) else {
                    return;
                };
                for path in &event.paths {
                    if let Some(relative) = filter.relative(path) {
                        debouncer_for_watcher.record(relative, op);
                    }
                }
            })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        tracing::debug!(root = %root.display(), "Watching for changes");

        std::thread::Builder::new()
            .name("lr-watch".to_owned())
            .spawn(move || {
                // Keep the OS watcher alive for the life of this thread
                let _watcher = watcher;

                loop {
                    match shutdown_rx.recv_timeout(POLL_INTERVAL) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                    }

                    let failure = debouncer.take_failure().or_else(|| {
                        matches!(root.try_exists(), Ok(false))
                            .then(|| WatchError::RootRemoved(root.clone()))
                    });
                    if let Some(err) = failure {
                        let _ = batch_tx.send(Err(err));
                        return;
                    }

                    if let Some(batch) = debouncer.drain_ready()
                        && batch_tx.send(Ok(batch)).is_err()
                    {
                        // Receiver dropped
                        return;
                    }
                }
                tracing::debug!(root = %root.display(), "Stopped watching");
            })
            .map_err(WatchError::Spawn)?;

        Ok((BatchReceiver::new(batch_rx), WatchHandle::new(shutdown_tx)))
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>, WatchError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p.as_ref()).map_err(|source| WatchError::Pattern {
                pattern: p.as_ref().to_owned(),
                source,
            })
        })
        .collect()
}

/// Map a notify event kind to a change operation.
fn change_op(kind: &EventKind) -> Option<ChangeOp> {
    match kind {
        EventKind::Create(_) => Some(ChangeOp::Create),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeOp::Rename),
        EventKind::Modify(_) => Some(ChangeOp::Write),
        EventKind::Remove(_) => Some(ChangeOp::Remove),
        _ => None,
    }
}

/// Decides which paths are reported and how they are named.
struct PathFilter {
    root: PathBuf,
    patterns: Vec<Pattern>,
    ignore: Vec<Pattern>,
}

impl PathFilter {
    /// Root-relative `/`-prefixed path, or `None` if the path is filtered out.
    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        if self.ignore.iter().any(|p| p.matches_path(relative)) {
            return None;
        }
        if !self.patterns.is_empty() && !self.patterns.iter().any(|p| p.matches_path(relative)) {
            return None;
        }

        let mut out = String::new();
        for component in relative.components() {
            if let Component::Normal(segment) = component {
                out.push('/');
                out.push_str(&segment.to_string_lossy());
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use pretty_assertions::assert_eq;

    fn filter(patterns: &[&str], ignore: &[&str]) -> PathFilter {
        PathFilter {
            root: PathBuf::from("/site"),
            patterns: compile(patterns).unwrap(),
            ignore: compile(ignore).unwrap(),
        }
    }

    #[test]
    fn test_fs_watcher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FsWatcher>();
    }

    #[test]
    fn test_change_op_mapping() {
        assert_eq!(
            change_op(&EventKind::Create(CreateKind::File)),
            Some(ChangeOp::Create)
        );
        assert_eq!(
            change_op(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeOp::Write)
        );
        assert_eq!(
            change_op(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(ChangeOp::Rename)
        );
        assert_eq!(
            change_op(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeOp::Remove)
        );
        assert_eq!(change_op(&EventKind::Any), None);
    }

    #[test]
    fn test_relative_path_has_leading_slash() {
        let filter = filter(&[], &[]);
        assert_eq!(
            filter.relative(Path::new("/site/css/app.css")),
            Some("/css/app.css".to_owned())
        );
    }

    #[test]
    fn test_relative_skips_root_and_outside_paths() {
        let filter = filter(&[], &[]);
        assert_eq!(filter.relative(Path::new("/site")), None);
        assert_eq!(filter.relative(Path::new("/other/index.html")), None);
    }

    #[test]
    fn test_relative_respects_ignore() {
        let filter = filter(&[], &["**/.git/**", "**/node_modules/**"]);
        assert_eq!(filter.relative(Path::new("/site/.git/HEAD")), None);
        assert_eq!(
            filter.relative(Path::new("/site/app/node_modules/x/index.js")),
            None
        );
        assert!(filter.relative(Path::new("/site/index.html")).is_some());
    }

    #[test]
    fn test_relative_respects_patterns() {
        let filter = filter(&["**/*.html", "**/*.css"], &[]);
        assert!(filter.relative(Path::new("/site/index.html")).is_some());
        assert!(filter.relative(Path::new("/site/css/app.css")).is_some());
        assert_eq!(filter.relative(Path::new("/site/notes.md")), None);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let result = FsWatcher::new("/site").with_patterns(&["[unclosed"]);
        assert!(matches!(result, Err(WatchError::Pattern { .. })));
    }

    #[test]
    fn test_watch_missing_root_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let watcher = FsWatcher::new(temp_dir.path().join("missing"));

        let result = watcher.watch();
        assert!(matches!(result, Err(WatchError::RootMissing { .. })));
    }

    #[test]
    fn test_watch_returns_receiver_and_handle() {
        let temp_dir = tempfile::tempdir().unwrap();
        let watcher = FsWatcher::new(temp_dir.path());

        assert!(watcher.watch().is_ok());
    }

    // Timing-sensitive tests against the real OS watcher are ignored by default
    #[test]
    #[ignore]
    fn test_watch_delivers_write_batch() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("index.html"), "<p>one</p>").unwrap();

        let watcher = FsWatcher::new(temp_dir.path()).with_debounce(Duration::from_millis(50));
        let (mut rx, _handle) = watcher.watch().unwrap();
        std::thread::sleep(Duration::from_millis(200));

        std::fs::write(temp_dir.path().join("index.html"), "<p>two</p>").unwrap();
        std::thread::sleep(Duration::from_millis(500));

        let batch = rx.try_recv().expect("expected a batch").unwrap();
        assert!(
            batch.iter().any(|r| r.path == "/index.html"),
            "unexpected batch: {batch:?}"
        );
    }

    #[test]
    #[ignore]
    fn test_watch_reports_removed_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("site");
        std::fs::create_dir(&root).unwrap();

        let (mut rx, _handle) = FsWatcher::new(&root).watch().unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        let error = rx.iter().find_map(Result::err);
        assert!(
            matches!(error, Some(WatchError::RootRemoved(_) | WatchError::Notify(_))),
            "unexpected result: {error:?}"
        );
    }
}
