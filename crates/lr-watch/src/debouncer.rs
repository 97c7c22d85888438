//! Batch debouncing for change notification.
//!
//! Collects raw changes until the filesystem has been quiet for the debounce
//! window, then hands them out as one batch. Repeated changes to the same path
//! are coalesced, keeping the position of the first observation.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::WatchError;
use crate::event::{Batch, ChangeOp, ChangeRecord};

/// Upper bound on how long a batch can be held back by a steady event stream.
const MAX_BATCH_DELAY: Duration = Duration::from_secs(1);

/// Slot for one path. `op` is `None` when the changes cancelled out.
struct Slot {
    path: String,
    op: Option<ChangeOp>,
}

#[derive(Default)]
struct Pending {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    first_event: Option<Instant>,
    last_event: Option<Instant>,
    failure: Option<WatchError>,
}

/// Thread-safe batch debouncer.
///
/// Written to from the notify callback, drained from the watcher thread.
pub(crate) struct BatchDebouncer {
    pending: Mutex<Pending>,
    quiet: Duration,
}

impl BatchDebouncer {
    /// Create a debouncer that emits after `quiet` without new events.
    pub fn new(quiet: Duration) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            quiet,
        }
    }

    /// Record a change.
    pub fn record(&self, path: String, op: ChangeOp) {
        self.record_at(path, op, Instant::now());
    }

    fn record_at(&self, path: String, op: ChangeOp, now: Instant) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.first_event.get_or_insert(now);
        pending.last_event = Some(now);

        if let Some(&slot) = pending.index.get(&path) {
            let slot = &mut pending.slots[slot];
            slot.op = match slot.op {
                Some(existing) => Self::coalesce(existing, op),
                None => Some(op),
            };
            return;
        }

        let position = pending.slots.len();
        pending.index.insert(path.clone(), position);
        pending.slots.push(Slot { path, op: Some(op) });
    }

    /// Coalesce two operations on the same path.
    ///
    /// Returns `None` when both should be dropped (created then removed).
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: ChangeOp, new: ChangeOp) -> Option<ChangeOp> {
        use ChangeOp::{Create, Remove, Rename, Write};

        match (existing, new) {
            (Create, Create) => Some(Create),
            (Create, Write) => Some(Create),
            (Create, Remove) => None,

            (Write, Create) => Some(Create),
            (Write, Write) => Some(Write),
            (Write, Remove) => Some(Remove),

            (Remove, Create) => Some(Write), // replaced
            (Remove, Write) => Some(Remove),
            (Remove, Remove) => Some(Remove),

            (_, Rename) => Some(Rename),
            (Rename, new) => Some(new),
        }
    }

    /// Record a fatal error. Later calls keep the first error.
    pub fn fail(&self, error: WatchError) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.failure.get_or_insert(error);
    }

    /// Take the recorded fatal error, if any.
    pub fn take_failure(&self) -> Option<WatchError> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure
            .take()
    }

    /// Drain the pending batch if it is ready.
    ///
    /// A batch is ready once `quiet` has passed since the last event, or
    /// [`MAX_BATCH_DELAY`] since the first. The returned batch is empty when
    /// every recorded change cancelled out.
    pub fn drain_ready(&self) -> Option<Batch> {
        self.drain_ready_at(Instant::now())
    }

    fn drain_ready_at(&self, now: Instant) -> Option<Batch> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let (first, last) = (pending.first_event?, pending.last_event?);

        let quiet_elapsed = now.saturating_duration_since(last) >= self.quiet;
        let held_too_long = now.saturating_duration_since(first) >= MAX_BATCH_DELAY;
        if !quiet_elapsed && !held_too_long {
            return None;
        }

        let taken = std::mem::take(&mut *pending);
        pending.failure = taken.failure;

        Some(
            taken
                .slots
                .into_iter()
                .filter_map(|slot| slot.op.map(|op| ChangeRecord::new(op, slot.path)))
                .collect(),
        )
    }
}
