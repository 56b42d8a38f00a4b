//! bookkeeping of currently open outbound streams.
//!
//! The protocol engine (`h2`) already dispatches frames to the right stream internally and
//! hands each [`Connection::post`](crate::Connection::post) caller its own
//! `ResponseFuture`/`RecvStream` pair directly — there is no separate event-buffer-plus-waiter
//! layer to build on top of. What does need to exist here is a record of which stream ids are
//! currently outstanding, so `Connection::blocked` can compare an O(1) count against
//! `max_concurrent_streams`, and so a cancelled `post` can deallocate its own entry without
//! touching any other stream's bookkeeping.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::collections::HashSet;
use std::sync::Mutex;

/// local correlation id for a single `post` call's stream-table entry. `h2::StreamId`, the
/// actual wire identifier, has no public constructor or accessor suited to this bookkeeping
/// role, so callers allocate their own monotonic id instead; the table only needs something
/// unique per outstanding stream; it never has to match what's on the wire.
pub(crate) type StreamId = u32;

#[derive(Default)]
pub(crate) struct StreamTable {
    open: Mutex<HashSet<StreamId>>,
    count: AtomicUsize,
}

impl StreamTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// number of streams currently allocated. O(1): a plain atomic load, never an iteration
    /// over the table.
    pub(crate) fn open_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// record a newly allocated stream. Returns a guard that removes the entry on drop,
    /// whether `post` returns normally, fails, or is cancelled mid-flight.
    pub(crate) fn insert(self: &std::sync::Arc<Self>, id: StreamId) -> StreamGuard {
        let mut open = self.open.lock().unwrap();
        let first_time = open.insert(id);
        debug_assert!(first_time, "h2 must never reuse a live stream id");
        drop(open);
        self.count.fetch_add(1, Ordering::AcqRel);
        StreamGuard {
            table: self.clone(),
            id,
        }
    }

    fn remove(&self, id: StreamId) {
        if self.open.lock().unwrap().remove(&id) {
            self.count.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// RAII membership of a single stream id in the [`StreamTable`]. Dropping it (normal return,
/// early `?`, or future cancellation) removes the bookkeeping entry exactly once.
pub(crate) struct StreamGuard {
    table: std::sync::Arc<StreamTable>,
    id: StreamId,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn insert_increments_and_drop_decrements() {
        let table = Arc::new(StreamTable::new());
        assert_eq!(table.open_count(), 0);
        let guard = table.insert(1);
        assert_eq!(table.open_count(), 1);
        drop(guard);
        assert_eq!(table.open_count(), 0);
    }

    #[test]
    fn independent_streams_do_not_interfere() {
        let table = Arc::new(StreamTable::new());
        let a = table.insert(1);
        let b = table.insert(3);
        assert_eq!(table.open_count(), 2);
        drop(a);
        assert_eq!(table.open_count(), 1);
        drop(b);
        assert_eq!(table.open_count(), 0);
    }
}
