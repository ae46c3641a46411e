//! Thread-safe, append-only storage for decoded records.
//!
//! The store is the only shared mutable state in the process. It is
//! written by the ingestion worker and read by whatever thread drives the
//! control surface, so the record log and the channel-count watermark
//! live under one mutex: a reader can never observe a count that
//! disagrees with the watermark it was updated alongside.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::packet::Record;

/// A consistent read of the store at a single instant.
#[derive(Debug, Clone)]
pub struct CaptureSnapshot {
    /// Records in arrival order.
    pub records: Vec<Record>,
    /// Highest channel count seen since the last clear, at most 32.
    pub max_channel_count: u8,
}

#[derive(Default)]
struct StoreInner {
    records: Vec<Record>,
    max_channel_count: u8,
}

/// Ordered log of accepted records plus the channel-count watermark.
///
/// Neither the record sequence nor the lock guarding it is ever handed
/// out; callers get counts and cloned snapshots.
#[derive(Default)]
pub struct RecordStore {
    inner: Mutex<StoreInner>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoning panic cannot leave the log half-written (appends are
        // a push plus a max), so keep serving the data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record and raises the watermark to `channel_count` if it
    /// is the highest seen so far.
    pub fn append(&self, record: Record, channel_count: u8) {
        let mut inner = self.locked();
        inner.records.push(record);
        inner.max_channel_count = inner.max_channel_count.max(channel_count);
    }

    /// Number of records currently stored.
    pub fn count(&self) -> usize {
        self.locked().records.len()
    }

    /// Clones the current log and watermark as one consistent unit.
    pub fn snapshot(&self) -> CaptureSnapshot {
        let inner = self.locked();
        CaptureSnapshot {
            records: inner.records.clone(),
            max_channel_count: inner.max_channel_count,
        }
    }

    /// Empties the log and resets the watermark to zero.
    ///
    /// Precondition: the caller has already verified the capture is idle.
    /// The store itself knows nothing about capture state.
    pub fn clear(&self) {
        let mut inner = self.locked();
        inner.records.clear();
        inner.max_channel_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::CHANNEL_CAPACITY;

    fn record(first: f32, bools: u32) -> Record {
        let mut numbers = [0.0f32; CHANNEL_CAPACITY];
        numbers[0] = first;
        Record { numbers, bools }
    }

    #[test]
    fn append_grows_count_and_watermark() {
        let store = RecordStore::new();

        store.append(record(1.0, 0), 3);

        assert_eq!(store.count(), 1);
        assert_eq!(store.snapshot().max_channel_count, 3);
    }

    #[test]
    fn watermark_never_decreases() {
        let store = RecordStore::new();

        store.append(record(1.0, 0), 5);
        store.append(record(2.0, 0), 2);

        assert_eq!(store.snapshot().max_channel_count, 5);
    }

    #[test]
    fn snapshot_preserves_arrival_order() {
        let store = RecordStore::new();

        store.append(record(1.0, 0), 1);
        store.append(record(2.0, 0), 1);
        store.append(record(3.0, 0), 1);

        let snapshot = store.snapshot();
        let firsts: Vec<f32> = snapshot.records.iter().map(|r| r.numbers[0]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn clear_resets_log_and_watermark() {
        let store = RecordStore::new();
        store.append(record(1.0, 0b1), 4);

        store.clear();

        assert_eq!(store.count(), 0);
        assert_eq!(store.snapshot().max_channel_count, 0);
        assert!(store.snapshot().records.is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let store = RecordStore::new();
        store.append(record(1.0, 0), 1);

        let snapshot = store.snapshot();
        store.append(record(2.0, 0), 2);

        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.max_channel_count, 1);
    }
}
