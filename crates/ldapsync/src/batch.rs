//! Batch committer
//!
//! Accumulates store operations and applies them in bounded, all-or-nothing
//! batches. The operations of one entry always land in the same batch, so a
//! `PendingWithinBatch` reference never crosses a batch boundary.

use tracing::{debug, instrument, warn};

use crate::operation::Operation;
use crate::stats::SyncStats;
use crate::traits::RecordStore;

/// Default number of pending operations that triggers a commit.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Owns the pending operation queue of one sync run.
pub struct BatchCommitter<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    threshold: usize,
    pending: Vec<Operation>,
    pending_entries: u64,
}

impl<'a, S: RecordStore + ?Sized> BatchCommitter<'a, S> {
    /// Create a committer with the default threshold.
    pub fn new(store: &'a S) -> Self {
        Self::with_threshold(store, DEFAULT_BATCH_SIZE)
    }

    /// Create a committer that commits once `threshold` operations are pending.
    ///
    /// A threshold of zero is treated as one.
    pub fn with_threshold(store: &'a S, threshold: usize) -> Self {
        Self {
            store,
            threshold: threshold.max(1),
            pending: Vec::new(),
            pending_entries: 0,
        }
    }

    /// Queue the operations of one entry.
    ///
    /// Parent references inside `group` are relative to its first
    /// operation and are rebased onto the pending queue.
    pub fn add(&mut self, group: Vec<Operation>) {
        let offset = self.pending.len();
        self.pending
            .extend(group.into_iter().map(|op| op.rebased(offset)));
        self.pending_entries += 1;
    }

    /// Number of operations waiting to be committed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Commit if the pending count has reached the threshold.
    ///
    /// Returns whether a commit was attempted.
    pub async fn flush_if_full(&mut self, stats: &mut SyncStats) -> bool {
        if self.pending.len() < self.threshold {
            return false;
        }
        self.flush(stats).await;
        true
    }

    /// Commit whatever is pending.
    pub async fn flush_remaining(&mut self, stats: &mut SyncStats) {
        if !self.pending.is_empty() {
            self.flush(stats).await;
        }
    }

    #[instrument(skip(self, stats), fields(operations = self.pending.len(), entries = self.pending_entries))]
    async fn flush(&mut self, stats: &mut SyncStats) {
        let operations = std::mem::take(&mut self.pending);
        let entries = std::mem::take(&mut self.pending_entries);
        let count = operations.len() as u64;

        match self.store.apply_batch(&operations).await {
            Ok(()) => {
                debug!("Committed batch");
                stats.batches_committed += 1;
                stats.operations_committed += count;
            }
            Err(e) => {
                warn!(error = %e, "Batch commit failed, discarding batch");
                stats.database_error = true;
                stats.batches_failed += 1;
                stats.operations_discarded += count;
                stats.skipped_entries += entries;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::operation::{DataRow, ParentRef, RecordId, SyncAccount};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every batch it is handed.
    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Vec<Operation>>>,
        fail: bool,
    }

    #[async_trait]
    impl RecordStore for RecordingStore {
        async fn lookup(&self, _source_key: &str) -> StoreResult<Option<RecordId>> {
            Ok(None)
        }

        async fn apply_batch(&self, operations: &[Operation]) -> StoreResult<()> {
            if self.fail {
                return Err(StoreError::commit("disk full"));
            }
            self.batches.lock().unwrap().push(operations.to_vec());
            Ok(())
        }
    }

    fn note(parent: ParentRef) -> Operation {
        Operation::Insert {
            parent,
            row: DataRow::new("vnd.android.cursor.item/note", Vec::new()),
        }
    }

    fn new_entry(dn: &str, rows: usize) -> Vec<Operation> {
        let mut ops = vec![Operation::InsertParent {
            account: SyncAccount::new("ldap.example.com"),
            source_key: dn.to_string(),
        }];
        ops.extend((0..rows).map(|_| note(ParentRef::PendingWithinBatch(0))));
        ops
    }

    #[tokio::test]
    async fn test_batch_boundary() {
        let store = RecordingStore::default();
        let mut committer = BatchCommitter::with_threshold(&store, 50);
        let mut stats = SyncStats::default();

        let mut flushes = 0;
        for _ in 0..101 {
            committer.add(vec![note(ParentRef::Resolved(RecordId::new(1)))]);
            if committer.flush_if_full(&mut stats).await {
                flushes += 1;
            }
        }

        assert_eq!(flushes, 2);
        assert_eq!(committer.pending_len(), 1);
        assert_eq!(store.batches.lock().unwrap().len(), 2);

        committer.flush_remaining(&mut stats).await;
        assert_eq!(committer.pending_len(), 0);
        assert_eq!(stats.batches_committed, 3);
        assert_eq!(stats.operations_committed, 101);
    }

    #[tokio::test]
    async fn test_groups_are_rebased() {
        let store = RecordingStore::default();
        let mut committer = BatchCommitter::new(&store);
        let mut stats = SyncStats::default();

        committer.add(new_entry("uid=a,dc=example", 2));
        committer.add(new_entry("uid=b,dc=example", 1));
        committer.flush_remaining(&mut stats).await;

        let batches = store.batches.lock().unwrap();
        let batch = &batches[0];
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[1], note(ParentRef::PendingWithinBatch(0)));
        assert_eq!(batch[2], note(ParentRef::PendingWithinBatch(0)));
        assert!(batch[3].is_parent_insert());
        assert_eq!(batch[4], note(ParentRef::PendingWithinBatch(3)));
    }

    #[tokio::test]
    async fn test_group_is_never_split() {
        let store = RecordingStore::default();
        let mut committer = BatchCommitter::with_threshold(&store, 3);
        let mut stats = SyncStats::default();

        committer.add(new_entry("uid=a,dc=example", 1));
        assert!(!committer.flush_if_full(&mut stats).await);
        committer.add(new_entry("uid=b,dc=example", 4));
        assert!(committer.flush_if_full(&mut stats).await);

        let batches = store.batches.lock().unwrap();
        assert_eq!(batches[0].len(), 7);
    }

    #[tokio::test]
    async fn test_failed_batch_is_discarded() {
        let store = RecordingStore {
            fail: true,
            ..RecordingStore::default()
        };
        let mut committer = BatchCommitter::new(&store);
        let mut stats = SyncStats::default();

        committer.add(new_entry("uid=a,dc=example", 2));
        committer.add(new_entry("uid=b,dc=example", 2));
        committer.flush_remaining(&mut stats).await;

        assert_eq!(committer.pending_len(), 0);
        assert!(stats.database_error);
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.operations_discarded, 6);
        assert_eq!(stats.skipped_entries, 2);
    }

    #[tokio::test]
    async fn test_flush_remaining_on_empty_queue() {
        let store = RecordingStore::default();
        let mut committer = BatchCommitter::new(&store);
        let mut stats = SyncStats::default();

        committer.flush_remaining(&mut stats).await;
        assert_eq!(stats.batches_committed, 0);
        assert!(store.batches.lock().unwrap().is_empty());
    }
}
