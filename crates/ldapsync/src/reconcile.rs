//! Reconciliation driver
//!
//! Walks the search results of one sync run. Each entry is matched to its
//! local parent record by DN; a new entry gets a new parent, a known entry
//! has every child row deleted and rewritten. The resulting operations are
//! handed to the [`BatchCommitter`] one entry at a time.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::batch::BatchCommitter;
use crate::entry::DirectoryEntry;
use crate::mapping::MappingConfiguration;
use crate::operation::{Operation, ParentRef, RecordId, SyncAccount};
use crate::stats::SyncStats;
use crate::traits::{EntryStream, RecordStore};

/// How a run over a search stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The search ended normally.
    Completed,
    /// Cancellation was requested between entries.
    Cancelled,
    /// The search reported an error.
    SearchFailed,
}

/// Build the operations for one entry.
///
/// With no `existing` record the group starts with an `InsertParent` and
/// every row refers to it as `PendingWithinBatch(0)`. Otherwise the group
/// starts with a `DeleteAllForParent` and every row refers to the existing
/// record directly.
pub fn entry_operations(
    mapping: &MappingConfiguration,
    account: &SyncAccount,
    entry: &DirectoryEntry,
    existing: Option<RecordId>,
) -> Vec<Operation> {
    let expanded = mapping.expand(entry);
    let (head, parent) = match existing {
        None => (
            Operation::InsertParent {
                account: account.clone(),
                source_key: entry.dn().to_string(),
            },
            ParentRef::PendingWithinBatch(0),
        ),
        Some(id) => (
            Operation::DeleteAllForParent { parent: id },
            ParentRef::Resolved(id),
        ),
    };

    let mut operations = Vec::with_capacity(expanded.rows.len() + 1);
    operations.push(head);
    operations.extend(
        expanded
            .rows
            .into_iter()
            .map(|row| Operation::Insert { parent, row }),
    );
    operations
}

/// Reconciles directory entries against a record store.
///
/// Not shareable between runs; create one per sync run.
pub struct ReconciliationDriver<'a, S: RecordStore + ?Sized> {
    mapping: &'a MappingConfiguration,
    account: &'a SyncAccount,
    store: &'a S,
    committer: BatchCommitter<'a, S>,
}

impl<'a, S: RecordStore + ?Sized> ReconciliationDriver<'a, S> {
    /// Create a driver committing in batches of `batch_size` operations.
    pub fn new(
        mapping: &'a MappingConfiguration,
        account: &'a SyncAccount,
        store: &'a S,
        batch_size: usize,
    ) -> Self {
        Self {
            mapping,
            account,
            store,
            committer: BatchCommitter::with_threshold(store, batch_size),
        }
    }

    /// Reconcile one entry and queue its operations.
    ///
    /// A failed lookup skips the entry; nothing is queued for it.
    #[instrument(skip(self, entry, stats), fields(dn = %entry.dn()))]
    pub async fn process_entry(&mut self, entry: &DirectoryEntry, stats: &mut SyncStats) {
        stats.entries_seen += 1;

        let existing = match self.store.lookup(entry.dn()).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "Lookup failed, skipping entry");
                stats.database_error = true;
                stats.skipped_entries += 1;
                return;
            }
        };

        let operations = entry_operations(self.mapping, self.account, entry, existing);
        match existing {
            Some(id) => {
                debug!(record = %id, operations = operations.len(), "Replacing rows of existing record");
                stats.updates += 1;
            }
            None => {
                debug!(operations = operations.len(), "Inserting new record");
                stats.inserts += 1;
            }
        }

        self.committer.add(operations);
        self.committer.flush_if_full(stats).await;
    }

    /// Drain a search stream, reconciling every entry.
    ///
    /// Pending operations are committed whichever way the run ends.
    /// A search error counts as an authentication or I/O failure.
    pub async fn run<E: EntryStream + ?Sized>(
        &mut self,
        entries: &mut E,
        stats: &mut SyncStats,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let outcome = loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break RunOutcome::Cancelled,
                next = entries.next_entry() => next,
            };

            match next {
                Ok(Some(entry)) => self.process_entry(&entry, stats).await,
                Ok(None) => break RunOutcome::Completed,
                Err(e) => {
                    error!(error = %e, "Directory search failed");
                    if e.is_authentication() {
                        stats.auth_exceptions += 1;
                    } else {
                        stats.io_exceptions += 1;
                    }
                    break RunOutcome::SearchFailed;
                }
            }
        };

        self.committer.flush_remaining(stats).await;

        if outcome == RunOutcome::Cancelled {
            info!(entries = stats.entries_seen, "Sync cancelled");
        }
        outcome
    }

    /// Commit anything still queued.
    pub async fn finish(&mut self, stats: &mut SyncStats) {
        self.committer.flush_remaining(stats).await;
    }
}
