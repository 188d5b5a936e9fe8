//! In-memory record store
//!
//! A batch is checked in full before any of it is applied, so a rejected
//! batch leaves the store untouched. Source keys are indexed for lookups.
//! Lookups and commits can be made to fail on demand.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{StoreError, StoreResult};
use crate::operation::{DataRow, Operation, ParentRef, RecordId, SyncAccount};
use crate::traits::RecordStore;

/// A parent record and its source key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRecord {
    pub account: SyncAccount,
    pub source_key: String,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    parents: BTreeMap<RecordId, ParentRecord>,
    by_key: HashMap<String, RecordId>,
    rows: BTreeMap<RecordId, Vec<DataRow>>,
    batches: u64,
}

impl State {
    fn find(&self, source_key: &str) -> Option<RecordId> {
        self.by_key.get(source_key).copied()
    }

    /// Reject a batch that could not be applied in full.
    fn check(&self, operations: &[Operation]) -> StoreResult<()> {
        let mut keys = HashSet::new();

        for (position, op) in operations.iter().enumerate() {
            match op {
                Operation::InsertParent { source_key, .. } => {
                    if self.by_key.contains_key(source_key) || !keys.insert(source_key.as_str()) {
                        return Err(StoreError::commit(format!(
                            "a record for '{source_key}' already exists"
                        )));
                    }
                }
                Operation::Insert {
                    parent: ParentRef::PendingWithinBatch(index),
                    ..
                } => {
                    let index = *index;
                    let pending = index < position
                        && matches!(operations[index], Operation::InsertParent { .. });
                    if !pending {
                        return Err(StoreError::UnresolvedReference { index });
                    }
                }
                Operation::Insert {
                    parent: ParentRef::Resolved(parent),
                    ..
                }
                | Operation::DeleteAllForParent { parent } => {
                    if !self.rows.contains_key(parent) {
                        return Err(StoreError::commit(format!("no record {parent}")));
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply a batch that passed [`State::check`].
    fn apply(&mut self, operations: &[Operation]) {
        let mut created: Vec<Option<RecordId>> = Vec::with_capacity(operations.len());

        for op in operations {
            let id = match op {
                Operation::InsertParent {
                    account,
                    source_key,
                } => {
                    self.next_id += 1;
                    let id = RecordId::new(self.next_id);
                    self.parents.insert(
                        id,
                        ParentRecord {
                            account: account.clone(),
                            source_key: source_key.clone(),
                        },
                    );
                    self.by_key.insert(source_key.clone(), id);
                    self.rows.insert(id, Vec::new());
                    Some(id)
                }
                Operation::Insert { parent, row } => {
                    let parent = match *parent {
                        ParentRef::Resolved(id) => Some(id),
                        ParentRef::PendingWithinBatch(index) => created.get(index).copied().flatten(),
                    };
                    if let Some(rows) = parent.and_then(|id| self.rows.get_mut(&id)) {
                        rows.push(row.clone());
                    }
                    None
                }
                Operation::DeleteAllForParent { parent } => {
                    if let Some(rows) = self.rows.get_mut(parent) {
                        rows.clear();
                    }
                    None
                }
            };
            created.push(id);
        }

        self.batches += 1;
    }
}

/// A record store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<State>,
    failing_lookups: Mutex<HashSet<String>>,
    failing_commits: Mutex<usize>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every lookup of `source_key` fail.
    pub fn fail_lookup(&self, source_key: impl Into<String>) {
        self.failing_lookups.lock().insert(source_key.into());
    }

    /// Make the next `count` batches fail.
    pub fn fail_next_commits(&self, count: usize) {
        *self.failing_commits.lock() = count;
    }

    /// Number of parent records.
    pub fn parent_count(&self) -> usize {
        self.state.lock().parents.len()
    }

    /// Number of batches applied.
    pub fn batches_applied(&self) -> u64 {
        self.state.lock().batches
    }

    /// Parent record created for `source_key`.
    pub fn record_for(&self, source_key: &str) -> Option<RecordId> {
        self.state.lock().find(source_key)
    }

    /// Parent record by id.
    pub fn parent(&self, id: RecordId) -> Option<ParentRecord> {
        self.state.lock().parents.get(&id).cloned()
    }

    /// Child rows of a parent, in insertion order.
    pub fn rows_for(&self, id: RecordId) -> Vec<DataRow> {
        self.state.lock().rows.get(&id).cloned().unwrap_or_default()
    }

    /// Child rows of every parent, keyed by source key.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<DataRow>> {
        let state = self.state.lock();
        state
            .parents
            .iter()
            .map(|(id, parent)| {
                let rows = state.rows.get(id).cloned().unwrap_or_default();
                (parent.source_key.clone(), rows)
            })
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn lookup(&self, source_key: &str) -> StoreResult<Option<RecordId>> {
        if self.failing_lookups.lock().contains(source_key) {
            return Err(StoreError::Lookup {
                source_key: source_key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(self.state.lock().find(source_key))
    }

    async fn apply_batch(&self, operations: &[Operation]) -> StoreResult<()> {
        {
            let mut failing = self.failing_commits.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(StoreError::commit("injected failure"));
            }
        }

        let mut state = self.state.lock();
        state.check(operations)?;
        state.apply(operations);
        Ok(())
    }
}
