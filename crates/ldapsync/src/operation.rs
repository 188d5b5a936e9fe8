//! Record store operation types
//!
//! Rows, parent references and the operations a sync run hands to the
//! record store. All of these are plain values; nothing here is mutated once
//! built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::kinds::{
    FALLBACK_CONTENT_TYPE, FALLBACK_DATA_COLUMN, FALLBACK_INDEX_COLUMN, FALLBACK_NAME_COLUMN,
};

/// Identifier of a parent record in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wrap a raw store identifier.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw store identifier.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference from a child row to its parent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParentRef {
    /// A parent that already exists in the store.
    Resolved(RecordId),
    /// The parent inserted by the operation at this index of the same batch.
    PendingWithinBatch(usize),
}

/// The account a synced record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncAccount {
    /// Account name (usually the directory server or bind identity).
    pub name: String,
    /// Account type shared by every account this sync engine manages.
    #[serde(default = "default_account_type")]
    pub account_type: String,
}

/// Account type stamped on records created by this engine.
pub const DEFAULT_ACCOUNT_TYPE: &str = "info.codethink.ldapsync.account";

fn default_account_type() -> String {
    DEFAULT_ACCOUNT_TYPE.to_string()
}

impl SyncAccount {
    /// Create an account of the default type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_type: default_account_type(),
        }
    }
}

/// Value stored in one column of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ColumnValue {
    /// Text column value.
    Text(String),
    /// Binary column value.
    Blob(Vec<u8>),
}

impl ColumnValue {
    /// Raw bytes of the value.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ColumnValue::Text(s) => s.as_bytes(),
            ColumnValue::Blob(b) => b,
        }
    }

    /// Get as text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            ColumnValue::Blob(_) => None,
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(s: &str) -> Self {
        ColumnValue::Text(s.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(s: String) -> Self {
        ColumnValue::Text(s)
    }
}

impl From<Vec<u8>> for ColumnValue {
    fn from(b: Vec<u8>) -> Self {
        ColumnValue::Blob(b)
    }
}

/// One child row: a content item type plus column values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataRow {
    content_type: String,
    columns: BTreeMap<String, ColumnValue>,
}

impl DataRow {
    /// Create a row from its content type and columns.
    pub fn new(
        content_type: impl Into<String>,
        columns: impl IntoIterator<Item = (String, ColumnValue)>,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            columns: columns.into_iter().collect(),
        }
    }

    /// Create the fallback row preserving one unmapped attribute value.
    pub fn fallback(attribute: &str, index: usize, value: &[u8]) -> Self {
        Self::new(
            FALLBACK_CONTENT_TYPE,
            [
                (
                    FALLBACK_NAME_COLUMN.to_string(),
                    ColumnValue::Text(attribute.to_string()),
                ),
                (
                    FALLBACK_INDEX_COLUMN.to_string(),
                    ColumnValue::Text(index.to_string()),
                ),
                (
                    FALLBACK_DATA_COLUMN.to_string(),
                    ColumnValue::Blob(value.to_vec()),
                ),
            ],
        )
    }

    /// Content item type of the row.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns.get(column)
    }

    /// All columns, ordered by name.
    pub fn columns(&self) -> &BTreeMap<String, ColumnValue> {
        &self.columns
    }

    /// Check if this row preserves an unmapped attribute value.
    pub fn is_fallback(&self) -> bool {
        self.content_type == FALLBACK_CONTENT_TYPE
    }

    /// Decode a fallback row into (attribute name, value index, raw value).
    pub fn as_fallback(&self) -> Option<(&str, usize, &[u8])> {
        if !self.is_fallback() {
            return None;
        }
        let name = self.get(FALLBACK_NAME_COLUMN)?.as_text()?;
        let index = self.get(FALLBACK_INDEX_COLUMN)?.as_text()?.parse().ok()?;
        let data = self.get(FALLBACK_DATA_COLUMN)?.as_bytes();
        Some((name, index, data))
    }
}

/// An instruction against the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a parent record keyed by its source key.
    InsertParent {
        account: SyncAccount,
        source_key: String,
    },
    /// Create a child row under a parent.
    Insert { parent: ParentRef, row: DataRow },
    /// Remove every child row of an existing parent.
    DeleteAllForParent { parent: RecordId },
}

impl Operation {
    /// Shift batch-relative parent references by `offset`.
    ///
    /// Operations for one entry are built with references relative to the
    /// entry's first operation; the committer rebases them when they join
    /// a batch that already holds other operations.
    #[must_use]
    pub fn rebased(self, offset: usize) -> Self {
        match self {
            Operation::Insert {
                parent: ParentRef::PendingWithinBatch(index),
                row,
            } => Operation::Insert {
                parent: ParentRef::PendingWithinBatch(index + offset),
                row,
            },
            other => other,
        }
    }

    /// Check if this creates a parent record.
    pub fn is_parent_insert(&self) -> bool {
        matches!(self, Operation::InsertParent { .. })
    }
}
