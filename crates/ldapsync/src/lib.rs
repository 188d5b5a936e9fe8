//! # ldapsync
//!
//! Mapping and reconciliation engine that copies person entries from a
//! directory server into a local contact store.
//!
//! ## Architecture
//!
//! - [`MappingConfiguration`](mapping::MappingConfiguration) - Declarative
//!   rules turning an entry into typed rows, loaded from markup
//! - [`ReconciliationDriver`](reconcile::ReconciliationDriver) - Matches
//!   entries to local records by DN and builds insert or replace operations
//! - [`BatchCommitter`](batch::BatchCommitter) - Applies operations in
//!   bounded all-or-nothing batches
//! - [`SyncRunner`](runner::SyncRunner) - One full sync run from connect to
//!   close
//!
//! The directory and the store are reached only through the
//! [`DirectoryConnector`](traits::DirectoryConnector) and
//! [`RecordStore`](traits::RecordStore) traits.
//!
//! ## Example
//!
//! ```ignore
//! use ldapsync::prelude::*;
//!
//! let settings = SyncSettings::new(SyncAccount::new("ldap.example.com"));
//! let runner = SyncRunner::new(settings)?;
//!
//! let stats = runner
//!     .perform_sync(&connector, &store, &CancellationToken::new())
//!     .await;
//! println!("{stats}");
//! ```
//!
//! ## Mapping format
//!
//! ```xml
//! <ldapsyncmapping>
//!   <row type="Phone">
//!     <field column="NUMBER" ldapattr="mobile"/>
//!     <field column="TYPE" typeattr="TYPE_MOBILE"/>
//!   </row>
//! </ldapsyncmapping>
//! ```
//!
//! Attribute values that no row consumes are stored verbatim as fallback
//! rows, so every value of every entry reaches the store.

pub mod batch;
pub mod config;
pub mod entry;
pub mod error;
pub mod kinds;
pub mod mapping;
pub mod operation;
pub mod reconcile;
pub mod runner;
pub mod stats;
pub mod store;
pub mod traits;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::batch::{BatchCommitter, DEFAULT_BATCH_SIZE};
    pub use crate::config::SyncSettings;
    pub use crate::entry::{Attribute, AttributeValue, DirectoryEntry};
    pub use crate::error::{
        ConfigurationError, DirectoryError, DirectoryResult, StoreError, StoreResult, SyncError,
    };
    pub use crate::kinds::RecordKind;
    pub use crate::mapping::{FieldRule, FieldSource, MappingConfiguration, RecordTemplate};
    pub use crate::operation::{ColumnValue, DataRow, Operation, ParentRef, RecordId, SyncAccount};
    pub use crate::reconcile::{ReconciliationDriver, RunOutcome};
    pub use crate::runner::SyncRunner;
    pub use crate::stats::SyncStats;
    pub use crate::store::MemoryRecordStore;
    pub use crate::traits::{
        DirectoryConnector, DirectorySession, EntryStream, RecordStore, SearchRequest, SearchScope,
    };

    pub use tokio_util::sync::CancellationToken;
}

// Re-export async_trait for collaborator implementors
pub use async_trait::async_trait;
