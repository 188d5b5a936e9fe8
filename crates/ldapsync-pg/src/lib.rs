//! # ldapsync-pg
//!
//! PostgreSQL [`RecordStore`](ldapsync::traits::RecordStore) for the
//! `ldapsync` engine.
//!
//! Every batch runs in one transaction. Rows referring to a parent created
//! earlier in the same batch are linked through the id returned by its
//! insert.
//!
//! ## Example
//!
//! ```ignore
//! use ldapsync::prelude::*;
//! use ldapsync_pg::PgRecordStore;
//!
//! let account = SyncAccount::new("ldap.example.com");
//! let store = PgRecordStore::connect(&database_url, account).await?;
//! store.migrate().await?;
//! ```

pub mod store;

pub use store::{PgRecordStore, BLOB_COLUMN, DATA_COLUMNS};
