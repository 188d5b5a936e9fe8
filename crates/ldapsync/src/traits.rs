//! Collaborator traits
//!
//! The sync engine talks to the directory and to the local store only
//! through these traits. Implementations live in sibling crates
//! (`ldapsync-ldap`, `ldapsync-pg`) or in [`crate::store`] for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DEFAULT_FILTER;
use crate::entry::DirectoryEntry;
use crate::error::{DirectoryResult, StoreResult};
use crate::operation::{Operation, RecordId};

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Only the base entry.
    Base,
    /// Immediate children of the base entry.
    OneLevel,
    /// The base entry and everything below it.
    #[default]
    Subtree,
}

/// Parameters of one directory search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: SearchScope,
    pub filter: String,
}

impl SearchRequest {
    /// Create a search request.
    pub fn new(base_dn: impl Into<String>, scope: SearchScope, filter: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope,
            filter: filter.into(),
        }
    }
}

/// Lazily delivered search results.
///
/// Entries arrive in directory order. `Ok(None)` marks the successful end
/// of the search; an `Err` is the terminal status of a failed search.
#[async_trait]
pub trait EntryStream: Send {
    /// Fetch the next entry.
    async fn next_entry(&mut self) -> DirectoryResult<Option<DirectoryEntry>>;
}

/// A bound connection to a directory server.
#[async_trait]
pub trait DirectorySession: Send {
    /// Naming contexts advertised by the root DSE.
    async fn naming_contexts(&mut self) -> DirectoryResult<Vec<String>>;

    /// Start a search.
    ///
    /// The returned stream borrows the session; it must be drained or
    /// dropped before the session is used again.
    async fn search<'a>(
        &'a mut self,
        request: &SearchRequest,
    ) -> DirectoryResult<Box<dyn EntryStream + 'a>>;

    /// Unbind and close the connection.
    async fn close(&mut self) -> DirectoryResult<()>;
}

/// Opens directory sessions.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Connect and bind.
    ///
    /// Credential rejection must be reported as
    /// [`DirectoryError::Authentication`](crate::error::DirectoryError::Authentication)
    /// so it can be told apart from I/O failures.
    async fn connect(&self) -> DirectoryResult<Box<dyn DirectorySession>>;

    /// Connect, bind and list the DNs of the `inetOrgPerson` entries under
    /// every advertised naming context, or under `base_dn` when given.
    ///
    /// A naming context whose search fails is logged and skipped. A server
    /// advertising no naming contexts yields an empty list.
    async fn test_connection(&self, base_dn: Option<&str>) -> DirectoryResult<Vec<String>> {
        let mut session = self.connect().await?;
        let result = list_dns(&mut session, base_dn).await;
        let closed = session.close().await;
        let dns = result?;
        closed?;
        Ok(dns)
    }
}

async fn list_dns(
    session: &mut Box<dyn DirectorySession>,
    base_dn: Option<&str>,
) -> DirectoryResult<Vec<String>> {
    let bases = match base_dn {
        Some(dn) => vec![dn.to_string()],
        None => session.naming_contexts().await?,
    };

    let mut dns = Vec::new();
    for base in bases {
        let request = SearchRequest::new(base, SearchScope::Subtree, DEFAULT_FILTER);
        match search_dns(session, &request, &mut dns).await {
            Ok(()) => {}
            Err(e) if e.is_authentication() => return Err(e),
            Err(e) => {
                warn!(base_dn = %request.base_dn, error = %e, "Search of naming context failed");
            }
        }
    }
    Ok(dns)
}

async fn search_dns(
    session: &mut Box<dyn DirectorySession>,
    request: &SearchRequest,
    dns: &mut Vec<String>,
) -> DirectoryResult<()> {
    let mut stream = session.search(request).await?;
    while let Some(entry) = stream.next_entry().await? {
        dns.push(entry.dn().to_string());
    }
    Ok(())
}

/// The local store that synced records are written to.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Find the parent record previously created for `source_key`.
    async fn lookup(&self, source_key: &str) -> StoreResult<Option<RecordId>>;

    /// Apply every operation, or none of them.
    ///
    /// `ParentRef::PendingWithinBatch(i)` refers to the `InsertParent` at
    /// index `i` of `operations`.
    async fn apply_batch(&self, operations: &[Operation]) -> StoreResult<()>;
}
