//! LDAP directory session
//!
//! A bound [`Ldap`] handle serving root DSE reads and streaming searches.

use async_trait::async_trait;
use ldap3::{Ldap, Scope, SearchEntry, SearchStream};
use tracing::{debug, instrument, warn};

use ldapsync::entry::{AttributeValue, DirectoryEntry};
use ldapsync::error::{DirectoryError, DirectoryResult};
use ldapsync::traits::{DirectorySession, EntryStream, SearchRequest, SearchScope};

const NAMING_CONTEXTS: &str = "namingContexts";

/// A bound connection to one directory server.
pub struct LdapSession {
    ldap: Ldap,
    server: String,
}

impl LdapSession {
    pub(crate) fn new(ldap: Ldap, server: impl Into<String>) -> Self {
        Self {
            ldap,
            server: server.into(),
        }
    }
}

impl std::fmt::Debug for LdapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSession")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    #[instrument(skip(self), fields(server = %self.server))]
    async fn naming_contexts(&mut self) -> DirectoryResult<Vec<String>> {
        let result = self
            .ldap
            .search("", Scope::Base, "(objectClass=*)", vec![NAMING_CONTEXTS])
            .await
            .map_err(|e| DirectoryError::search_with_source("Failed to read root DSE", e))?;

        let (entries, _) = result
            .success()
            .map_err(|e| DirectoryError::search_with_source("Root DSE search failed", e))?;

        let contexts: Vec<String> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .flat_map(|entry| {
                entry
                    .attrs
                    .into_iter()
                    .filter(|(name, _)| name.eq_ignore_ascii_case(NAMING_CONTEXTS))
                    .flat_map(|(_, values)| values)
            })
            .collect();

        debug!(contexts = ?contexts, "Read naming contexts");
        Ok(contexts)
    }

    #[instrument(skip(self, request), fields(server = %self.server, base_dn = %request.base_dn))]
    async fn search<'a>(
        &'a mut self,
        request: &SearchRequest,
    ) -> DirectoryResult<Box<dyn EntryStream + 'a>> {
        let stream = self
            .ldap
            .streaming_search(
                &request.base_dn,
                scope(request.scope),
                &request.filter,
                vec!["*".to_string()],
            )
            .await
            .map_err(|e| {
                DirectoryError::search_with_source(
                    format!("Failed to search under '{}'", request.base_dn),
                    e,
                )
            })?;

        Ok(Box::new(LdapEntryStream {
            stream: Some(stream),
            returned: 0,
        }))
    }

    async fn close(&mut self) -> DirectoryResult<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| DirectoryError::connection_with_source("LDAP unbind failed", e))
    }
}

/// Entries of one streaming search.
struct LdapEntryStream {
    stream: Option<SearchStream<'static, String, Vec<String>>>,
    returned: u64,
}

#[async_trait]
impl EntryStream for LdapEntryStream {
    async fn next_entry(&mut self) -> DirectoryResult<Option<DirectoryEntry>> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };

            match stream.next().await {
                Ok(Some(entry)) => {
                    if entry.is_ref() || entry.is_intermediate() {
                        debug!("Skipping referral or intermediate message");
                        continue;
                    }
                    self.returned += 1;
                    return Ok(Some(entry_from_search(SearchEntry::construct(entry))));
                }
                Ok(None) => {
                    let Some(mut stream) = self.stream.take() else {
                        return Ok(None);
                    };
                    let result = stream.finish().await;
                    result.success().map_err(|e| {
                        DirectoryError::search_with_source("Search ended with an error", e)
                    })?;
                    debug!(entries = self.returned, "Search completed");
                    return Ok(None);
                }
                Err(e) => {
                    warn!(error = %e, entries = self.returned, "Search interrupted");
                    self.stream = None;
                    return Err(DirectoryError::search_with_source("Search interrupted", e));
                }
            }
        }
    }
}

fn scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Convert a raw search entry.
///
/// Attributes are ordered by name; values keep the server's order. Values
/// the server returned as non-UTF-8 arrive in `bin_attrs` and become binary
/// values.
pub fn entry_from_search(entry: SearchEntry) -> DirectoryEntry {
    let mut attributes: Vec<(String, Vec<AttributeValue>)> = entry
        .attrs
        .into_iter()
        .map(|(name, values)| (name, values.into_iter().map(AttributeValue::Text).collect()))
        .chain(entry.bin_attrs.into_iter().map(|(name, values)| {
            (name, values.into_iter().map(AttributeValue::Binary).collect())
        }))
        .collect();
    attributes.sort_by(|a, b| a.0.cmp(&b.0));

    attributes
        .into_iter()
        .fold(DirectoryEntry::new(entry.dn), |entry, (name, values)| {
            entry.with_values(name, values)
        })
}
