//! Sync run tests
//!
//! Drives full sync runs against a scripted directory and the in-memory
//! record store:
//! - insert then replace across repeated runs
//! - per-entry lookup failures and per-batch commit failures
//! - authentication vs I/O failure classification
//! - cancellation between entries
//! - mapping configuration failures

mod common;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ldapsync::prelude::*;

// =============================================================================
// Scripted directory
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectBehavior {
    Success,
    InvalidCredentials,
    Unreachable,
}

/// Directory connector serving a fixed list of entries.
struct MockDirectory {
    entries: Vec<DirectoryEntry>,
    naming_contexts: Vec<String>,
    connect: ConnectBehavior,
    /// Fail the search after this many entries.
    fail_search_after: Option<usize>,
    /// Base DNs whose search is refused outright.
    refused_bases: Vec<String>,
    /// Cancel this token after this many entries.
    cancel_after: Option<(usize, CancellationToken)>,
    searches: Arc<Mutex<Vec<SearchRequest>>>,
    closed: Arc<AtomicBool>,
}

impl MockDirectory {
    fn new(entries: Vec<DirectoryEntry>) -> Self {
        common::init_test_logging();
        Self {
            entries,
            naming_contexts: vec!["dc=example".to_string()],
            connect: ConnectBehavior::Success,
            fail_search_after: None,
            refused_bases: Vec::new(),
            cancel_after: None,
            searches: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn searches(&self) -> Vec<SearchRequest> {
        self.searches.lock().clone()
    }

    fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryConnector for MockDirectory {
    async fn connect(&self) -> DirectoryResult<Box<dyn DirectorySession>> {
        match self.connect {
            ConnectBehavior::Success => Ok(Box::new(MockSession {
                entries: self.entries.clone(),
                naming_contexts: self.naming_contexts.clone(),
                fail_search_after: self.fail_search_after,
                refused_bases: self.refused_bases.clone(),
                cancel_after: self.cancel_after.clone(),
                searches: Arc::clone(&self.searches),
                closed: Arc::clone(&self.closed),
            })),
            ConnectBehavior::InvalidCredentials => {
                Err(DirectoryError::authentication("invalid credentials (49)"))
            }
            ConnectBehavior::Unreachable => Err(DirectoryError::connection(
                "ldap.example.com:389: connection refused",
            )),
        }
    }
}

struct MockSession {
    entries: Vec<DirectoryEntry>,
    naming_contexts: Vec<String>,
    fail_search_after: Option<usize>,
    refused_bases: Vec<String>,
    cancel_after: Option<(usize, CancellationToken)>,
    searches: Arc<Mutex<Vec<SearchRequest>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl DirectorySession for MockSession {
    async fn naming_contexts(&mut self) -> DirectoryResult<Vec<String>> {
        Ok(self.naming_contexts.clone())
    }

    async fn search<'a>(
        &'a mut self,
        request: &SearchRequest,
    ) -> DirectoryResult<Box<dyn EntryStream + 'a>> {
        self.searches.lock().push(request.clone());
        if self.refused_bases.contains(&request.base_dn) {
            return Err(DirectoryError::search("no such object (32)"));
        }
        let suffix = format!(",{}", request.base_dn.to_lowercase());
        let entries: Vec<_> = self
            .entries
            .iter()
            .filter(|e| request.base_dn.is_empty() || e.dn().to_lowercase().ends_with(&suffix))
            .cloned()
            .collect();
        Ok(Box::new(MockStream {
            entries: entries.into(),
            yielded: 0,
            fail_after: self.fail_search_after,
            cancel_after: self.cancel_after.clone(),
        }))
    }

    async fn close(&mut self) -> DirectoryResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockStream {
    entries: VecDeque<DirectoryEntry>,
    yielded: usize,
    fail_after: Option<usize>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl MockStream {
    fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            entries: entries.into(),
            yielded: 0,
            fail_after: None,
            cancel_after: None,
        }
    }
}

#[async_trait]
impl EntryStream for MockStream {
    async fn next_entry(&mut self) -> DirectoryResult<Option<DirectoryEntry>> {
        if self.fail_after == Some(self.yielded) {
            return Err(DirectoryError::search("server went away"));
        }
        let next = self.entries.pop_front();
        if next.is_some() {
            self.yielded += 1;
        }
        if let Some((after, token)) = &self.cancel_after {
            if self.yielded == *after {
                token.cancel();
            }
        }
        Ok(next)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn person(uid: &str) -> DirectoryEntry {
    DirectoryEntry::new(format!("uid={uid},ou=people,dc=example"))
        .with("cn", format!("{uid} Example"))
        .with("sn", "Example")
        .with_values(
            "mail",
            [format!("{uid}@example.com"), format!("{uid}@mail.example.com")],
        )
        .with("telephoneNumber", "+44 161 000 0000")
        .with_values("objectClass", ["top", "person", "inetOrgPerson"])
}

fn people(count: usize) -> Vec<DirectoryEntry> {
    (0..count).map(|i| person(&format!("user{i}"))).collect()
}

fn runner() -> SyncRunner {
    common::init_test_logging();
    SyncRunner::new(SyncSettings::new(SyncAccount::new("ldap.example.com"))).unwrap()
}

fn runner_with_batch_size(batch_size: usize) -> SyncRunner {
    common::init_test_logging();
    SyncRunner::new(
        SyncSettings::new(SyncAccount::new("ldap.example.com")).with_batch_size(batch_size),
    )
    .unwrap()
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_repeated_runs_converge() {
    let directory = MockDirectory::new(people(7));
    let store = MemoryRecordStore::new();
    let runner = runner_with_batch_size(10);

    let first = runner
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;
    assert_eq!(first.inserts, 7);
    assert_eq!(first.updates, 0);
    assert!(!first.has_soft_error());
    assert!(!first.has_hard_error());
    let after_first = store.snapshot();

    let second = runner
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;
    assert_eq!(second.inserts, 0);
    assert_eq!(second.updates, 7);
    assert_eq!(store.parent_count(), 7);
    assert_eq!(store.snapshot(), after_first);
    assert!(directory.was_closed());
}

#[tokio::test]
async fn test_every_value_reaches_the_store() {
    let entry = person("jdoe").with("x-badge", vec![0xde, 0xad, 0xbe, 0xef]);
    let directory = MockDirectory::new(vec![entry.clone()]);
    let store = MemoryRecordStore::new();

    let stats = runner()
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;
    assert_eq!(stats.inserts, 1);

    let id = store.record_for(entry.dn()).unwrap();
    let rows = store.rows_for(id);
    let rebuilt = MappingConfiguration::basic()
        .unwrap()
        .rebuild_entry(entry.dn(), &rows);

    for attribute in entry.attributes() {
        let restored = rebuilt.attribute(attribute.name()).unwrap();
        let original: Vec<&[u8]> = attribute.values().iter().map(AttributeValue::as_bytes).collect();
        let restored: Vec<&[u8]> = restored.values().iter().map(AttributeValue::as_bytes).collect();
        assert_eq!(original, restored, "{}", attribute.name());
    }
    assert_eq!(rebuilt.value_count(), entry.value_count());
}

#[tokio::test]
async fn test_parent_carries_account_and_dn() {
    let directory = MockDirectory::new(people(1));
    let store = MemoryRecordStore::new();

    runner()
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    let id = store.record_for("uid=user0,ou=people,dc=example").unwrap();
    let parent = store.parent(id).unwrap();
    assert_eq!(parent.account, SyncAccount::new("ldap.example.com"));
    assert_eq!(parent.source_key, "uid=user0,ou=people,dc=example");
}

#[tokio::test]
async fn test_mapping_scenario() {
    let mapping = ldapsync::mapping::load(
        r#"<ldapsyncmapping>
             <row type="StructuredName">
               <field column="DISPLAY_NAME" typeattr="CONTENT_ITEM_TYPE"/>
             </row>
             <row type="Email">
               <field column="DATA" ldapattr="mail"/>
             </row>
           </ldapsyncmapping>"#,
    )
    .unwrap();
    let entry = DirectoryEntry::new("uid=jdoe,ou=people,dc=example")
        .with("cn", "John Doe")
        .with_values("mail", ["jdoe@example.com", "j@example.com"])
        .with("jpegPhoto", vec![0xff, 0xd8, 0xff]);

    let store = MemoryRecordStore::new();
    let account = SyncAccount::new("ldap.example.com");
    let mut driver = ReconciliationDriver::new(&mapping, &account, &store, 50);
    let mut stats = SyncStats::default();
    let mut stream = MockStream::new(vec![entry]);

    let outcome = driver
        .run(&mut stream, &mut stats, &CancellationToken::new())
        .await;
    assert_eq!(outcome, RunOutcome::Completed);

    let id = store.record_for("uid=jdoe,ou=people,dc=example").unwrap();
    let rows = store.rows_for(id);
    let types: Vec<&str> = rows.iter().map(DataRow::content_type).collect();
    assert_eq!(
        types,
        vec![
            RecordKind::StructuredName.content_item_type(),
            RecordKind::Email.content_item_type(),
            RecordKind::Email.content_item_type(),
            ldapsync::kinds::FALLBACK_CONTENT_TYPE,
            ldapsync::kinds::FALLBACK_CONTENT_TYPE,
        ]
    );
    assert_eq!(
        rows[1].get("data1"),
        Some(&ColumnValue::from("jdoe@example.com"))
    );
    assert_eq!(rows[2].get("data1"), Some(&ColumnValue::from("j@example.com")));

    let fallback: Vec<(&str, usize)> = rows
        .iter()
        .filter_map(DataRow::as_fallback)
        .map(|(name, index, _)| (name, index))
        .collect();
    assert_eq!(fallback, vec![("cn", 0), ("jpegPhoto", 0)]);
}

// =============================================================================
// Store failures
// =============================================================================

#[tokio::test]
async fn test_lookup_failure_skips_entry() {
    let directory = MockDirectory::new(people(3));
    let store = MemoryRecordStore::new();
    store.fail_lookup("uid=user1,ou=people,dc=example");

    let stats = runner()
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    assert!(stats.database_error);
    assert_eq!(stats.skipped_entries, 1);
    assert_eq!(stats.inserts, 2);
    assert_eq!(stats.entries_seen, 3);
    assert!(store.record_for("uid=user0,ou=people,dc=example").is_some());
    assert!(store.record_for("uid=user1,ou=people,dc=example").is_none());
    assert!(store.record_for("uid=user2,ou=people,dc=example").is_some());
}

#[tokio::test]
async fn test_commit_failure_discards_only_that_batch() {
    let directory = MockDirectory::new(people(4));
    let store = MemoryRecordStore::new();
    store.fail_next_commits(1);

    // Each person expands to well over one operation, so every entry fills
    // a batch on its own.
    let stats = runner_with_batch_size(1)
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    assert!(stats.database_error);
    assert_eq!(stats.batches_failed, 1);
    assert_eq!(stats.batches_committed, 3);
    assert_eq!(stats.skipped_entries, 1);
    // The lost entry was counted when queued and stays counted.
    assert_eq!(stats.entries_synced(), 4);
    assert_eq!(stats.entries_synced() - stats.skipped_entries, store.parent_count() as u64);
    assert_eq!(store.parent_count(), 3);
    assert!(store.record_for("uid=user0,ou=people,dc=example").is_none());
    assert!(!stats.has_hard_error());
}

// =============================================================================
// Directory failures
// =============================================================================

#[tokio::test]
async fn test_invalid_credentials_counted_as_auth_failure() {
    let mut directory = MockDirectory::new(people(2));
    directory.connect = ConnectBehavior::InvalidCredentials;
    let store = MemoryRecordStore::new();

    let stats = runner()
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    assert_eq!(stats.auth_exceptions, 1);
    assert_eq!(stats.io_exceptions, 0);
    assert_eq!(stats.entries_seen, 0);
    assert_eq!(store.parent_count(), 0);
}

#[tokio::test]
async fn test_unreachable_server_counted_as_io_failure() {
    let mut directory = MockDirectory::new(people(2));
    directory.connect = ConnectBehavior::Unreachable;
    let store = MemoryRecordStore::new();

    let stats = runner()
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    assert_eq!(stats.io_exceptions, 1);
    assert_eq!(stats.auth_exceptions, 0);
    assert!(stats.has_hard_error());
}

#[tokio::test]
async fn test_search_failure_keeps_earlier_entries() {
    let mut directory = MockDirectory::new(people(5));
    directory.fail_search_after = Some(3);
    let store = MemoryRecordStore::new();

    let stats = runner()
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    assert_eq!(stats.io_exceptions, 1);
    assert_eq!(stats.inserts, 3);
    assert_eq!(store.parent_count(), 3);
    assert!(directory.was_closed());
}

#[tokio::test]
async fn test_base_dn_from_naming_context() {
    let directory = MockDirectory::new(people(1));
    let store = MemoryRecordStore::new();

    runner()
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    let searches = directory.searches();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].base_dn, "dc=example");
    assert_eq!(searches[0].filter, "(objectClass=inetOrgPerson)");
    assert_eq!(searches[0].scope, SearchScope::Subtree);
}

#[tokio::test]
async fn test_configured_base_dn_wins() {
    let mut directory = MockDirectory::new(people(1));
    directory.naming_contexts.clear();
    let store = MemoryRecordStore::new();
    let runner = SyncRunner::new(
        SyncSettings::new(SyncAccount::new("ldap.example.com"))
            .with_base_dn("ou=people,dc=example"),
    )
    .unwrap();

    let stats = runner
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    assert_eq!(stats.inserts, 1);
    assert_eq!(directory.searches()[0].base_dn, "ou=people,dc=example");
}

#[tokio::test]
async fn test_missing_naming_context() {
    let mut directory = MockDirectory::new(people(1));
    directory.naming_contexts.clear();
    let store = MemoryRecordStore::new();

    let stats = runner()
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    assert_eq!(stats.io_exceptions, 1);
    assert!(directory.searches().is_empty());
    assert!(directory.was_closed());
}

#[tokio::test]
async fn test_test_connection_lists_entries() {
    let directory = MockDirectory::new(people(2));

    let dns = directory.test_connection(None).await.unwrap();
    assert_eq!(
        dns,
        vec![
            "uid=user0,ou=people,dc=example".to_string(),
            "uid=user1,ou=people,dc=example".to_string(),
        ]
    );
    assert_eq!(directory.searches()[0].filter, "(objectClass=inetOrgPerson)");
    assert!(directory.was_closed());

    let mut directory = MockDirectory::new(Vec::new());
    directory.connect = ConnectBehavior::InvalidCredentials;
    let err = directory.test_connection(None).await.unwrap_err();
    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_test_connection_searches_every_naming_context() {
    let mut entries = people(1);
    entries.push(DirectoryEntry::new("uid=guest,ou=people,dc=other").with("cn", "Guest"));
    let mut directory = MockDirectory::new(entries);
    directory.naming_contexts = vec![
        "dc=example".to_string(),
        "dc=broken".to_string(),
        "dc=other".to_string(),
    ];
    directory.refused_bases = vec!["dc=broken".to_string()];

    let dns = directory.test_connection(None).await.unwrap();

    assert_eq!(
        dns,
        vec![
            "uid=user0,ou=people,dc=example".to_string(),
            "uid=guest,ou=people,dc=other".to_string(),
        ]
    );
    let searches = directory.searches();
    let bases: Vec<_> = searches.iter().map(|s| s.base_dn.as_str()).collect();
    assert_eq!(bases, vec!["dc=example", "dc=broken", "dc=other"]);
    assert!(searches
        .iter()
        .all(|s| s.filter == "(objectClass=inetOrgPerson)" && s.scope == SearchScope::Subtree));
    assert!(directory.was_closed());
}

#[tokio::test]
async fn test_test_connection_without_naming_contexts() {
    let mut directory = MockDirectory::new(people(2));
    directory.naming_contexts.clear();

    let dns = directory.test_connection(None).await.unwrap();

    assert!(dns.is_empty());
    assert!(directory.searches().is_empty());
    assert!(directory.was_closed());
}

#[tokio::test]
async fn test_test_connection_with_base_dn() {
    let directory = MockDirectory::new(people(1));

    let dns = directory
        .test_connection(Some("ou=people,dc=example"))
        .await
        .unwrap();

    assert_eq!(dns, vec!["uid=user0,ou=people,dc=example".to_string()]);
    assert_eq!(directory.searches().len(), 1);
    assert_eq!(directory.searches()[0].base_dn, "ou=people,dc=example");
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_between_entries() {
    let cancel = CancellationToken::new();
    let mut directory = MockDirectory::new(people(6));
    directory.cancel_after = Some((2, cancel.clone()));
    let store = MemoryRecordStore::new();

    let stats = runner().perform_sync(&directory, &store, &cancel).await;

    assert_eq!(stats.entries_seen, 2);
    assert_eq!(stats.inserts, 2);
    // Operations built before the cancellation are still committed.
    assert_eq!(store.parent_count(), 2);
    assert!(!stats.has_hard_error());
    assert!(directory.was_closed());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let directory = MockDirectory::new(people(3));
    let store = MemoryRecordStore::new();

    let stats = runner().perform_sync(&directory, &store, &cancel).await;

    assert_eq!(stats.entries_seen, 0);
    assert!(directory.searches().is_empty());
}

// =============================================================================
// Mapping configuration
// =============================================================================

#[tokio::test]
async fn test_empty_mapping_aborts_run() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("mapping.xml");
    std::fs::write(&path, "<ldapsyncmapping/>").unwrap();

    let directory = MockDirectory::new(people(2));
    let store = MemoryRecordStore::new();
    let runner = SyncRunner::new(
        SyncSettings::new(SyncAccount::new("ldap.example.com")).with_mapping_path(&path),
    )
    .unwrap();

    let stats = runner
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    assert!(stats.database_error);
    assert!(directory.searches().is_empty());
    assert_eq!(store.parent_count(), 0);
}

#[tokio::test]
async fn test_invalid_mapping_aborts_before_directory_contact() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("mapping.xml");
    std::fs::write(
        &path,
        r#"<ldapsyncmapping><row type="Email"><field column="DATA"/></row></ldapsyncmapping>"#,
    )
    .unwrap();

    let err = ldapsync::mapping::load_file(&path).unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingSource { .. }));
    assert_eq!(err.row_kind(), Some("Email"));

    let directory = MockDirectory::new(people(2));
    let store = MemoryRecordStore::new();
    let runner = SyncRunner::new(
        SyncSettings::new(SyncAccount::new("ldap.example.com")).with_mapping_path(&path),
    )
    .unwrap();

    let stats = runner
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    assert!(stats.database_error);
    assert!(directory.searches().is_empty());
    assert!(!directory.was_closed());
}

#[tokio::test]
async fn test_custom_mapping_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("mapping.xml");
    std::fs::write(
        &path,
        r#"<ldapsyncmapping>
             <row type="Phone">
               <field column="NUMBER" ldapattr="telephoneNumber"/>
               <field column="TYPE" typeattr="TYPE_MOBILE"/>
             </row>
           </ldapsyncmapping>"#,
    )
    .unwrap();

    let directory = MockDirectory::new(people(1));
    let store = MemoryRecordStore::new();
    let runner = SyncRunner::new(
        SyncSettings::new(SyncAccount::new("ldap.example.com")).with_mapping_path(&path),
    )
    .unwrap();

    runner
        .perform_sync(&directory, &store, &CancellationToken::new())
        .await;

    let id = store.record_for("uid=user0,ou=people,dc=example").unwrap();
    let rows = store.rows_for(id);
    let phone = rows
        .iter()
        .find(|row| row.content_type() == RecordKind::Phone.content_item_type())
        .unwrap();
    assert_eq!(phone.get("data2"), Some(&ColumnValue::from("2")));
    assert!(rows
        .iter()
        .filter_map(DataRow::as_fallback)
        .any(|(name, _, _)| name == "mail"));
}
