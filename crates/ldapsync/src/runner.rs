//! Sync run orchestration
//!
//! One call to [`SyncRunner::perform_sync`] is one full sync run: load the
//! mapping, connect, resolve the search base, reconcile every entry and
//! close the session. Expected failures end up in the returned
//! [`SyncStats`]; nothing is returned as an error.

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::SyncSettings;
use crate::error::{DirectoryError, SyncError};
use crate::mapping::MappingConfiguration;
use crate::reconcile::{ReconciliationDriver, RunOutcome};
use crate::stats::SyncStats;
use crate::traits::{DirectoryConnector, DirectorySession, RecordStore};

/// Runs full syncs for one account.
#[derive(Debug, Clone)]
pub struct SyncRunner {
    settings: SyncSettings,
}

impl SyncRunner {
    /// Create a runner from validated settings.
    pub fn new(settings: SyncSettings) -> Result<Self, SyncError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Settings of this runner.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run one full sync.
    #[instrument(skip_all, fields(account = %self.settings.account.name))]
    pub async fn perform_sync<C, S>(
        &self,
        connector: &C,
        store: &S,
        cancel: &CancellationToken,
    ) -> SyncStats
    where
        C: DirectoryConnector + ?Sized,
        S: RecordStore + ?Sized,
    {
        let mut stats = SyncStats::started();
        info!("Starting sync");

        let mapping = match self.settings.load_mapping() {
            Ok(mapping) if mapping.is_empty() => {
                error!("Mapping configuration has no rows");
                stats.database_error = true;
                stats.finish();
                return stats;
            }
            Ok(mapping) => mapping,
            Err(e) => {
                error!(error = %e, "Failed to load mapping configuration");
                stats.database_error = true;
                stats.finish();
                return stats;
            }
        };

        if cancel.is_cancelled() {
            info!("Sync cancelled before connecting");
            stats.finish();
            return stats;
        }

        let mut session = match connector.connect().await {
            Ok(session) => session,
            Err(e) => {
                record_directory_error(&mut stats, &e);
                stats.finish();
                return stats;
            }
        };

        self.sync_session(&mut session, &mapping, store, &mut stats, cancel)
            .await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close directory session");
        }

        stats.finish();
        info!(
            inserts = stats.inserts,
            updates = stats.updates,
            skipped = stats.skipped_entries,
            io_exceptions = stats.io_exceptions,
            auth_exceptions = stats.auth_exceptions,
            database_error = stats.database_error,
            "Sync finished"
        );
        stats
    }

    async fn sync_session<S: RecordStore + ?Sized>(
        &self,
        session: &mut Box<dyn DirectorySession>,
        mapping: &MappingConfiguration,
        store: &S,
        stats: &mut SyncStats,
        cancel: &CancellationToken,
    ) -> Option<RunOutcome> {
        let base_dn = match self.resolve_base_dn(session).await {
            Ok(base_dn) => base_dn,
            Err(e) => {
                record_directory_error(stats, &e);
                return None;
            }
        };
        let request = self.settings.search_request(base_dn);
        info!(base_dn = %request.base_dn, filter = %request.filter, "Searching directory");

        let mut entries = match session.search(&request).await {
            Ok(entries) => entries,
            Err(e) => {
                record_directory_error(stats, &e);
                return None;
            }
        };

        let mut driver = ReconciliationDriver::new(
            mapping,
            &self.settings.account,
            store,
            self.settings.batch_size,
        );
        Some(driver.run(entries.as_mut(), stats, cancel).await)
    }

    async fn resolve_base_dn(
        &self,
        session: &mut Box<dyn DirectorySession>,
    ) -> Result<String, DirectoryError> {
        if let Some(base_dn) = &self.settings.base_dn {
            return Ok(base_dn.clone());
        }
        session
            .naming_contexts()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::search("server advertises no naming context"))
    }
}

fn record_directory_error(stats: &mut SyncStats, e: &DirectoryError) {
    if e.is_authentication() {
        error!(error = %e, "Directory rejected credentials");
        stats.auth_exceptions += 1;
    } else {
        error!(error = %e, "Directory operation failed");
        stats.io_exceptions += 1;
    }
}
