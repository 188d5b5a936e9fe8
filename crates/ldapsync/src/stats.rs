//! Sync run statistics
//!
//! Every expected failure of a sync run is reported here rather than as an
//! error value. A fresh [`SyncStats`] is created per run and read by the
//! caller once the run returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters accumulated over one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Entries that created a new parent record.
    #[serde(default)]
    pub inserts: u64,
    /// Entries that replaced the rows of an existing parent record.
    #[serde(default)]
    pub updates: u64,
    /// Entries whose operations never reached the store.
    #[serde(default)]
    pub skipped_entries: u64,
    /// Directory connection or search failures.
    #[serde(default)]
    pub io_exceptions: u64,
    /// Directory credential rejections.
    #[serde(default)]
    pub auth_exceptions: u64,
    /// Set when the local store or the mapping configuration failed.
    #[serde(default)]
    pub database_error: bool,
    /// Entries received from the directory.
    #[serde(default)]
    pub entries_seen: u64,
    /// Batches applied to the store.
    #[serde(default)]
    pub batches_committed: u64,
    /// Batches the store rejected.
    #[serde(default)]
    pub batches_failed: u64,
    /// Operations applied to the store.
    #[serde(default)]
    pub operations_committed: u64,
    /// Operations dropped with a rejected batch.
    #[serde(default)]
    pub operations_discarded: u64,
    /// When the run started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncStats {
    /// Create empty statistics stamped with the current time.
    #[must_use]
    pub fn started() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Stamp the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Whether the run aborted on a directory failure.
    #[must_use]
    pub fn has_hard_error(&self) -> bool {
        self.io_exceptions > 0 || self.auth_exceptions > 0
    }

    /// Whether some entries or batches were lost.
    #[must_use]
    pub fn has_soft_error(&self) -> bool {
        self.database_error || self.skipped_entries > 0
    }

    /// Entries whose operations were queued for the store, as inserts or
    /// updates. Counted before commit: entries lost with a failed batch are
    /// also counted in `skipped_entries`.
    #[must_use]
    pub fn entries_synced(&self) -> u64 {
        self.inserts + self.updates
    }

    /// Wall-clock duration of the run, if it has finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

impl std::fmt::Display for SyncStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inserts={} updates={} skipped={} io_errors={} auth_errors={} database_error={}",
            self.inserts,
            self.updates,
            self.skipped_entries,
            self.io_exceptions,
            self.auth_exceptions,
            self.database_error
        )
    }
}
