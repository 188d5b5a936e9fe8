//! Sync run settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::{ConfigurationError, SyncError};
use crate::mapping::MappingConfiguration;
use crate::operation::SyncAccount;
use crate::traits::{SearchRequest, SearchScope};

/// Filter selecting person entries.
pub const DEFAULT_FILTER: &str = "(objectClass=inetOrgPerson)";

/// Settings of one sync target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Account stamped on every parent record.
    pub account: SyncAccount,

    /// Search base. When unset the first naming context of the server is used.
    #[serde(default)]
    pub base_dn: Option<String>,

    /// Search scope.
    #[serde(default)]
    pub scope: SearchScope,

    /// Search filter.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Pending operations that trigger a commit.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Mapping file. When unset the built-in mapping is used.
    #[serde(default)]
    pub mapping_path: Option<PathBuf>,
}

fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl SyncSettings {
    /// Create settings with defaults for everything but the account.
    pub fn new(account: SyncAccount) -> Self {
        Self {
            account,
            base_dn: None,
            scope: SearchScope::default(),
            filter: default_filter(),
            batch_size: default_batch_size(),
            mapping_path: None,
        }
    }

    /// Parse settings from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Set the search base.
    #[must_use]
    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = Some(base_dn.into());
        self
    }

    /// Set the mapping file.
    #[must_use]
    pub fn with_mapping_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mapping_path = Some(path.into());
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.account.name.trim().is_empty() {
            return Err(SyncError::configuration("account name must not be empty"));
        }
        if self.account.account_type.trim().is_empty() {
            return Err(SyncError::configuration("account type must not be empty"));
        }
        if self.filter.trim().is_empty() {
            return Err(SyncError::configuration("search filter must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(SyncError::configuration("batch size must be at least 1"));
        }
        Ok(())
    }

    /// Load the configured mapping, or the built-in one.
    pub fn load_mapping(&self) -> Result<MappingConfiguration, ConfigurationError> {
        match &self.mapping_path {
            Some(path) => crate::mapping::load_file(path),
            None => MappingConfiguration::basic(),
        }
    }

    /// Search request for a resolved base DN.
    pub fn search_request(&self, base_dn: impl Into<String>) -> SearchRequest {
        SearchRequest::new(base_dn, self.scope, self.filter.clone())
    }
}
