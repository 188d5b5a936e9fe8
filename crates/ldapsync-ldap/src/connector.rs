//! LDAP directory connector
//!
//! Opens connections with the configured transport security and binds with
//! the configured credentials.

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use ldapsync::error::{DirectoryError, DirectoryResult, SyncError};
use ldapsync::traits::{DirectoryConnector, DirectorySession};

use crate::config::LdapSettings;
use crate::session::LdapSession;

/// LDAP result code for rejected credentials.
const INVALID_CREDENTIALS: u32 = 49;

/// Connects to one directory server.
#[derive(Debug, Clone)]
pub struct LdapDirectoryConnector {
    settings: LdapSettings,
    url: String,
}

impl LdapDirectoryConnector {
    /// Create a connector from validated settings.
    pub fn new(settings: LdapSettings) -> Result<Self, SyncError> {
        settings.validate()?;
        let url = settings.url()?;
        Ok(Self { settings, url })
    }

    /// Connection URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Settings of this connector.
    pub fn settings(&self) -> &LdapSettings {
        &self.settings
    }

    fn conn_settings(&self) -> LdapConnSettings {
        let security = self.settings.security;
        if !security.verifies_certificate() {
            warn!(
                target: "security",
                server = %self.settings.server,
                "TLS certificate verification is disabled for this server"
            );
        }
        LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.settings.connection_timeout_secs))
            .set_starttls(security.uses_starttls())
            .set_no_tls_verify(!security.verifies_certificate())
    }
}

#[async_trait]
impl DirectoryConnector for LdapDirectoryConnector {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&self) -> DirectoryResult<Box<dyn DirectorySession>> {
        debug!("Connecting to LDAP server");

        let (conn, mut ldap) = LdapConnAsync::with_settings(self.conn_settings(), &self.url)
            .await
            .map_err(|e| {
                DirectoryError::connection_with_source(
                    format!("Failed to connect to LDAP server at {}", self.url),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        if self.settings.is_anonymous() {
            debug!("Using anonymous connection");
        } else {
            let bind_dn = &self.settings.bind_dn;
            let password = self.settings.bind_password.as_deref().unwrap_or("");
            debug!(bind_dn = %bind_dn, "Performing LDAP bind");

            let result = ldap.simple_bind(bind_dn, password).await.map_err(|e| {
                DirectoryError::connection_with_source(
                    format!("LDAP bind failed for {bind_dn}"),
                    e,
                )
            })?;

            if result.rc == INVALID_CREDENTIALS {
                return Err(DirectoryError::authentication(format!(
                    "invalid credentials for {bind_dn}"
                )));
            }
            if result.rc != 0 {
                return Err(DirectoryError::connection(format!(
                    "LDAP bind failed with code {}: {}",
                    result.rc, result.text
                )));
            }
        }

        info!(server = %self.settings.server, "LDAP connection established");
        Ok(Box::new(LdapSession::new(ldap, self.settings.server.clone())))
    }
}
