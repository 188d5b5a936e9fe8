//! LDAP server settings

use serde::{Deserialize, Serialize};

use ldapsync::error::SyncError;

/// Transport security of the connection.
///
/// Deserialization also accepts the labels shown in account settings
/// screens ("TLS (any certificate)" and so on).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Plain LDAP.
    #[default]
    #[serde(alias = "None")]
    None,
    /// STARTTLS with certificate verification.
    #[serde(alias = "TLS")]
    Tls,
    /// STARTTLS accepting any certificate.
    #[serde(alias = "TLS (any certificate)")]
    TlsAnyCertificate,
    /// LDAPS with certificate verification.
    #[serde(alias = "SSL")]
    Ssl,
    /// LDAPS accepting any certificate.
    #[serde(alias = "SSL (any certificate)")]
    SslAnyCertificate,
}

impl SecurityMode {
    /// Every mode, in the order settings screens list them.
    pub const ALL: [SecurityMode; 5] = [
        SecurityMode::None,
        SecurityMode::Tls,
        SecurityMode::TlsAnyCertificate,
        SecurityMode::Ssl,
        SecurityMode::SslAnyCertificate,
    ];

    /// Label shown to users.
    pub fn label(self) -> &'static str {
        match self {
            SecurityMode::None => "None",
            SecurityMode::Tls => "TLS",
            SecurityMode::TlsAnyCertificate => "TLS (any certificate)",
            SecurityMode::Ssl => "SSL",
            SecurityMode::SslAnyCertificate => "SSL (any certificate)",
        }
    }

    /// Find a mode by its label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.label() == label)
    }

    /// Whether the connection is LDAPS from the first byte.
    pub fn uses_ssl(self) -> bool {
        matches!(self, SecurityMode::Ssl | SecurityMode::SslAnyCertificate)
    }

    /// Whether a plain connection is upgraded with STARTTLS.
    pub fn uses_starttls(self) -> bool {
        matches!(self, SecurityMode::Tls | SecurityMode::TlsAnyCertificate)
    }

    /// Whether the server certificate is checked.
    pub fn verifies_certificate(self) -> bool {
        !matches!(
            self,
            SecurityMode::TlsAnyCertificate | SecurityMode::SslAnyCertificate
        )
    }

    /// Port used when the server address has none.
    pub fn default_port(self) -> u16 {
        if self.uses_ssl() {
            636
        } else {
            389
        }
    }
}

/// Connection settings for one directory server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapSettings {
    /// `host` or `host:port`.
    pub server: String,

    /// Bind DN. Empty for an anonymous connection.
    #[serde(default)]
    pub bind_dn: String,

    /// Bind password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Transport security.
    #[serde(default)]
    pub security: SecurityMode,

    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl std::fmt::Debug for LdapSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSettings")
            .field("server", &self.server)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("security", &self.security)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .finish()
    }
}

fn default_connection_timeout() -> u64 {
    30
}

impl LdapSettings {
    /// Create settings for an anonymous plain connection.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            bind_dn: String::new(),
            bind_password: None,
            security: SecurityMode::None,
            connection_timeout_secs: default_connection_timeout(),
        }
    }

    /// Parse settings from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Set bind credentials.
    #[must_use]
    pub fn with_credentials(mut self, bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.bind_dn = bind_dn.into();
        self.bind_password = Some(password.into());
        self
    }

    /// Set transport security.
    #[must_use]
    pub fn with_security(mut self, security: SecurityMode) -> Self {
        self.security = security;
        self
    }

    /// Whether the connection binds anonymously.
    pub fn is_anonymous(&self) -> bool {
        self.bind_dn.is_empty()
    }

    /// Split `server` into host and port.
    pub fn host_port(&self) -> Result<(String, u16), SyncError> {
        let server = self.server.trim();
        if server.is_empty() {
            return Err(SyncError::configuration("server is required"));
        }

        let (host, port) = if let Some(rest) = server.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| SyncError::configuration(format!("invalid server '{server}'")))?;
            match after {
                "" => (host, None),
                _ => match after.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => {
                        return Err(SyncError::configuration(format!(
                            "invalid server '{server}'"
                        )))
                    }
                },
            }
        } else {
            match server.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => (host, Some(port)),
                _ => (server, None),
            }
        };

        if host.is_empty() {
            return Err(SyncError::configuration(format!(
                "server '{server}' has no host"
            )));
        }

        let port = match port {
            None => self.security.default_port(),
            Some(port) => port
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| SyncError::configuration(format!("invalid port '{port}'")))?,
        };

        Ok((host.to_string(), port))
    }

    /// Connection URL.
    pub fn url(&self) -> Result<String, SyncError> {
        let (host, port) = self.host_port()?;
        let scheme = if self.security.uses_ssl() { "ldaps" } else { "ldap" };
        if host.contains(':') {
            Ok(format!("{scheme}://[{host}]:{port}"))
        } else {
            Ok(format!("{scheme}://{host}:{port}"))
        }
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), SyncError> {
        self.host_port()?;
        if self.connection_timeout_secs == 0 {
            return Err(SyncError::configuration(
                "connection timeout must be at least one second",
            ));
        }
        Ok(())
    }
}
