//! # ldapsync-ldap
//!
//! Directory sessions over LDAP for the `ldapsync` engine.
//!
//! ## Features
//!
//! - Plain LDAP, STARTTLS and LDAPS, with or without certificate checks
//! - Anonymous or simple bind; rejected credentials reported separately
//! - Search base discovery from the root DSE naming contexts
//! - Streaming search results
//!
//! ## Example
//!
//! ```ignore
//! use ldapsync::prelude::*;
//! use ldapsync_ldap::{LdapDirectoryConnector, LdapSettings, SecurityMode};
//!
//! let settings = LdapSettings::new("ldap.example.com")
//!     .with_credentials("cn=sync,dc=example,dc=com", "secret")
//!     .with_security(SecurityMode::Tls);
//! let connector = LdapDirectoryConnector::new(settings)?;
//!
//! for dn in connector.test_connection(None).await? {
//!     println!("{dn}");
//! }
//! ```

pub mod config;
pub mod connector;
pub mod session;

pub use config::{LdapSettings, SecurityMode};
pub use connector::LdapDirectoryConnector;
pub use session::{entry_from_search, LdapSession};
