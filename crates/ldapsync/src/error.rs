//! Sync error types
//!
//! Load-time configuration errors are hard failures. Directory and store
//! errors are classified so the sync run can turn them into counters.

use thiserror::Error;

/// Error raised while loading a mapping configuration.
///
/// A configuration error aborts the whole load; no partial mapping is ever
/// returned alongside one.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The markup is not well formed.
    #[error("malformed mapping markup at byte {position}: {message}")]
    Xml { position: u64, message: String },

    /// The document root is not `ldapsyncmapping`.
    #[error("unexpected root element <{found}>, expected <ldapsyncmapping>")]
    UnexpectedRoot { found: String },

    /// A `row` element without a `type` attribute.
    #[error("row tag with no type attribute")]
    MissingRowType,

    /// A `row` whose `type` does not name a known record kind.
    #[error("unknown record kind '{kind}'")]
    UnknownRecordKind { kind: String },

    /// A `field` element without a `column` attribute.
    #[error("field in {kind} row has no column attribute")]
    MissingColumn { kind: String },

    /// A `column` that the record kind does not define.
    #[error("record kind {kind} has no column '{column}'")]
    UnknownColumn { kind: String, column: String },

    /// Two `field`s of one row resolving to the same storage column.
    #[error("field '{column}' in {kind} row writes a column already written by this row")]
    DuplicateColumn { kind: String, column: String },

    /// A `field` with neither `ldapattr` nor `typeattr`.
    #[error("field '{column}' in {kind} row must have either an ldapattr or a typeattr attribute")]
    MissingSource { kind: String, column: String },

    /// A `field` with both `ldapattr` and `typeattr`.
    #[error("field '{column}' in {kind} row has both ldapattr and typeattr")]
    ConflictingSource { kind: String, column: String },

    /// A `typeattr` that the record kind does not define.
    #[error("can't set column '{column}' to {kind}.{constant}: no such constant")]
    UnknownConstant {
        kind: String,
        column: String,
        constant: String,
    },

    /// A `typeattr` field flagged as `blob`.
    #[error("field '{column}' in {kind} row: typeattr fields can't be binary")]
    BinaryLiteral { kind: String, column: String },

    /// A `field` element outside of any `row`.
    #[error("field element outside of a row")]
    FieldOutsideRow,

    /// The mapping could not be read.
    #[error("can't read mapping file: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigurationError {
    /// Record kind of the row that caused the error, when known.
    pub fn row_kind(&self) -> Option<&str> {
        match self {
            ConfigurationError::UnknownRecordKind { kind }
            | ConfigurationError::MissingColumn { kind }
            | ConfigurationError::UnknownColumn { kind, .. }
            | ConfigurationError::DuplicateColumn { kind, .. }
            | ConfigurationError::MissingSource { kind, .. }
            | ConfigurationError::ConflictingSource { kind, .. }
            | ConfigurationError::UnknownConstant { kind, .. }
            | ConfigurationError::BinaryLiteral { kind, .. } => Some(kind.as_str()),
            _ => None,
        }
    }

    pub(crate) fn xml(position: u64, err: impl std::fmt::Display) -> Self {
        ConfigurationError::Xml {
            position,
            message: err.to_string(),
        }
    }
}

/// Error reported by a directory session.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The server rejected the bind credentials.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// Could not reach or talk to the server.
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The search did not complete successfully.
    #[error("search failed: {message}")]
    Search {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The server returned something that is not a usable entry.
    #[error("invalid entry: {message}")]
    InvalidEntry { message: String },
}

impl DirectoryError {
    /// Whether this is a credential failure rather than an I/O failure.
    pub fn is_authentication(&self) -> bool {
        matches!(self, DirectoryError::Authentication { .. })
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        DirectoryError::Authentication {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        DirectoryError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a search error.
    pub fn search(message: impl Into<String>) -> Self {
        DirectoryError::Search {
            message: message.into(),
            source: None,
        }
    }

    /// Create a search error with source.
    pub fn search_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Search {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Error reported by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Looking up an existing record failed.
    #[error("lookup failed for '{source_key}': {message}")]
    Lookup { source_key: String, message: String },

    /// Applying a batch failed; nothing from the batch was applied.
    #[error("batch commit failed: {message}")]
    Commit { message: String },

    /// A pending parent reference does not point at a parent insert.
    #[error("operation references batch index {index}, which is not a parent insert")]
    UnresolvedReference { index: usize },

    /// Underlying database error.
    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    /// Create a commit error.
    pub fn commit(message: impl Into<String>) -> Self {
        StoreError::Commit {
            message: message.into(),
        }
    }

    /// Create a database error with source.
    pub fn database_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Top-level error for sync APIs that return a `Result`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid sync settings.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// Mapping could not be loaded.
    #[error(transparent)]
    Mapping(#[from] ConfigurationError),

    /// Directory failure.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Record store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Settings could not be deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        SyncError::Configuration {
            message: message.into(),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;
