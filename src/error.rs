use thiserror::Error;

use crate::types::{BackendKind, Operation};

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "postgres")]
use tokio_postgres;

/// Every failure surfaced by this crate.
///
/// The variants carry the operation, backend kind and query name where they apply so a
/// caller can log or surface them without re-deriving context. Nothing here is retried
/// internally.
#[derive(Debug, Error)]
pub enum DbError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("no query registered under '{query}'")]
    QueryNotFound { query: String },

    #[error("query '{query}' references placeholder '{{{parameter}}}' but no value was supplied")]
    ParameterMissing { query: String, parameter: String },

    #[error("query '{query}' contains the positional placeholder {marker}; use {{name}} placeholders")]
    PositionalPlaceholder { query: String, marker: String },

    #[error("{operation} is not implemented for the {backend} backend")]
    BackendNotImplemented {
        operation: Operation,
        backend: BackendKind,
    },

    #[error("connection pool exhausted: no connection freed within {timeout_ms}ms (max_size {max_size})")]
    PoolExhausted { max_size: usize, timeout_ms: u64 },

    #[error("connection pool is shut down")]
    PoolClosed,

    #[error("{operation} requires an open connection scope")]
    NoActiveConnection { operation: Operation },

    #[error("a transaction is already active in this {backend} connection scope; savepoints are not supported")]
    NestedTransaction { backend: BackendKind },

    #[error("column '{column}' not found in row")]
    ColumnNotFound { column: String },

    #[error("credential variable '{variable}' is not set")]
    MissingCredential { variable: String },

    #[error("database already initialized with the {backend} backend")]
    AlreadyInitialized { backend: BackendKind },

    #[error("{operation} called before the database was initialized")]
    NotInitialized { operation: Operation },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Value conversion error: {0}")]
    ConversionError(String),
}

impl DbError {
    pub(crate) fn not_implemented(operation: Operation, backend: BackendKind) -> Self {
        DbError::BackendNotImplemented { operation, backend }
    }

    /// The query name this error refers to, when there is one.
    #[must_use]
    pub fn query_name(&self) -> Option<&str> {
        match self {
            DbError::QueryNotFound { query }
            | DbError::ParameterMissing { query, .. }
            | DbError::PositionalPlaceholder { query, .. } => Some(query),
            _ => None,
        }
    }

    /// The backend kind this error refers to, when there is one.
    #[must_use]
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            DbError::BackendNotImplemented { backend, .. }
            | DbError::NestedTransaction { backend }
            | DbError::AlreadyInitialized { backend } => Some(*backend),
            _ => None,
        }
    }
}
