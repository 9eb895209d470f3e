//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::backend::{Adapter, PooledAdapter};
pub use crate::config::{DatabaseConfig, PoolConfig, PostgresOptions, SqliteOptions};
pub use crate::context::{Transaction, TransactionState};
pub use crate::db::Database;
pub use crate::error::DbError;
pub use crate::middleware::ConnMiddleware;
pub use crate::params;
pub use crate::pool::PoolStatus;
pub use crate::results::Row;
pub use crate::types::{BackendKind, FromRowValue, Operation, Params, RowValues};

#[cfg(feature = "sqlite")]
pub use crate::backend::EmbeddedAdapter;
