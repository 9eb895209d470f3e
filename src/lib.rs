//! Named, parameterized SQL over a pooled Postgres backend or a single-handle SQLite
//! backend, behind one async [`Database`] facade.
//!
//! Queries are registered once by name with `{param}` placeholders and executed with a
//! [`Params`] map. [`Database::connect`] opens a task-local connection scope that every
//! nested call shares; [`Database::transaction`] wraps a body in a transaction on that scope.

pub mod backend;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod middleware;
pub mod pool;
pub mod prelude;
pub mod registry;
pub mod results;
pub mod session;
pub mod translation;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::DatabaseConfig;
pub use db::Database;
pub use error::DbError;
pub use results::Row;
pub use types::{BackendKind, Operation, Params, RowValues};
