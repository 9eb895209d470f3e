//! Backend adapters: where connection scopes get their sessions from.

#[cfg(feature = "sqlite")]
mod embedded;
mod pooled;

#[cfg(feature = "sqlite")]
pub use embedded::{EmbeddedAdapter, EmbeddedSession};
pub use pooled::PooledAdapter;

use async_trait::async_trait;

use crate::error::DbError;
use crate::pool::PoolStatus;
use crate::session::Session;
use crate::translation::PlaceholderStyle;
use crate::types::{BackendKind, Operation};

/// The operation set shared by every backend.
///
/// [`Database`](crate::Database) checks [`capabilities`](Adapter::capabilities) before it
/// dispatches, so an adapter is only asked for what its kind supports.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> &'static [Operation] {
        self.kind().capabilities()
    }

    /// Positional placeholder syntax the backend's SQL dialect expects.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Lease a session for one connection scope. Dropping it gives it back.
    async fn checkout(&self) -> Result<Box<dyn Session>, DbError>;

    async fn shutdown(&self) -> Result<(), DbError>;

    /// Pool counts, for backends that pool.
    fn status(&self) -> Option<PoolStatus> {
        None
    }
}
