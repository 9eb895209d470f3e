use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool::managed::{self, Metrics, RecycleError, RecycleResult};
use tracing::{debug, warn};

use crate::error::DbError;
use crate::session::Session;

/// Opens and vets connections for a [`Pool`](super::Pool).
#[async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Session;

    /// Open a fresh connection.
    async fn connect(&self) -> Result<Self::Connection, DbError>;

    /// Checked synchronously when a connection is returned; `true` discards it.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }

    /// Clear leftover transaction state before a connection is handed out again.
    async fn reset(&self, conn: &mut Self::Connection) -> Result<(), DbError> {
        conn.rollback_if_open().await.map(|_| ())
    }
}

/// A pooled connection plus the reset it owes its next holder.
pub(super) struct Tracked<C> {
    pub(super) conn: C,
    pub(super) needs_reset: bool,
}

/// deadpool manager over a [`ManageConnection`].
pub(super) struct PoolManager<M> {
    manager: Arc<M>,
}

impl<M> PoolManager<M> {
    pub(super) fn new(manager: Arc<M>) -> Self {
        Self { manager }
    }
}

impl<M> fmt::Debug for PoolManager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager").finish_non_exhaustive()
    }
}

impl<M: ManageConnection> managed::Manager for PoolManager<M> {
    type Type = Tracked<M::Connection>;
    type Error = DbError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        debug!("opening new pooled connection");
        let conn = self.manager.connect().await?;
        Ok(Tracked {
            conn,
            needs_reset: false,
        })
    }

    async fn recycle(
        &self,
        tracked: &mut Self::Type,
        _metrics: &Metrics,
    ) -> RecycleResult<Self::Error> {
        if self.manager.has_broken(&mut tracked.conn) {
            warn!("discarding pooled connection that closed while idle");
            return Err(RecycleError::Backend(DbError::ConnectionError(
                "pooled connection is closed".into(),
            )));
        }
        if tracked.needs_reset {
            if let Err(err) = self.manager.reset(&mut tracked.conn).await {
                warn!(error = %err, "discarding pooled connection that failed reset");
                return Err(RecycleError::Backend(err));
            }
            tracked.needs_reset = false;
        }
        Ok(())
    }
}
