//! Connection pooling for the networked backend, on `deadpool`'s managed pool.

mod config;
mod manager;

pub use config::PoolConfig;
pub use manager::ManageConnection;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool::Runtime;
use deadpool::managed::{self, Object, PoolError};
use tracing::{info, warn};

use crate::error::DbError;
use crate::results::Row;
use crate::session::Session;
use crate::types::RowValues;
use manager::{PoolManager, Tracked};

/// Counts reported by [`Pool::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub leased: usize,
    pub max_size: usize,
    pub closed: bool,
}

/// Connection pool holding at most `max_size` connections, idle and leased combined.
///
/// Waiters are served in FIFO order. Connections go back to the pool when their
/// [`PooledConnection`] is dropped, whether the holder finished, failed or was cancelled.
/// A connection released with a pending rollback is reset before it is handed out again.
pub struct Pool<M: ManageConnection> {
    inner: managed::Pool<PoolManager<M>>,
    manager: Arc<M>,
    config: PoolConfig,
}

impl<M: ManageConnection> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            manager: Arc::clone(&self.manager),
            config: self.config.clone(),
        }
    }
}

impl<M: ManageConnection> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

impl<M: ManageConnection> Pool<M> {
    /// Create an empty pool. Connections are opened on demand.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if `config` is invalid.
    pub fn new(manager: M, config: PoolConfig) -> Result<Self, DbError> {
        config.validate()?;
        let manager = Arc::new(manager);
        let inner = managed::Pool::builder(PoolManager::new(Arc::clone(&manager)))
            .max_size(config.max_size)
            .wait_timeout(Some(config.acquire_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| DbError::ConfigError(format!("connection pool build error: {e}")))?;
        Ok(Self {
            inner,
            manager,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check out a connection, waiting up to `acquire_timeout` for a free slot.
    ///
    /// # Errors
    /// - `DbError::PoolClosed` if the pool is, or becomes, shut down
    /// - `DbError::PoolExhausted` if no slot frees up in time
    /// - any error from the manager while connecting
    pub async fn get(&self) -> Result<PooledConnection<M>, DbError> {
        match self.inner.get().await {
            Ok(object) => Ok(PooledConnection {
                object: Some(object),
                manager: Arc::clone(&self.manager),
            }),
            Err(PoolError::Timeout(_)) => Err(DbError::PoolExhausted {
                max_size: self.config.max_size,
                timeout_ms: self.config.acquire_timeout_ms(),
            }),
            Err(PoolError::Closed) => Err(DbError::PoolClosed),
            Err(PoolError::Backend(err)) => Err(err),
            Err(other) => Err(DbError::ConnectionError(format!(
                "connection pool error: {other}"
            ))),
        }
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let status = self.inner.status();
        let idle = usize::try_from(status.available).unwrap_or(0);
        PoolStatus {
            idle,
            leased: status.size.saturating_sub(idle),
            // closing shrinks deadpool's max_size to zero
            max_size: self.config.max_size,
            closed: self.inner.is_closed(),
        }
    }

    /// Stop handing out connections and close the idle ones.
    ///
    /// Pending and future `get()` calls fail with `PoolClosed`. Connections still leased are
    /// closed when they are returned.
    pub fn shutdown(&self) {
        let idle = self.status().idle;
        self.inner.close();
        info!(closed_idle = idle, "connection pool shut down");
    }
}

/// A connection leased from a [`Pool`]; returned to it on drop.
pub struct PooledConnection<M: ManageConnection> {
    object: Option<Object<PoolManager<M>>>,
    manager: Arc<M>,
}

impl<M: ManageConnection> PooledConnection<M> {
    fn tracked(&mut self) -> Result<&mut Tracked<M::Connection>, DbError> {
        self.object
            .as_deref_mut()
            .ok_or_else(|| DbError::ConnectionError("pooled connection already released".into()))
    }
}

impl<M: ManageConnection> fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("needs_reset", &self.object.as_deref().map(|t| t.needs_reset))
            .finish_non_exhaustive()
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        let Some(mut object) = self.object.take() else {
            return;
        };
        if self.manager.has_broken(&mut object.conn) {
            warn!("discarding broken pooled connection");
            drop(Object::take(object));
        }
    }
}

#[async_trait]
impl<M: ManageConnection> Session for PooledConnection<M> {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<Vec<Row>, DbError> {
        self.tracked()?.conn.query(sql, params).await
    }

    async fn batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.tracked()?.conn.batch(sql).await
    }

    async fn rollback_if_open(&mut self) -> Result<bool, DbError> {
        self.tracked()?.conn.rollback_if_open().await
    }

    fn is_closed(&self) -> bool {
        self.object.as_deref().is_none_or(|t| t.conn.is_closed())
    }

    fn defer_rollback(&mut self) {
        if let Some(tracked) = self.object.as_deref_mut() {
            tracked.needs_reset = true;
        }
    }
}
