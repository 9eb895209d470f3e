use async_trait::async_trait;
use tracing::info;

use super::Adapter;
use crate::error::DbError;
use crate::pool::{ManageConnection, Pool, PoolConfig, PoolStatus};
use crate::session::Session;
use crate::translation::PlaceholderStyle;
use crate::types::BackendKind;

/// Networked backend: every connection scope leases its own pooled connection.
pub struct PooledAdapter<M: ManageConnection> {
    pool: Pool<M>,
    style: PlaceholderStyle,
}

impl<M: ManageConnection> PooledAdapter<M> {
    #[must_use]
    pub fn new(pool: Pool<M>, style: PlaceholderStyle) -> Self {
        Self { pool, style }
    }

    #[must_use]
    pub fn pool(&self) -> &Pool<M> {
        &self.pool
    }
}

#[cfg(feature = "postgres")]
impl PooledAdapter<crate::postgres::PgManager> {
    /// Build a lazily-connecting Postgres pool. The password is read from the environment
    /// now; no connection is opened until the first scope needs one.
    ///
    /// # Errors
    /// Returns `DbError::MissingCredential` if the password variable is unset, or
    /// `DbError::ConfigError` for invalid options.
    pub fn postgres(
        options: &crate::config::PostgresOptions,
        pool: PoolConfig,
    ) -> Result<Self, DbError> {
        let manager = crate::postgres::PgManager::new(crate::postgres::pg_config(options)?);
        Ok(Self::new(Pool::new(manager, pool)?, PlaceholderStyle::Postgres))
    }
}

#[cfg(feature = "sqlite")]
impl PooledAdapter<crate::sqlite::SqliteManager> {
    /// A pool of SQLite connections to one file, with `?N` placeholders.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` for an invalid pool config.
    pub fn sqlite(
        options: &crate::config::SqliteOptions,
        pool: PoolConfig,
    ) -> Result<Self, DbError> {
        let manager = crate::sqlite::SqliteManager::new(options.clone());
        Ok(Self::new(Pool::new(manager, pool)?, PlaceholderStyle::Sqlite))
    }
}

#[async_trait]
impl<M: ManageConnection> Adapter for PooledAdapter<M> {
    fn kind(&self) -> BackendKind {
        BackendKind::Networked
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        self.style
    }

    async fn checkout(&self) -> Result<Box<dyn Session>, DbError> {
        let conn = self.pool.get().await?;
        Ok(Box::new(conn))
    }

    async fn shutdown(&self) -> Result<(), DbError> {
        self.pool.shutdown();
        info!(backend = %self.kind(), "backend shut down");
        Ok(())
    }

    fn status(&self) -> Option<PoolStatus> {
        Some(self.pool.status())
    }
}
