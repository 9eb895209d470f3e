use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use super::Adapter;
use crate::config::SqliteOptions;
use crate::error::DbError;
use crate::results::Row;
use crate::session::Session;
use crate::sqlite::SqliteConnection;
use crate::translation::PlaceholderStyle;
use crate::types::{BackendKind, RowValues};

/// Embedded backend: a single SQLite handle shared by all scopes, one scope at a time.
pub struct EmbeddedAdapter {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl EmbeddedAdapter {
    /// # Errors
    /// Returns `DbError::SqliteError` if the database file cannot be opened.
    pub async fn open(options: &SqliteOptions) -> Result<Self, DbError> {
        let conn = SqliteConnection::open(options).await?;
        info!(path = %options.path.display(), "embedded backend opened");
        Ok(Self::from_connection(conn))
    }

    #[must_use]
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

#[async_trait]
impl Adapter for EmbeddedAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Sqlite
    }

    async fn checkout(&self) -> Result<Box<dyn Session>, DbError> {
        let guard = Arc::clone(&self.conn).lock_owned().await;
        Ok(Box::new(EmbeddedSession { guard }))
    }

    // the handle stays open for the life of the process
    async fn shutdown(&self) -> Result<(), DbError> {
        info!(backend = %self.kind(), "shutdown requested; embedded handle stays open");
        Ok(())
    }
}

/// Exclusive use of the embedded handle for one connection scope.
pub struct EmbeddedSession {
    guard: OwnedMutexGuard<SqliteConnection>,
}

#[async_trait]
impl Session for EmbeddedSession {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<Vec<Row>, DbError> {
        self.guard.query(sql, params).await
    }

    async fn batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.guard.batch(sql).await
    }

    async fn rollback_if_open(&mut self) -> Result<bool, DbError> {
        self.guard.rollback_if_active().await
    }

    fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    fn defer_rollback(&mut self) {
        self.guard.defer_rollback();
    }
}
