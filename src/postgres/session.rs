use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use super::params::as_refs;
use super::query::build_result_rows;
use crate::error::DbError;
use crate::pool::ManageConnection;
use crate::results::Row;
use crate::session::Session;
use crate::types::RowValues;

/// A connected `tokio_postgres` client.
pub struct PgSession {
    client: Client,
}

impl PgSession {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Session for PgSession {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<Vec<Row>, DbError> {
        let stmt = self.client.prepare(sql).await?;
        let rows = self.client.query(&stmt, &as_refs(params)).await?;
        build_result_rows(&stmt, &rows)
    }

    async fn batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    // the pool resets the connection before reuse
    fn defer_rollback(&mut self) {}
}

/// Pool manager for Postgres clients.
pub struct PgManager {
    config: tokio_postgres::Config,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ManageConnection for PgManager {
    type Connection = PgSession;

    async fn connect(&self) -> Result<PgSession, DbError> {
        debug!(
            hosts = ?self.config.get_hosts(),
            dbname = ?self.config.get_dbname(),
            user = ?self.config.get_user(),
            "postgres connect start"
        );
        let (client, connection) = self.config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection closed with error");
            }
        });
        Ok(PgSession::new(client))
    }
}
