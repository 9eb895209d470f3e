use async_trait::async_trait;

use super::SqliteConnection;
use crate::config::SqliteOptions;
use crate::error::DbError;
use crate::pool::ManageConnection;

/// Pool manager opening one [`SqliteConnection`] per pooled slot, all on the same file.
///
/// The default `reset` is enough here: it checks `is_autocommit` before rolling back.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    options: SqliteOptions,
}

impl SqliteManager {
    #[must_use]
    pub fn new(options: SqliteOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ManageConnection for SqliteManager {
    type Connection = SqliteConnection;

    async fn connect(&self) -> Result<SqliteConnection, DbError> {
        SqliteConnection::open(&self.options).await
    }
}
