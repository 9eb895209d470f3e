use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{params, query};
use crate::config::SqliteOptions;
use crate::error::DbError;
use crate::results::Row;
use crate::session::Session;
use crate::types::RowValues;

pub(crate) type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// A rusqlite connection driven from async code.
///
/// Every call runs on tokio's blocking pool so the runtime threads never wait on SQLite.
pub struct SqliteConnection {
    conn: SharedSqliteConnection,
    rollback_pending: AtomicBool,
}

impl SqliteConnection {
    /// Open (creating if needed) the database file described by `opts`.
    ///
    /// # Errors
    /// Returns `DbError::SqliteError` if the file cannot be opened or configured.
    pub async fn open(opts: &SqliteOptions) -> Result<Self, DbError> {
        let opts = opts.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<_, DbError> {
            let conn = rusqlite::Connection::open(&opts.path)?;
            conn.busy_timeout(opts.busy_timeout())?;
            if opts.wal {
                let mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                debug!(path = %opts.path.display(), journal_mode = %mode, "opened sqlite database");
            }
            Ok(conn)
        })
        .await
        .map_err(|e| DbError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))??;
        Ok(Self::from_rusqlite(conn))
    }

    #[must_use]
    pub fn from_rusqlite(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            rollback_pending: AtomicBool::new(false),
        }
    }

    /// Run `func` against the raw connection on the blocking pool.
    ///
    /// # Errors
    /// Returns whatever `func` returns, or `DbError::ExecutionError` if the blocking task panics.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, DbError> + Send + 'static,
        R: Send + 'static,
    {
        let pending = self.rollback_pending.swap(false, Ordering::SeqCst);
        run_blocking(Arc::clone(&self.conn), move |conn| {
            if pending && rollback_if_active(conn)? {
                debug!("rolled back abandoned sqlite transaction");
            }
            func(conn)
        })
        .await
    }

    /// Roll back the open transaction, if any. Returns whether one was open.
    ///
    /// # Errors
    /// Returns `DbError::SqliteError` if the rollback fails.
    pub async fn rollback_if_active(&self) -> Result<bool, DbError> {
        self.with_connection(rollback_if_active).await
    }
}

fn rollback_if_active(conn: &mut rusqlite::Connection) -> Result<bool, DbError> {
    if conn.is_autocommit() {
        return Ok(false);
    }
    conn.execute_batch("ROLLBACK")?;
    Ok(true)
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("rollback_pending", &self.rollback_pending.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, DbError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, DbError> + Send + 'static,
    R: Send + 'static,
{
    // locked before spawning so calls on one connection run in submission order
    let mut guard = conn.lock_owned().await;
    tokio::task::spawn_blocking(move || func(&mut guard))
        .await
        .map_err(|e| DbError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}

#[async_trait]
impl Session for SqliteConnection {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<Vec<Row>, DbError> {
        let sql = sql.to_owned();
        let values = params::convert(params);
        self.with_connection(move |conn| query::run_statement(conn, &sql, &values))
            .await
    }

    async fn batch(&mut self, sql: &str) -> Result<(), DbError> {
        let sql = sql.to_owned();
        self.with_connection(move |conn| conn.execute_batch(&sql).map_err(DbError::from))
            .await
    }

    async fn rollback_if_open(&mut self) -> Result<bool, DbError> {
        self.rollback_if_active().await
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn defer_rollback(&mut self) {
        self.rollback_pending.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deferred_rollback_runs_before_next_statement() {
        let mut conn = SqliteConnection::from_rusqlite(rusqlite::Connection::open_in_memory().unwrap());
        conn.batch("CREATE TABLE t (id INTEGER)").await.unwrap();
        conn.batch("BEGIN").await.unwrap();
        conn.query("INSERT INTO t VALUES (?1)", &[RowValues::Int(1)])
            .await
            .unwrap();
        conn.defer_rollback();
        let rows = conn.query("SELECT COUNT(*) AS n FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get_as::<i64>("n").unwrap(), 0);
    }

    #[tokio::test]
    async fn rollback_without_transaction_is_a_no_op() {
        let conn = SqliteConnection::from_rusqlite(rusqlite::Connection::open_in_memory().unwrap());
        assert!(!conn.rollback_if_active().await.unwrap());
    }

    #[tokio::test]
    async fn rollback_reports_an_open_transaction() {
        let mut conn = SqliteConnection::from_rusqlite(rusqlite::Connection::open_in_memory().unwrap());
        conn.batch("BEGIN").await.unwrap();
        assert!(conn.rollback_if_open().await.unwrap());
        assert!(!conn.rollback_if_open().await.unwrap());
    }
}
