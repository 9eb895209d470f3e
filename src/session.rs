use async_trait::async_trait;

use crate::error::DbError;
use crate::results::Row;
use crate::types::RowValues;

/// One live database connection as seen by a connection scope.
///
/// `sql` is already in the backend's positional placeholder style and `params` are bound
/// in order.
#[async_trait]
pub trait Session: Send + 'static {
    /// Run one statement and collect its rows (empty for statements that return none).
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<Vec<Row>, DbError>;

    /// Run parameterless SQL, such as `BEGIN` or `COMMIT`.
    async fn batch(&mut self, sql: &str) -> Result<(), DbError>;

    /// Whether the underlying handle is known to be unusable.
    fn is_closed(&self) -> bool;

    /// Roll back the open transaction, if there is one.
    ///
    /// Returns `true` only when the session knows a transaction was open and rolled it back.
    /// The default sends `ROLLBACK` unconditionally and returns `false`; Postgres answers a
    /// `ROLLBACK` outside a transaction with a warning, not an error.
    async fn rollback_if_open(&mut self) -> Result<bool, DbError> {
        self.batch("ROLLBACK").await.map(|()| false)
    }

    /// Ask for a `ROLLBACK` before this session's next use.
    ///
    /// Called when a transaction is abandoned without a chance to roll back inline, for
    /// example when its future is dropped.
    fn defer_rollback(&mut self);
}
