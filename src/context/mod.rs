//! Task-local connection and transaction scopes.
//!
//! A scope opened by [`Database::connect`](crate::Database::connect) is visible to every
//! call made by the same task while the body runs, however deep, without passing the
//! connection around. Tasks spawned from inside a scope start without one.

mod scope;
mod transaction;

pub use transaction::{Transaction, TransactionState};

use std::future::Future;
use std::sync::Arc;

use tracing::{Instrument, debug, debug_span, warn};

use crate::backend::Adapter;
use crate::error::DbError;
use crate::results::Row;
use crate::types::{Operation, RowValues};
use scope::ScopeState;

tokio::task_local! {
    // innermost last; one entry per Database with an open scope on this task
    static SCOPES: Vec<Arc<ScopeState>>;
}

fn current_scope(owner: u64) -> Option<Arc<ScopeState>> {
    SCOPES
        .try_with(|scopes| scopes.iter().rev().find(|s| s.owner == owner).cloned())
        .ok()
        .flatten()
}

/// Run `body` inside a connection scope owned by `owner`, opening one if the task has none.
///
/// A nested call reuses the open scope. The session goes back to the adapter when the
/// outermost call finishes, fails or is cancelled.
pub(crate) async fn with_connection<F, Fut, T, E>(
    adapter: &Arc<dyn Adapter>,
    owner: u64,
    body: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<DbError>,
{
    if current_scope(owner).is_some() {
        return body().await;
    }

    let session = adapter.checkout().await?;
    let scope = Arc::new(ScopeState::new(owner, adapter.kind(), session));
    let span = debug_span!("db_scope", scope_id = scope.id, backend = %scope.backend);
    debug!(parent: &span, "connection scope opened");

    let mut scopes = SCOPES.try_with(Clone::clone).unwrap_or_default();
    scopes.push(scope);
    SCOPES
        .scope(scopes, async move { body().await })
        .instrument(span)
        .await
}

/// Run one statement on the current scope, or on a short-lived session when there is none.
pub(crate) async fn run_query(
    adapter: &Arc<dyn Adapter>,
    owner: u64,
    label: &str,
    sql: &str,
    params: &[RowValues],
) -> Result<Vec<Row>, DbError> {
    if let Some(scope) = current_scope(owner) {
        debug!(query = label, scope_id = scope.id, params = params.len(), "execute");
        return scope.query(sql, params).await;
    }
    debug!(query = label, params = params.len(), "execute without connection scope");
    let mut session = adapter.checkout().await?;
    session.query(sql, params).await
}

/// Begin a transaction on the current scope.
pub(crate) async fn begin(owner: u64) -> Result<Transaction, DbError> {
    let scope = current_scope(owner).ok_or(DbError::NoActiveConnection {
        operation: Operation::Transaction,
    })?;
    Transaction::begin(&scope).await
}

/// Run `body` in a transaction: commit on `Ok`, roll back on `Err` or cancellation.
///
/// Joins the scope's transaction if one is already open; the outer owner then decides the
/// outcome.
pub(crate) async fn with_transaction<F, Fut, T, E>(owner: u64, body: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<DbError>,
{
    let scope = current_scope(owner).ok_or(DbError::NoActiveConnection {
        operation: Operation::Transaction,
    })?;
    if scope.transaction_open() {
        debug!(scope_id = scope.id, "joining open transaction");
        drop(scope);
        return body().await;
    }

    let tx = Transaction::begin(&scope).await?;
    drop(scope);
    match body().await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback after failed transaction body failed");
            }
            Err(err)
        }
    }
}

/// State of the most recent transaction on the current scope.
pub(crate) fn current_transaction_state(owner: u64) -> Option<TransactionState> {
    let scope = current_scope(owner)?;
    let record = *scope.transaction();
    record.map(|record| record.state)
}

/// Id of the current scope, if the task has one for `owner`.
pub(crate) fn current_scope_id(owner: u64) -> Option<u64> {
    current_scope(owner).map(|scope| scope.id)
}
