use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use super::scope::{ScopeState, TransactionRecord};
use crate::error::DbError;
use crate::types::{BackendKind, Operation};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a transaction. Every transaction ends in `Committed` or `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Created; `BEGIN` has not completed yet.
    Started,
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, TransactionState::Started | TransactionState::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Started => "started",
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// A top-level transaction on the current connection scope.
///
/// Statements issued through the [`Database`](crate::Database) while the guard is alive run
/// inside it. Call [`commit`](Transaction::commit) or [`rollback`](Transaction::rollback)
/// to finish; dropping an unfinished guard marks it rolled back and the `ROLLBACK` is sent
/// before the scope's next statement, or before the connection is handed out again.
pub struct Transaction {
    scope: Weak<ScopeState>,
    id: u64,
    backend: BackendKind,
    state: TransactionState,
    committing: bool,
}

impl Transaction {
    /// Begin a transaction on `scope`.
    pub(crate) async fn begin(scope: &Arc<ScopeState>) -> Result<Self, DbError> {
        let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        {
            let mut record = scope.transaction();
            if record.is_some_and(|r| r.state.is_open()) {
                return Err(DbError::NestedTransaction {
                    backend: scope.backend,
                });
            }
            *record = Some(TransactionRecord {
                id,
                state: TransactionState::Started,
                unconfirmed: false,
            });
        }

        let mut tx = Transaction {
            scope: Arc::downgrade(scope),
            id,
            backend: scope.backend,
            state: TransactionState::Started,
            committing: false,
        };
        if let Err(err) = scope.batch("BEGIN").await {
            tx.set_state(TransactionState::RolledBack);
            return Err(err);
        }
        tx.set_state(TransactionState::Active);
        debug!(scope_id = scope.id, transaction_id = id, "transaction begun");
        Ok(tx)
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    fn scope(&self) -> Result<Arc<ScopeState>, DbError> {
        self.scope.upgrade().ok_or(DbError::NoActiveConnection {
            operation: Operation::Transaction,
        })
    }

    fn set_state(&mut self, state: TransactionState) {
        self.state = state;
        if let Some(scope) = self.scope.upgrade() {
            let mut record = scope.transaction();
            if let Some(record) = record.as_mut().filter(|r| r.id == self.id) {
                record.state = state;
            }
        }
    }

    /// Commit the transaction.
    ///
    /// If this future is dropped while `COMMIT` is in flight, the transaction is reported as
    /// committed; before the scope's next statement the session is checked and, if the
    /// transaction is somehow still open, it is rolled back and reported as such.
    ///
    /// # Errors
    /// Returns the backend error if `COMMIT` fails; the transaction is then rolled back.
    /// Returns `DbError::NoActiveConnection` if the connection scope has already closed.
    pub async fn commit(mut self) -> Result<(), DbError> {
        let scope = self.scope()?;
        self.committing = true;
        match scope.batch("COMMIT").await {
            Ok(()) => {
                self.set_state(TransactionState::Committed);
                debug!(scope_id = scope.id, transaction_id = self.id, "transaction committed");
                Ok(())
            }
            Err(err) => {
                self.committing = false;
                if let Err(rollback_err) = scope.rollback_if_open().await {
                    warn!(error = %rollback_err, "rollback after failed commit also failed");
                    scope.schedule_rollback();
                }
                self.set_state(TransactionState::RolledBack);
                Err(err)
            }
        }
    }

    /// Roll the transaction back.
    ///
    /// # Errors
    /// Returns the backend error if `ROLLBACK` fails; a rollback is then retried before the
    /// scope's next statement. The transaction counts as rolled back either way.
    pub async fn rollback(mut self) -> Result<(), DbError> {
        let scope = self.scope()?;
        let result = scope.batch("ROLLBACK").await;
        if result.is_err() {
            scope.schedule_rollback();
        }
        self.set_state(TransactionState::RolledBack);
        debug!(scope_id = scope.id, transaction_id = self.id, "transaction rolled back");
        result
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("backend", &self.backend)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.state.is_open() {
            return;
        }
        if self.committing {
            debug!(
                transaction_id = self.id,
                "commit interrupted; checking the session before the next statement"
            );
            if let Some(scope) = self.scope.upgrade() {
                scope.commit_interrupted(self.id);
            }
            self.state = TransactionState::Committed;
            return;
        }
        warn!(transaction_id = self.id, "transaction dropped while open; rolling back");
        if let Some(scope) = self.scope.upgrade() {
            scope.schedule_rollback();
        }
        self.set_state(TransactionState::RolledBack);
    }
}
