use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use super::transaction::TransactionState;
use crate::error::DbError;
use crate::results::Row;
use crate::session::Session;
use crate::types::{BackendKind, RowValues};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy)]
pub(crate) struct TransactionRecord {
    pub(crate) id: u64,
    pub(crate) state: TransactionState,
    /// Set when a `COMMIT` was interrupted; the next rollback check settles the state.
    pub(crate) unconfirmed: bool,
}

/// One open connection scope: the session leased for it and its transaction bookkeeping.
///
/// The session is released when the last `Arc` to the scope drops.
pub(crate) struct ScopeState {
    pub(crate) owner: u64,
    pub(crate) id: u64,
    pub(crate) backend: BackendKind,
    session: tokio::sync::Mutex<Box<dyn Session>>,
    transaction: Mutex<Option<TransactionRecord>>,
    rollback_pending: AtomicBool,
}

impl ScopeState {
    pub(crate) fn new(owner: u64, backend: BackendKind, session: Box<dyn Session>) -> Self {
        Self {
            owner,
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            session: tokio::sync::Mutex::new(session),
            transaction: Mutex::new(None),
            rollback_pending: AtomicBool::new(false),
        }
    }

    pub(crate) fn transaction(&self) -> MutexGuard<'_, Option<TransactionRecord>> {
        self.transaction
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn transaction_open(&self) -> bool {
        self.transaction()
            .is_some_and(|record| record.state.is_open())
    }

    pub(crate) fn schedule_rollback(&self) {
        self.rollback_pending.store(true, Ordering::SeqCst);
    }

    /// Record an interrupted commit: reported as committed until the next rollback check
    /// finds the transaction still open.
    pub(crate) fn commit_interrupted(&self, id: u64) {
        if let Some(record) = self.transaction().as_mut().filter(|r| r.id == id) {
            record.state = TransactionState::Committed;
            record.unconfirmed = true;
        }
        self.schedule_rollback();
    }

    fn settle(&self, rolled_back: bool) {
        if let Some(record) = self.transaction().as_mut().filter(|r| r.unconfirmed) {
            record.unconfirmed = false;
            if rolled_back {
                warn!(
                    scope_id = self.id,
                    transaction_id = record.id,
                    "interrupted commit did not complete; rolled back"
                );
                record.state = TransactionState::RolledBack;
            }
        }
    }

    /// Run a pending deferred rollback before anything else reaches the session.
    ///
    /// Only an open transaction is rolled back. On failure the rollback stays pending.
    async fn flush_pending(&self, session: &mut Box<dyn Session>) -> Result<(), DbError> {
        if self.rollback_pending.load(Ordering::SeqCst) {
            debug!(scope_id = self.id, "running deferred rollback");
            let rolled_back = session.rollback_if_open().await?;
            self.rollback_pending.store(false, Ordering::SeqCst);
            self.settle(rolled_back);
        }
        Ok(())
    }

    /// Roll back whatever transaction the session still has open.
    pub(crate) async fn rollback_if_open(&self) -> Result<bool, DbError> {
        let mut session = self.session.lock().await;
        self.flush_pending(&mut session).await?;
        session.rollback_if_open().await
    }

    pub(crate) async fn query(&self, sql: &str, params: &[RowValues]) -> Result<Vec<Row>, DbError> {
        let mut session = self.session.lock().await;
        self.flush_pending(&mut session).await?;
        session.query(sql, params).await
    }

    pub(crate) async fn batch(&self, sql: &str) -> Result<(), DbError> {
        let mut session = self.session.lock().await;
        self.flush_pending(&mut session).await?;
        session.batch(sql).await
    }
}

impl Drop for ScopeState {
    fn drop(&mut self) {
        let abandoned = self.transaction_open();
        if abandoned || self.rollback_pending.load(Ordering::SeqCst) {
            if abandoned {
                warn!(scope_id = self.id, "connection scope closed with an open transaction");
            }
            self.session.get_mut().defer_rollback();
        }
        debug!(scope_id = self.id, backend = %self.backend, "connection scope released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    #[derive(Default)]
    struct Calls {
        rollbacks: AtomicUsize,
        failing_rollbacks: AtomicUsize,
        queries: AtomicUsize,
        deferred: AtomicBool,
    }

    struct FlakySession {
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl Session for FlakySession {
        async fn query(&mut self, _sql: &str, _params: &[RowValues]) -> Result<Vec<Row>, DbError> {
            self.calls.queries.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn batch(&mut self, _sql: &str) -> Result<(), DbError> {
            Ok(())
        }

        async fn rollback_if_open(&mut self) -> Result<bool, DbError> {
            self.calls.rollbacks.fetch_add(1, Ordering::SeqCst);
            if self.calls.failing_rollbacks.load(Ordering::SeqCst) > 0 {
                self.calls.failing_rollbacks.fetch_sub(1, Ordering::SeqCst);
                return Err(DbError::ExecutionError("rollback failed".into()));
            }
            Ok(true)
        }

        fn is_closed(&self) -> bool {
            false
        }

        fn defer_rollback(&mut self) {
            self.calls.deferred.store(true, Ordering::SeqCst);
        }
    }

    fn scope(calls: &Arc<Calls>) -> ScopeState {
        let session = FlakySession {
            calls: Arc::clone(calls),
        };
        ScopeState::new(1, BackendKind::Networked, Box::new(session))
    }

    #[tokio::test]
    async fn failed_deferred_rollback_is_retried() {
        let calls = Arc::new(Calls::default());
        calls.failing_rollbacks.store(1, Ordering::SeqCst);
        let scope = scope(&calls);
        scope.schedule_rollback();

        assert!(scope.query("SELECT 1", &[]).await.is_err());
        assert_eq!(calls.queries.load(Ordering::SeqCst), 0);

        scope.query("SELECT 1", &[]).await.unwrap();
        assert_eq!(calls.rollbacks.load(Ordering::SeqCst), 2);
        assert_eq!(calls.queries.load(Ordering::SeqCst), 1);

        // settled: no further rollbacks
        scope.query("SELECT 1", &[]).await.unwrap();
        assert_eq!(calls.rollbacks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scope_closed_with_a_failed_rollback_defers_it_to_the_session() {
        let calls = Arc::new(Calls::default());
        calls.failing_rollbacks.store(1, Ordering::SeqCst);
        let scope = scope(&calls);
        scope.schedule_rollback();
        assert!(scope.batch("SELECT 1").await.is_err());
        drop(scope);
        assert!(calls.deferred.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn interrupted_commit_settles_on_what_the_session_reports() {
        let calls = Arc::new(Calls::default());
        let scope = scope(&calls);
        *scope.transaction() = Some(TransactionRecord {
            id: 7,
            state: TransactionState::Active,
            unconfirmed: false,
        });
        scope.commit_interrupted(7);
        assert_eq!(
            (*scope.transaction()).map(|r| r.state),
            Some(TransactionState::Committed)
        );

        // the fake reports an open transaction, so the commit never landed
        scope.query("SELECT 1", &[]).await.unwrap();
        let record = (*scope.transaction()).expect("record kept");
        assert_eq!(record.state, TransactionState::RolledBack);
        assert!(!record.unconfirmed);
    }
}
