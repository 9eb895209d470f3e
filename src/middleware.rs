use std::future::Future;

use crate::db::Database;
use crate::error::DbError;
use crate::types::BackendKind;

/// Opens one connection scope per request.
///
/// A web layer wraps each request handler with [`around`](ConnMiddleware::around); every
/// query the handler runs, on any call depth, then shares one connection that is released
/// when the handler returns, fails or is cancelled.
#[derive(Debug, Clone)]
pub struct ConnMiddleware {
    db: Database,
    kind: BackendKind,
}

impl ConnMiddleware {
    pub(crate) fn new(db: Database, kind: BackendKind) -> Self {
        Self { db, kind }
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run `request` inside a connection scope.
    ///
    /// # Errors
    /// Returns the request's error, or a `DbError` (converted into `E`) if no connection can
    /// be leased.
    pub async fn around<F, Fut, T, E>(&self, request: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DbError>,
    {
        self.db.connect(request).await
    }
}
