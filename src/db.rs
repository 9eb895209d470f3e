use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::backend::Adapter;
use crate::config::DatabaseConfig;
use crate::context::{self, Transaction, TransactionState};
use crate::error::DbError;
use crate::middleware::ConnMiddleware;
use crate::pool::PoolStatus;
use crate::registry::QueryRegistry;
use crate::results::Row;
use crate::translation::bind_named;
use crate::types::{BackendKind, Operation, Params};

static NEXT_DATABASE_ID: AtomicU64 = AtomicU64::new(1);

/// Label used in errors and logs for statements passed to [`Database::execute_sql`].
pub const RAW_SQL_LABEL: &str = "<raw sql>";

struct DatabaseInner {
    id: u64,
    config: DatabaseConfig,
    registry: QueryRegistry,
    backend: OnceCell<Arc<dyn Adapter>>,
}

/// The data-access facade.
///
/// A `Database` is created once from a [`DatabaseConfig`], initialized once with the
/// backend to use, and then cloned freely; clones share the registry and the backend.
/// It keeps no connection state of its own: connections live in task-local scopes opened
/// by [`connect`](Database::connect).
///
/// ```no_run
/// use sql_ambient::prelude::*;
///
/// # async fn run() -> Result<(), DbError> {
/// let db = Database::new(DatabaseConfig::default());
/// db.init(BackendKind::Networked).await?;
/// db.store("get_user", "SELECT * FROM users WHERE id = {user_id}")?;
///
/// let rows = db
///     .connect(|| async {
///         db.execute("get_user", &params! { "user_id" => 123 }).await
///     })
///     .await?;
/// assert_eq!(rows[0].get_as::<i64>("id")?, 123);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.inner.id)
            .field("backend", &self.backend_kind())
            .field("queries", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl Database {
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                id: NEXT_DATABASE_ID.fetch_add(1, Ordering::Relaxed),
                config,
                registry: QueryRegistry::new(),
                backend: OnceCell::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn registry(&self) -> &QueryRegistry {
        &self.inner.registry
    }

    /// Select and build the backend. Allowed once per `Database`.
    ///
    /// `Networked` reads the Postgres password from the environment and sets up a pool
    /// without connecting. `Embedded` opens the SQLite file.
    ///
    /// # Errors
    /// - `DbError::AlreadyInitialized` on a second call
    /// - `DbError::MissingCredential` if the Postgres password variable is unset
    /// - `DbError::ConfigError` if the requested backend was not compiled in
    /// - backend errors while opening the SQLite file
    pub async fn init(&self, kind: BackendKind) -> Result<(), DbError> {
        self.ensure_uninitialized()?;
        let adapter = self.build_adapter(kind).await?;
        self.install(adapter)?;
        info!(backend = %kind, "database initialized");
        Ok(())
    }

    /// Initialize with a ready-made adapter instead of building one from the config.
    ///
    /// # Errors
    /// Returns `DbError::AlreadyInitialized` if a backend is already installed.
    pub fn init_with(&self, adapter: Arc<dyn Adapter>) -> Result<(), DbError> {
        let kind = adapter.kind();
        self.install(adapter)?;
        info!(backend = %kind, "database initialized with supplied adapter");
        Ok(())
    }

    fn ensure_uninitialized(&self) -> Result<(), DbError> {
        match self.inner.backend.get() {
            Some(existing) => Err(DbError::AlreadyInitialized {
                backend: existing.kind(),
            }),
            None => Ok(()),
        }
    }

    fn install(&self, adapter: Arc<dyn Adapter>) -> Result<(), DbError> {
        let kind = adapter.kind();
        self.inner.backend.set(adapter).map_err(|_| {
            DbError::AlreadyInitialized {
                backend: self.backend_kind().unwrap_or(kind),
            }
        })
    }

    async fn build_adapter(&self, kind: BackendKind) -> Result<Arc<dyn Adapter>, DbError> {
        let config = &self.inner.config;
        match kind {
            #[cfg(feature = "postgres")]
            BackendKind::Networked => Ok(Arc::new(crate::backend::PooledAdapter::postgres(
                &config.postgres,
                config.pool.clone(),
            )?)),
            #[cfg(feature = "sqlite")]
            BackendKind::Embedded => Ok(Arc::new(
                crate::backend::EmbeddedAdapter::open(&config.sqlite).await?,
            )),
            #[allow(unreachable_patterns)]
            other => Err(DbError::ConfigError(format!(
                "the {other} backend is not compiled into this build"
            ))),
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.backend.initialized()
    }

    /// The backend selected by `init`, if any.
    #[must_use]
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.inner.backend.get().map(|adapter| adapter.kind())
    }

    /// The installed adapter, after checking that it implements `operation`.
    fn adapter(&self, operation: Operation) -> Result<&Arc<dyn Adapter>, DbError> {
        let adapter = self
            .inner
            .backend
            .get()
            .ok_or(DbError::NotInitialized { operation })?;
        adapter.kind().require(operation)?;
        Ok(adapter)
    }

    /// Register a named query template with `{param}` placeholders.
    ///
    /// # Errors
    /// Returns `DbError::NotInitialized` before `init`.
    pub fn store(&self, name: impl Into<String>, template: impl Into<String>) -> Result<(), DbError> {
        self.adapter(Operation::Store)?;
        self.inner.registry.store(name, template);
        Ok(())
    }

    /// Run a registered query with named parameters.
    ///
    /// Uses the task's open connection scope if there is one; otherwise leases a connection
    /// for just this statement.
    ///
    /// # Errors
    /// - `DbError::BackendNotImplemented` on the embedded backend
    /// - `DbError::QueryNotFound` if `name` is not registered
    /// - `DbError::ParameterMissing` if a placeholder has no value in `params`
    /// - `DbError::PositionalPlaceholder` if the SQL already holds a native marker like `$1`
    /// - pool and backend errors
    pub async fn execute(&self, name: &str, params: &Params) -> Result<Vec<Row>, DbError> {
        let adapter = self.adapter(Operation::Execute)?;
        let template = self.inner.registry.resolve(name)?;
        let bound = bind_named(&template, params, adapter.placeholder_style(), name)?;
        let rows =
            context::run_query(adapter, self.inner.id, name, &bound.sql, &bound.values).await?;
        debug!(query = name, rows = rows.len(), "query returned");
        Ok(rows)
    }

    /// Run SQL text directly, with the same `{param}` binding as registered queries.
    ///
    /// # Errors
    /// - `DbError::ParameterMissing` if a placeholder has no value in `params`
    /// - `DbError::PositionalPlaceholder` if the SQL already holds a native marker like `$1`
    /// - pool and backend errors
    pub async fn execute_sql(&self, sql: &str, params: &Params) -> Result<Vec<Row>, DbError> {
        let adapter = self.adapter(Operation::ExecuteSql)?;
        let bound = bind_named(sql, params, adapter.placeholder_style(), RAW_SQL_LABEL)?;
        let rows =
            context::run_query(adapter, self.inner.id, RAW_SQL_LABEL, &bound.sql, &bound.values)
                .await?;
        debug!(query = RAW_SQL_LABEL, rows = rows.len(), "query returned");
        Ok(rows)
    }

    /// Run `body` with a connection scope open on this task.
    ///
    /// Every `execute`, `execute_sql` and transaction call made by the same task while `body`
    /// runs uses that one connection. Nested `connect` calls reuse it. The connection is
    /// released when the outermost `connect` finishes, fails or is cancelled.
    ///
    /// # Errors
    /// Returns `body`'s error, or a `DbError` (converted into `E`) if no connection can be
    /// leased.
    pub async fn connect<F, Fut, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DbError>,
    {
        let adapter = self.adapter(Operation::Connect)?;
        context::with_connection(adapter, self.inner.id, body).await
    }

    /// Run `body` inside a transaction on the current connection scope.
    ///
    /// Commits when `body` returns `Ok`, rolls back on `Err` or if the future is dropped.
    /// Inside an already open transaction, `body` joins it.
    ///
    /// # Errors
    /// - `DbError::BackendNotImplemented` on the embedded backend
    /// - `DbError::NoActiveConnection` outside [`connect`](Database::connect)
    /// - `body`'s error, or the backend error from `COMMIT`
    pub async fn transaction<F, Fut, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DbError>,
    {
        self.adapter(Operation::Transaction)?;
        context::with_transaction(self.inner.id, body).await
    }

    /// Begin a transaction on the current connection scope and return its guard.
    ///
    /// # Errors
    /// - `DbError::BackendNotImplemented` on the embedded backend
    /// - `DbError::NoActiveConnection` outside [`connect`](Database::connect)
    /// - `DbError::NestedTransaction` if the scope already has an open transaction
    pub async fn begin(&self) -> Result<Transaction, DbError> {
        self.adapter(Operation::Transaction)?;
        context::begin(self.inner.id).await
    }

    /// State of the latest transaction in this task's connection scope.
    #[must_use]
    pub fn transaction_state(&self) -> Option<TransactionState> {
        context::current_transaction_state(self.inner.id)
    }

    /// Whether the calling task has a connection scope open on this database.
    #[must_use]
    pub fn in_scope(&self) -> bool {
        context::current_scope_id(self.inner.id).is_some()
    }

    /// Request-scoped connection handling for a web layer.
    ///
    /// # Errors
    /// Returns `DbError::NotInitialized` before `init`.
    pub fn get_middleware(&self) -> Result<ConnMiddleware, DbError> {
        let adapter = self.adapter(Operation::Middleware)?;
        Ok(ConnMiddleware::new(self.clone(), adapter.kind()))
    }

    /// Shut the backend down. Pooled connections are closed; later leases fail with
    /// `PoolClosed`.
    ///
    /// # Errors
    /// Returns `DbError::NotInitialized` before `init`.
    pub async fn shutdown(&self) -> Result<(), DbError> {
        self.adapter(Operation::Shutdown)?.shutdown().await
    }

    /// Pool counts for the networked backend.
    #[must_use]
    pub fn pool_status(&self) -> Option<PoolStatus> {
        self.inner.backend.get().and_then(|adapter| adapter.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[tokio::test]
    async fn operations_before_init_fail_with_not_initialized() {
        let db = Database::new(DatabaseConfig::default());
        assert!(!db.is_initialized());
        assert!(matches!(
            db.store("q", "SELECT 1"),
            Err(DbError::NotInitialized {
                operation: Operation::Store
            })
        ));
        assert!(matches!(
            db.execute("q", &params! {}).await,
            Err(DbError::NotInitialized {
                operation: Operation::Execute
            })
        ));
        assert!(matches!(
            db.get_middleware(),
            Err(DbError::NotInitialized {
                operation: Operation::Middleware
            })
        ));
        let result: Result<(), DbError> = db.connect(|| async { Ok(()) }).await;
        assert!(matches!(
            result,
            Err(DbError::NotInitialized {
                operation: Operation::Connect
            })
        ));
        assert!(db.pool_status().is_none());
        assert!(!db.in_scope());
    }

    #[cfg(feature = "postgres")]
    #[tokio::test]
    async fn networked_init_requires_credential() {
        let mut config = DatabaseConfig::default();
        config.postgres.password_env = "SQL_AMBIENT_DB_TEST_PASSWORD_NEVER_SET".into();
        let db = Database::new(config);
        let err = db.init(BackendKind::Networked).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::MissingCredential { ref variable }
                if variable == "SQL_AMBIENT_DB_TEST_PASSWORD_NEVER_SET"
        ));
        assert!(!db.is_initialized());
    }
}
