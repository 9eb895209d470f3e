//! Configuration for [`Database`](crate::Database).
//!
//! Every struct deserializes with defaults, so an application can load a `[db]` table from
//! its own config file and hand it over unchanged.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::pool::PoolConfig;

/// Everything needed to initialize either backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub postgres: PostgresOptions,
    pub sqlite: SqliteOptions,
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    #[must_use]
    pub fn with_postgres(mut self, postgres: PostgresOptions) -> Self {
        self.postgres = postgres;
        self
    }

    #[must_use]
    pub fn with_sqlite(mut self, sqlite: SqliteOptions) -> Self {
        self.sqlite = sqlite;
        self
    }

    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

/// Connection settings for the networked (Postgres) backend.
///
/// The password is never part of the config; it is read from the environment variable named
/// by `password_env` when the backend is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub dbname: String,
    pub password_env: String,
    pub application_name: Option<String>,
    pub connect_timeout_ms: Option<u64>,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            dbname: "postgres".to_string(),
            password_env: "DB_PASSWORD".to_string(),
            application_name: None,
            connect_timeout_ms: None,
        }
    }
}

impl PostgresOptions {
    #[must_use]
    pub fn new(host: impl Into<String>, dbname: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            dbname: dbname.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    #[must_use]
    pub fn with_password_env(mut self, variable: impl Into<String>) -> Self {
        self.password_env = variable.into();
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Settings for the embedded (SQLite) backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
    /// Switch the database to WAL journaling when it is opened.
    pub wal: bool,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("db.sqlite"),
            busy_timeout_ms: 5_000,
            wal: true,
        }
    }
}

impl SqliteOptions {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn builder(path: impl Into<PathBuf>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(path)
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Fluent builder for [`SqliteOptions`].
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            opts: SqliteOptions::new(path),
        }
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.opts.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_db_table() {
        let cfg: DatabaseConfig = serde_json::from_value(serde_json::json!({
            "postgres": { "host": "db.internal", "dbname": "app" },
            "sqlite": { "path": "/tmp/app.db", "wal": false },
            "pool": { "max_size": 4 }
        }))
        .unwrap();
        assert_eq!(cfg.postgres.host, "db.internal");
        assert_eq!(cfg.postgres.port, 5432);
        assert_eq!(cfg.postgres.password_env, "DB_PASSWORD");
        assert_eq!(cfg.sqlite.path, PathBuf::from("/tmp/app.db"));
        assert!(!cfg.sqlite.wal);
        assert_eq!(cfg.sqlite.busy_timeout_ms, 5_000);
        assert_eq!(cfg.pool.max_size, 4);
    }

    #[test]
    fn sqlite_builder_sets_fields() {
        let opts = SqliteOptions::builder("file.db")
            .busy_timeout(Duration::from_millis(250))
            .wal(false)
            .finish();
        assert_eq!(opts.busy_timeout(), Duration::from_millis(250));
        assert!(!opts.wal);
    }
}
