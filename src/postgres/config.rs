use std::time::Duration;

use crate::config::PostgresOptions;
use crate::error::DbError;

/// Read the password from the environment variable named by `opts.password_env`.
///
/// # Errors
/// Returns `DbError::MissingCredential` when the variable is unset, empty or not UTF-8.
pub fn read_password(opts: &PostgresOptions) -> Result<String, DbError> {
    match std::env::var(&opts.password_env) {
        Ok(password) if !password.is_empty() => Ok(password),
        _ => Err(DbError::MissingCredential {
            variable: opts.password_env.clone(),
        }),
    }
}

/// Build a `tokio_postgres` config from options plus the password from the environment.
///
/// # Errors
/// Returns `DbError::MissingCredential` if the password variable is not set, or
/// `DbError::ConfigError` for an empty host, user or database name.
pub fn pg_config(opts: &PostgresOptions) -> Result<tokio_postgres::Config, DbError> {
    for (field, value) in [
        ("host", &opts.host),
        ("user", &opts.user),
        ("dbname", &opts.dbname),
    ] {
        if value.is_empty() {
            return Err(DbError::ConfigError(format!("postgres {field} is required")));
        }
    }
    let password = read_password(opts)?;

    let mut cfg = tokio_postgres::Config::new();
    cfg.host(&opts.host)
        .port(opts.port)
        .user(&opts.user)
        .dbname(&opts.dbname)
        .password(password);
    if let Some(name) = &opts.application_name {
        cfg.application_name(name);
    }
    if let Some(ms) = opts.connect_timeout_ms {
        cfg.connect_timeout(Duration::from_millis(ms));
    }
    Ok(cfg)
}
