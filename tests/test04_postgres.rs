#![cfg(feature = "postgres")]

// These tests need a reachable Postgres. They read its password from TESTING_PG_PASSWORD and
// return early when it is unset; TESTING_PG_HOST, TESTING_PG_PORT, TESTING_PG_USER and
// TESTING_PG_DB override the connection defaults.

use std::time::Duration;

use sql_ambient::prelude::*;

const PASSWORD_ENV: &str = "TESTING_PG_PASSWORD";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn pg_options() -> Option<PostgresOptions> {
    std::env::var(PASSWORD_ENV).ok()?;
    let env = |name: &str, default: &str| std::env::var(name).unwrap_or_else(|_| default.into());
    let port = env("TESTING_PG_PORT", "5432").parse().unwrap_or(5432);
    Some(
        PostgresOptions::new(env("TESTING_PG_HOST", "localhost"), env("TESTING_PG_DB", "postgres"))
            .with_port(port)
            .with_user(env("TESTING_PG_USER", "postgres"))
            .with_password_env(PASSWORD_ENV)
            .with_connect_timeout(Duration::from_secs(5)),
    )
}

async fn networked_db(options: PostgresOptions, max_size: usize) -> Result<Database, DbError> {
    let config = DatabaseConfig::default()
        .with_postgres(options)
        .with_pool(PoolConfig::new(max_size).with_acquire_timeout(Duration::from_secs(5)));
    let db = Database::new(config);
    db.init(BackendKind::Networked).await?;
    Ok(db)
}

#[tokio::test]
async fn missing_password_variable_fails_init() {
    let options = PostgresOptions::new("localhost", "postgres")
        .with_password_env("SQL_AMBIENT_PG_PASSWORD_NEVER_SET");
    let err = networked_db(options, 1).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::MissingCredential { ref variable } if variable == "SQL_AMBIENT_PG_PASSWORD_NEVER_SET"
    ));
}

#[tokio::test]
async fn get_user_on_postgres() -> Result<(), DbError> {
    init_tracing();
    let Some(options) = pg_options() else {
        eprintln!("{PASSWORD_ENV} not set; skipping");
        return Ok(());
    };
    let db = networked_db(options, 2).await?;
    db.store(
        "get_user",
        "SELECT id, name, created_at FROM users WHERE id = {user_id}",
    )?;

    let rows = db
        .connect(|| async {
            db.execute_sql(
                "CREATE TEMP TABLE users (id BIGINT PRIMARY KEY, name TEXT NOT NULL, created_at TIMESTAMP NOT NULL DEFAULT now())",
                &params! {},
            )
            .await?;
            db.execute_sql(
                "INSERT INTO users (id, name) VALUES ({id}, {name})",
                &params! { "id" => 123_i64, "name" => "alice" },
            )
            .await?;
            // the temp table only exists on this scope's connection
            db.execute("get_user", &params! { "user_id" => 123_i64 }).await
        })
        .await?;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_as::<i64>("id")?, 123);
    assert_eq!(rows[0]["name"], RowValues::Text("alice".into()));
    assert!(matches!(rows[0]["created_at"], RowValues::Timestamp(_)));
    db.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn postgres_transaction_rolls_back_on_error() -> Result<(), DbError> {
    init_tracing();
    let Some(options) = pg_options() else {
        eprintln!("{PASSWORD_ENV} not set; skipping");
        return Ok(());
    };
    let db = networked_db(options, 1).await?;

    let count = db
        .connect(|| async {
            db.execute_sql("CREATE TEMP TABLE ledger (amount INTEGER NOT NULL)", &params! {})
                .await?;
            let failed: Result<(), DbError> = db
                .transaction(|| async {
                    db.execute_sql(
                        "INSERT INTO ledger (amount) VALUES ({amount})",
                        &params! { "amount" => 5 },
                    )
                    .await?;
                    Err(DbError::ExecutionError("abort".into()))
                })
                .await;
            assert!(failed.is_err());
            assert_eq!(db.transaction_state(), Some(TransactionState::RolledBack));

            db.transaction(|| async {
                db.execute_sql(
                    "INSERT INTO ledger (amount) VALUES ({amount})",
                    &params! { "amount" => 7 },
                )
                .await
            })
            .await?;
            let rows = db
                .execute_sql("SELECT COUNT(*) AS n, SUM(amount) AS total FROM ledger", &params! {})
                .await?;
            Ok::<_, DbError>((rows[0].get_as::<i64>("n")?, rows[0].get_as::<i64>("total")?))
        })
        .await?;

    assert_eq!(count, (1, 7));
    db.shutdown().await?;
    Ok(())
}
