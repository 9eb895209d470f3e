#![cfg(feature = "sqlite")]

use std::sync::Arc;
use std::time::Duration;

use sql_ambient::prelude::*;
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> std::path::PathBuf {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path
}

async fn pooled_db(prefix: &str, max_size: usize) -> Result<Database, DbError> {
    let options = SqliteOptions::new(unique_db_path(prefix));
    let pool = PoolConfig::new(max_size).with_acquire_timeout(Duration::from_secs(5));
    let db = Database::new(DatabaseConfig::default());
    db.init_with(Arc::new(PooledAdapter::sqlite(&options, pool)?))?;
    db.execute_sql(
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance INTEGER NOT NULL)",
        &params! {},
    )
    .await?;
    Ok(db)
}

async fn insert(db: &Database, id: i64, balance: i64) -> Result<(), DbError> {
    db.execute_sql(
        "INSERT INTO accounts (id, balance) VALUES ({id}, {balance})",
        &params! { "id" => id, "balance" => balance },
    )
    .await
    .map(|_| ())
}

async fn count(db: &Database) -> Result<i64, DbError> {
    let rows = db
        .execute_sql("SELECT COUNT(*) AS n FROM accounts", &params! {})
        .await?;
    rows[0].get_as::<i64>("n")
}

#[tokio::test]
async fn ok_body_commits() -> Result<(), DbError> {
    let db = pooled_db("commit", 2).await?;
    let state = db
        .connect(|| async {
            db.transaction(|| async { insert(&db, 1, 100).await }).await?;
            Ok::<_, DbError>(db.transaction_state())
        })
        .await?;
    assert_eq!(state, Some(TransactionState::Committed));
    // visible from a fresh scope
    assert_eq!(count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn err_body_rolls_back() -> Result<(), DbError> {
    let db = pooled_db("rollback", 2).await?;
    let state = db
        .connect(|| async {
            let result: Result<(), DbError> = db
                .transaction(|| async {
                    insert(&db, 1, 100).await?;
                    Err(DbError::ExecutionError("insufficient funds".into()))
                })
                .await;
            assert!(matches!(result, Err(DbError::ExecutionError(_))));
            assert_eq!(count(&db).await?, 0);
            Ok::<_, DbError>(db.transaction_state())
        })
        .await?;
    assert_eq!(state, Some(TransactionState::RolledBack));
    assert_eq!(count(&db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn dropped_transaction_is_rolled_back_before_the_next_statement() -> Result<(), DbError> {
    let db = pooled_db("dropped_body", 1).await?;
    db.connect(|| async {
        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            db.transaction(|| async {
                insert(&db, 1, 100).await?;
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, DbError>(())
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(db.transaction_state(), Some(TransactionState::RolledBack));
        assert_eq!(count(&db).await?, 0);
        Ok::<_, DbError>(())
    })
    .await?;
    assert_eq!(count(&db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_scope_rolls_back_before_reuse() -> Result<(), DbError> {
    let db = pooled_db("dropped_scope", 1).await?;
    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        db.connect(|| async {
            let _tx = db.begin().await?;
            insert(&db, 1, 100).await?;
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, DbError>(())
        }),
    )
    .await;
    assert!(cancelled.is_err());
    let status = db.pool_status().expect("pooled backend reports status");
    assert_eq!((status.idle, status.leased), (1, 0));

    // the only connection is reset when it is leased again
    assert_eq!(count(&db).await?, 0);
    insert(&db, 2, 50).await?;
    assert_eq!(count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn commit_dropped_in_flight_still_counts_as_committed() -> Result<(), DbError> {
    let db = pooled_db("interrupted_commit", 1).await?;
    db.connect(|| async {
        let tx = db.begin().await?;
        insert(&db, 1, 100).await?;
        // poll the commit once, then drop it
        let _ = tokio::time::timeout(Duration::ZERO, tx.commit()).await;
        assert_eq!(db.transaction_state(), Some(TransactionState::Committed));

        // the next statement on the scope is not poisoned by a stray ROLLBACK
        assert_eq!(count(&db).await?, 1);
        assert_eq!(db.transaction_state(), Some(TransactionState::Committed));

        let tx = db.begin().await?;
        insert(&db, 2, 50).await?;
        tx.commit().await
    })
    .await?;
    assert_eq!(count(&db).await?, 2);
    Ok(())
}

#[tokio::test]
async fn explicit_guard_commit_and_drop() -> Result<(), DbError> {
    let db = pooled_db("guard", 1).await?;
    db.connect(|| async {
        let tx = db.begin().await?;
        assert_eq!(tx.state(), TransactionState::Active);
        assert_eq!(tx.backend(), BackendKind::Networked);
        insert(&db, 1, 10).await?;
        tx.commit().await?;
        assert_eq!(db.transaction_state(), Some(TransactionState::Committed));

        let tx = db.begin().await?;
        insert(&db, 2, 20).await?;
        drop(tx);
        assert_eq!(db.transaction_state(), Some(TransactionState::RolledBack));
        assert_eq!(count(&db).await?, 1);

        let tx = db.begin().await?;
        insert(&db, 3, 30).await?;
        tx.rollback().await?;
        assert_eq!(count(&db).await?, 1);
        Ok::<_, DbError>(())
    })
    .await
}

#[tokio::test]
async fn second_begin_in_one_scope_is_rejected() -> Result<(), DbError> {
    let db = pooled_db("nested_begin", 1).await?;
    db.connect(|| async {
        let tx = db.begin().await?;
        let err = db.begin().await.unwrap_err();
        assert!(matches!(
            err,
            DbError::NestedTransaction {
                backend: BackendKind::Networked
            }
        ));
        assert_eq!(db.transaction_state(), Some(TransactionState::Active));
        tx.rollback().await
    })
    .await
}

#[tokio::test]
async fn inner_transaction_joins_the_outer_one() -> Result<(), DbError> {
    let db = pooled_db("join", 1).await?;
    db.connect(|| async {
        let result: Result<(), DbError> = db
            .transaction(|| async {
                db.transaction(|| async { insert(&db, 1, 100).await }).await?;
                // still open: the inner call did not commit
                assert_eq!(db.transaction_state(), Some(TransactionState::Active));
                Err(DbError::ExecutionError("abort outer".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(count(&db).await?, 0);
        Ok::<_, DbError>(())
    })
    .await
}

#[tokio::test]
async fn transaction_outside_a_scope_needs_a_connection() -> Result<(), DbError> {
    let db = pooled_db("no_scope", 1).await?;
    let err = db
        .transaction(|| async { Ok::<_, DbError>(()) })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::NoActiveConnection {
            operation: Operation::Transaction
        }
    ));
    assert!(matches!(
        db.begin().await,
        Err(DbError::NoActiveConnection { .. })
    ));
    assert_eq!(db.transaction_state(), None);
    Ok(())
}
