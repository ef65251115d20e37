//! SqlStore against in-memory SQLite, driven through FileSource catalogs.

use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;
use sqlshift::prelude::*;
use sqlx::Row;

async fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sqlshift-it-{}-{}", std::process::id(), name));
    let _ = tokio::fs::remove_dir_all(&dir).await;
    tokio::fs::create_dir_all(&dir).await.unwrap();
    dir
}

async fn write(dir: &PathBuf, name: &str, content: &str) {
    tokio::fs::write(dir.join(name), content).await.unwrap();
}

async fn sqlite() -> SqlStore {
    SqlStore::connect("sqlite::memory:").await.unwrap()
}

async fn table_exists(store: &SqlStore, table: &str) -> bool {
    let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table'")
        .fetch_all(store.pool())
        .await
        .unwrap();
    rows.iter()
        .any(|row| row.try_get::<String, _>("name").unwrap() == table)
}

#[tokio::test]
async fn test_bookkeeping_created_lazily() {
    let mut store = sqlite().await.with_table("schema_history").unwrap();
    assert!(!table_exists(&store, "schema_history").await);

    assert_eq!(store.list().await.unwrap(), Vec::<Version>::new());
    assert!(table_exists(&store, "schema_history").await);

    // Second call reuses the ready state.
    assert_eq!(store.list().await.unwrap(), Vec::<Version>::new());
}

#[tokio::test]
async fn test_invalid_table_name() {
    let err = sqlite().await.with_table("x; DROP TABLE y").unwrap_err();
    assert!(matches!(err, MigrateError::InvalidIdentifier(_)));
}

#[tokio::test]
async fn test_migrate_up_and_down_from_files() {
    let dir = scratch_dir("updown").await;
    write(&dir, "1_users.sql", "--UP--\nCREATE TABLE users (id INTEGER PRIMARY KEY);\n--DOWN--\nDROP TABLE users;\n").await;
    write(
        &dir,
        "2_orders.sql",
        "--UP--\nCREATE TABLE orders (id INTEGER PRIMARY KEY);\nCREATE INDEX orders_id ON orders (id);\n--DOWN--\nDROP TABLE orders;\n",
    )
    .await;

    let mut migrator = Migrator::new(FileSource::new(&dir), sqlite().await);
    assert_eq!(migrator.latest_version().await.unwrap(), 2);
    assert_eq!(migrator.current_version().await.unwrap(), 0);

    let report = migrator.migrate(2).await.unwrap();
    assert_eq!(report.versions, vec![1, 2]);
    assert_eq!(migrator.current_version().await.unwrap(), 2);
    assert!(table_exists(migrator.store(), "users").await);
    assert!(table_exists(migrator.store(), "orders").await);

    let history = migrator.status().await.unwrap().applied;
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.applied_at.is_some()));

    let report = migrator.migrate(0).await.unwrap();
    assert_eq!(report.versions, vec![2, 1]);
    assert_eq!(migrator.current_version().await.unwrap(), 0);
    assert!(!table_exists(migrator.store(), "users").await);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_snapshot_on_empty_database() {
    let dir = scratch_dir("snapshot").await;
    write(&dir, "1_a.sql", "--UP--\nCREATE TABLE a (id INTEGER);\n--DOWN--\nDROP TABLE a;\n").await;
    write(
        &dir,
        "2_b.sql",
        "--UP--\nCREATE TABLE b (id INTEGER);\n--DOWN--\nDROP TABLE b;\n--SNAPSHOT--\nCREATE TABLE a (id INTEGER);\nCREATE TABLE b (id INTEGER);\n",
    )
    .await;

    let mut migrator = Migrator::new(FileSource::new(&dir), sqlite().await);
    let plan = migrator.plan(2).await.unwrap();
    assert_eq!(plan.versions(), vec![2]);

    migrator.apply(&plan).await.unwrap();
    assert_eq!(migrator.applied_versions().await.unwrap(), vec![2]);
    assert!(table_exists(migrator.store(), "a").await);
    assert!(table_exists(migrator.store(), "b").await);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_failed_action_rolls_back_and_halts() {
    let dir = scratch_dir("halt").await;
    write(&dir, "1_a.sql", "--UP--\nCREATE TABLE a (id INTEGER);\n--DOWN--\nDROP TABLE a;\n").await;
    write(
        &dir,
        "2_b.sql",
        "--UP--\nCREATE TABLE b (id INTEGER);\nINSERT INTO missing VALUES (1);\n--DOWN--\nDROP TABLE b;\n",
    )
    .await;
    write(&dir, "3_c.sql", "--UP--\nCREATE TABLE c (id INTEGER);\n--DOWN--\nDROP TABLE c;\n").await;

    let mut migrator = Migrator::new(FileSource::new(&dir), sqlite().await);
    let err = migrator.migrate(3).await.unwrap_err();

    match err.root() {
        MigrateError::Halted {
            version, completed, ..
        } => {
            assert_eq!(*version, 2);
            assert_eq!(completed, &vec![1]);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(migrator.applied_versions().await.unwrap(), vec![1]);
    assert!(table_exists(migrator.store(), "a").await);
    assert!(!table_exists(migrator.store(), "b").await);
    assert!(!table_exists(migrator.store(), "c").await);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_best_effort_keeps_statement_effects() {
    let mut store = sqlite().await.with_transactions(false);
    assert_eq!(store.atomicity(), Atomicity::BestEffort);

    let action = Action::up(1, "CREATE TABLE kept (id INTEGER);\nINSERT INTO missing VALUES (1);");
    assert!(store.apply(&action).await.is_err());

    assert_eq!(store.list().await.unwrap(), Vec::<Version>::new());
    assert!(table_exists(&store, "kept").await);
}

#[tokio::test]
async fn test_duplicate_up_is_rejected_by_primary_key() {
    let mut store = sqlite().await;
    store.apply(&Action::up(1, "CREATE TABLE t (id INTEGER);")).await.unwrap();

    let err = store
        .apply(&Action::up(1, "CREATE TABLE u (id INTEGER);"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("bookkeeping update failed"));
    assert!(!table_exists(&store, "u").await);
    assert_eq!(store.list().await.unwrap(), vec![1]);
}

#[tokio::test]
async fn test_timeout_never_commits_in_flight_action() {
    let dir = scratch_dir("timeout").await;
    write(&dir, "1_a.sql", "--UP--\nCREATE TABLE a (id INTEGER);\n--DOWN--\nDROP TABLE a;\n").await;
    write(
        &dir,
        "2_b.sql",
        "--UP--\nCREATE TABLE b (id INTEGER);\n\
         WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 20000000) \
         SELECT count(*) FROM n;\n--DOWN--\nDROP TABLE b;\n",
    )
    .await;

    let mut migrator = Migrator::new(FileSource::new(&dir), sqlite().await);
    migrator.migrate(1).await.unwrap();

    let result = tokio::time::timeout(Duration::from_millis(300), migrator.migrate(2)).await;
    assert!(result.is_err());

    assert_eq!(migrator.applied_versions().await.unwrap(), vec![1]);
    assert!(table_exists(migrator.store(), "a").await);
    assert!(!table_exists(migrator.store(), "b").await);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}
