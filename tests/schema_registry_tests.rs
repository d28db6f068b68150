/// Schema registry tests
///
/// Lazy table/column creation, cache bounds and eviction, prepared-statement
/// reuse and absorption of failed ALTERs, seen through the adapter.
/// Run with: cargo test --test schema_registry_tests
mod common;

use common::{RecordingEngine, record};
use lazytable::schema::{EnsureOutcome, Strictness};
use lazytable::{Adapter, AdapterConfig, AdapterError, ColumnDef, Condition, FindOptions, SqlStatement, SqliteEngine, Value};

#[tokio::test]
async fn test_table_and_columns_created_on_first_write() {
    let (engine, recorder) = RecordingEngine::new();
    let adapter = Adapter::new(engine);

    adapter
        .create("user", record(&[("id", Value::from("u1")), ("name", Value::from("Ann"))]))
        .await
        .unwrap();

    assert_eq!(recorder.count("CREATE TABLE IF NOT EXISTS \"user\" (\"id\" TEXT PRIMARY KEY)"), 1);
    assert_eq!(recorder.count("ALTER TABLE \"user\" ADD COLUMN \"name\""), 1);
    assert!(adapter.registry().is_table_known("user"));
    assert!(adapter.registry().is_column_known("user", "id"));
    assert!(adapter.registry().is_column_known("user", "name"));

    // A second write with the same shape touches no DDL.
    adapter
        .create("user", record(&[("id", Value::from("u2")), ("name", Value::from("Bo"))]))
        .await
        .unwrap();
    assert_eq!(recorder.count_prefix("CREATE TABLE"), 1);
    assert_eq!(recorder.count_prefix("ALTER TABLE"), 1);
}

#[tokio::test]
async fn test_prepared_statements_are_reused() {
    let (engine, recorder) = RecordingEngine::new();
    let adapter = Adapter::new(engine);
    adapter
        .create("user", record(&[("id", Value::from("u1"))]))
        .await
        .unwrap();

    for _ in 0..5 {
        adapter
            .find_one("user", &[Condition::eq("id", "u1")], &[])
            .await
            .unwrap();
    }

    assert_eq!(recorder.count("SELECT * FROM \"user\" WHERE \"id\" = ? LIMIT ?"), 1);
    assert!(adapter.executor().cached_statements() > 0);

    adapter.clear_caches();
    assert_eq!(adapter.executor().cached_statements(), 0);
    assert!(!adapter.registry().is_table_known("user"));

    adapter
        .find_one("user", &[Condition::eq("id", "u1")], &[])
        .await
        .unwrap();
    assert_eq!(recorder.count("SELECT * FROM \"user\" WHERE \"id\" = ? LIMIT ?"), 2);
}

#[tokio::test]
async fn test_failed_alter_is_absorbed_and_not_retried() {
    let (engine, recorder) = RecordingEngine::new();
    let adapter = Adapter::new(engine.failing("ALTER TABLE"));

    // The ALTER fails quietly; the insert then fails on the missing column.
    let err = adapter
        .create("user", record(&[("id", Value::from("u1")), ("name", Value::from("Ann"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Engine(_)));
    assert!(adapter.registry().is_column_known("user", "name"));

    let _ = adapter
        .create("user", record(&[("id", Value::from("u2")), ("name", Value::from("Bo"))]))
        .await;
    assert_eq!(recorder.count_prefix("ALTER TABLE"), 1);

    // Writes that only touch existing columns still work.
    adapter
        .create("user", record(&[("id", Value::from("u3"))]))
        .await
        .unwrap();
    assert_eq!(adapter.count("user", &[]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_create_table_failure_escalates_only_for_create() {
    let (engine, _) = RecordingEngine::new();
    let adapter = Adapter::new(engine.failing("CREATE TABLE"));
    let trace = None;

    let model = adapter.validator().validate_model("session").unwrap();
    let outcome = adapter
        .registry()
        .ensure_table(&model, Strictness::BestEffort, trace)
        .await
        .unwrap();
    assert!(outcome.is_ignored());
    assert!(adapter.registry().is_table_known("session"));

    let (engine, _) = RecordingEngine::new();
    let adapter = Adapter::new(engine.failing("CREATE TABLE"));
    let err = adapter
        .create("session", record(&[("id", Value::from("s1"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Engine(_)));
}

#[tokio::test]
async fn test_schema_cache_evicts_oldest_table_with_its_columns() {
    let config = AdapterConfig::new().schema_cache_capacity(2);
    let adapter = Adapter::with_config(SqliteEngine::open_in_memory().unwrap(), config).unwrap();

    adapter
        .create("user", record(&[("id", Value::from("u1")), ("name", Value::from("Ann"))]))
        .await
        .unwrap();
    adapter.count("session", &[]).await.unwrap();
    assert!(adapter.registry().is_column_known("user", "name"));

    adapter.count("account", &[]).await.unwrap();

    let registry = adapter.registry();
    assert!(!registry.is_table_known("user"));
    assert!(!registry.is_column_known("user", "name"));
    assert!(!registry.is_column_known("user", "id"));
    assert!(registry.is_table_known("session"));
    assert!(registry.is_table_known("account"));
    assert_eq!(registry.known_tables(), 2);

    // The evicted table is rediscovered from the catalog, data intact.
    let model = adapter.validator().validate_model("user").unwrap();
    assert_eq!(
        registry.ensure_table(&model, Strictness::Strict, None).await.unwrap(),
        EnsureOutcome::Existed
    );
    assert!(registry.is_column_known("user", "name"));
    assert_eq!(adapter.count("user", &[]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_existing_table_is_discovered_and_names_normalized() {
    let adapter = Adapter::new(SqliteEngine::open_in_memory().unwrap());
    adapter
        .execute_batch(
            vec![
                SqlStatement::new("CREATE TABLE \"user\" (\"id\" TEXT PRIMARY KEY, \"emailverified\", \"createdat\")"),
                SqlStatement::new("INSERT INTO \"user\" VALUES ('u1', 1, '2024-01-02T03:04:05.000Z')"),
            ],
            lazytable::BatchMode::AllOrNothing,
        )
        .await
        .unwrap();

    let found = adapter
        .find_one("user", &[Condition::eq("id", "u1")], &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["emailVerified"], Value::Boolean(true));
    assert!(found["createdAt"].as_date().is_some());
    assert!(adapter.registry().is_column_known("user", "emailverified"));
}

#[tokio::test]
async fn test_model_baseline_columns() {
    let config = AdapterConfig::new().model_columns(
        "session",
        vec![ColumnDef::new("userId", "TEXT"), ColumnDef::new("expiresAt", "TEXT")],
    );
    let (engine, recorder) = RecordingEngine::new();
    let adapter = Adapter::with_config(engine, config).unwrap();

    adapter
        .find_many("session", &[Condition::eq("userId", "u1")], &FindOptions::new())
        .await
        .unwrap();

    assert_eq!(
        recorder.count(
            "CREATE TABLE IF NOT EXISTS \"session\" (\"id\" TEXT PRIMARY KEY, \"userId\" TEXT, \"expiresAt\" TEXT)"
        ),
        1
    );
    assert_eq!(recorder.count_prefix("ALTER TABLE"), 0);
}
