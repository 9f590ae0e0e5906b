//! Integration tests for the schema lifecycle against SQLite.

use audit_store::commands::{self, MigrationOptions, step};
use audit_store::db::{PoolManager, RetentionPolicy, SchemaMigrator};
use audit_store::error::DbError;
use audit_store::models::{PoolConfig, QueryParam};
use tempfile::TempDir;

fn sqlite_pool(dir: &TempDir) -> PoolManager {
    let path = dir.path().join("audit.db");
    PoolManager::new(PoolConfig::sqlite(path.to_string_lossy())).unwrap()
}

/// `(table, column)` pairs for every user table, for schema comparisons.
async fn schema_snapshot(pool: &PoolManager) -> Vec<(String, String)> {
    let rows = pool
        .query(
            "SELECT m.name AS table_name, p.name AS column_name \
             FROM sqlite_master m JOIN pragma_table_info(m.name) p \
             WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%' \
             ORDER BY m.name, p.cid",
            &[],
        )
        .await
        .unwrap();
    rows.rows
        .iter()
        .map(|r| {
            (
                r["table_name"].as_str().unwrap_or_default().to_string(),
                r["column_name"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

async fn count(pool: &PoolManager, table: &str) -> i64 {
    let rows = pool
        .query(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
        .await
        .unwrap();
    rows.first_value("n").and_then(|v| v.as_i64()).unwrap()
}

async fn insert_returning_id(pool: &PoolManager, sql: &str, params: &[QueryParam]) -> String {
    let rows = pool.query(sql, params).await.unwrap();
    rows.first_value("id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap()
}

/// A user with one interaction and a row in every child table.
async fn populate(pool: &PoolManager) -> String {
    let user_id = insert_returning_id(
        pool,
        "INSERT INTO users (username, email, password_hash, role) \
         VALUES ($1, $2, $3, $4) RETURNING id",
        &["analyst1".into(), "a1@example.com".into(), "$2b$10$x".into(), "analyst".into()],
    )
    .await;

    let interaction_id = insert_returning_id(
        pool,
        "INSERT INTO ai_interactions (user_id, session_id, interaction_type, prompt_content, response_content, prompt_metadata) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        &[
            user_id.as_str().into(),
            "session-1".into(),
            "text".into(),
            "What is the retention window?".into(),
            "Seven years.".into(),
            QueryParam::Json(serde_json::json!({"temperature": 0.2})),
        ],
    )
    .await;

    pool.execute(
        "INSERT INTO trust_signals (interaction_id, signal_type, signal_value, source) VALUES ($1, 'rating', 0.9, 'user_feedback')",
        &[interaction_id.as_str().into()],
    )
    .await
    .unwrap();
    pool.execute(
        "INSERT INTO safety_flags (interaction_id, flag_type, severity_level, resolved_by) VALUES ($1, 'bias_detected', 'low', $2)",
        &[interaction_id.as_str().into(), user_id.as_str().into()],
    )
    .await
    .unwrap();
    pool.execute(
        "INSERT INTO performance_metrics (interaction_id, metric_name, metric_value) VALUES ($1, 'latency', 12.5)",
        &[interaction_id.as_str().into()],
    )
    .await
    .unwrap();
    pool.execute(
        "INSERT INTO audit_logs (user_id, action, resource_type) VALUES ($1, 'export', 'ai_interactions')",
        &[user_id.as_str().into()],
    )
    .await
    .unwrap();

    interaction_id
}

#[tokio::test]
async fn test_generated_ids_are_uuids() {
    let dir = TempDir::new().unwrap();
    let pool = sqlite_pool(&dir);
    SchemaMigrator::new(pool.clone()).create_tables().await.unwrap();

    let interaction_id = populate(&pool).await;
    let parsed = uuid::Uuid::parse_str(&interaction_id).unwrap();
    assert_eq!(parsed.get_version_num(), 4);
}

#[tokio::test]
async fn test_drop_then_create_restores_schema() {
    let dir = TempDir::new().unwrap();
    let pool = sqlite_pool(&dir);
    let migrator = SchemaMigrator::new(pool.clone());

    migrator.create_tables().await.unwrap();
    migrator.create_indexes().await.unwrap();
    let before = schema_snapshot(&pool).await;
    assert!(!before.is_empty());

    migrator.drop_tables().await.unwrap();
    assert!(schema_snapshot(&pool).await.is_empty());

    migrator.create_tables().await.unwrap();
    migrator.create_indexes().await.unwrap();
    assert_eq!(schema_snapshot(&pool).await, before);
}

#[tokio::test]
async fn test_drop_succeeds_with_populated_children() {
    let dir = TempDir::new().unwrap();
    let pool = sqlite_pool(&dir);
    let migrator = SchemaMigrator::new(pool.clone());

    migrator.create_tables().await.unwrap();
    populate(&pool).await;
    assert_eq!(count(&pool, "trust_signals").await, 1);

    // Foreign keys are enforced, so only child-first ordering can succeed
    assert_eq!(migrator.drop_tables().await.unwrap(), 7);
    assert!(schema_snapshot(&pool).await.is_empty());
}

#[tokio::test]
async fn test_deleting_interaction_cascades_to_children() {
    let dir = TempDir::new().unwrap();
    let pool = sqlite_pool(&dir);
    SchemaMigrator::new(pool.clone()).create_tables().await.unwrap();

    let interaction_id = populate(&pool).await;
    pool.execute(
        "DELETE FROM ai_interactions WHERE id = $1",
        &[interaction_id.as_str().into()],
    )
    .await
    .unwrap();

    assert_eq!(count(&pool, "trust_signals").await, 0);
    assert_eq!(count(&pool, "safety_flags").await, 0);
    assert_eq!(count(&pool, "performance_metrics").await, 0);
    // audit_logs reference users, not interactions
    assert_eq!(count(&pool, "audit_logs").await, 1);
}

#[tokio::test]
async fn test_constraints_are_enforced() {
    let dir = TempDir::new().unwrap();
    let pool = sqlite_pool(&dir);
    SchemaMigrator::new(pool.clone()).create_tables().await.unwrap();

    let bad_role = pool
        .execute(
            "INSERT INTO users (username, email, password_hash, role) VALUES ('x', 'x@e.com', 'h', 'superuser')",
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(bad_role, DbError::Statement { .. }));

    let bad_score = pool
        .execute(
            "INSERT INTO trust_signals (signal_type, signal_value, source) VALUES ('rating', 1.5, 'user_feedback')",
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(bad_score, DbError::Statement { .. }));

    let orphan = pool
        .execute(
            "INSERT INTO trust_signals (interaction_id, signal_type, source) VALUES ('00000000-0000-4000-8000-000000000000', 'rating', 'user_feedback')",
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(orphan, DbError::Statement { .. }));
}

#[tokio::test]
async fn test_migrate_seeds_default_retention_policies() {
    let dir = TempDir::new().unwrap();
    let pool = sqlite_pool(&dir);

    let report = commands::run_migrate(&pool, &MigrationOptions::default())
        .await
        .unwrap();
    assert_eq!(report.policies_inserted, 5);

    let rows = pool
        .query(
            "SELECT table_name, retention_days, archival_enabled, deletion_enabled \
             FROM retention_policies ORDER BY table_name",
            &[],
        )
        .await
        .unwrap();
    let expected = {
        let mut defaults = RetentionPolicy::defaults();
        defaults.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        defaults
    };
    assert_eq!(rows.len(), expected.len());
    for (row, policy) in rows.rows.iter().zip(&expected) {
        assert_eq!(row["table_name"].as_str(), Some(policy.table_name.as_str()));
        assert_eq!(row["retention_days"].as_i64(), Some(policy.retention_days as i64));
        assert_eq!(row["archival_enabled"].as_bool(), Some(policy.archival_enabled));
        assert_eq!(row["deletion_enabled"].as_bool(), Some(policy.deletion_enabled));
    }
}

#[tokio::test]
async fn test_failed_health_check_issues_no_ddl() {
    let dir = TempDir::new().unwrap();
    let pool = sqlite_pool(&dir);
    pool.shutdown().await;

    let err = commands::run_migrate(&pool, &MigrationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::HealthCheckFailed { .. }));
    assert_eq!(err.failed_step(), None);

    let reopened = sqlite_pool(&dir);
    assert!(schema_snapshot(&reopened).await.is_empty());
}

#[tokio::test]
async fn test_rollback_against_unreachable_store_fails_before_ddl() {
    let config = PoolConfig::postgres("127.0.0.1", 1, "audit", "nobody", "")
        .with_connect_timeout_ms(500);
    let pool = PoolManager::new(config).unwrap();

    let err = commands::run_rollback(&pool).await.unwrap_err();
    assert!(matches!(err, DbError::HealthCheckFailed { .. }));
}

#[tokio::test]
async fn test_drop_failure_is_reported_as_drop_step() {
    let dir = TempDir::new().unwrap();
    let pool = sqlite_pool(&dir);
    SchemaMigrator::new(pool.clone()).create_tables().await.unwrap();

    // A table outside the schema that still references `users` blocks its drop
    pool.execute(
        "CREATE TABLE sessions (id INTEGER PRIMARY KEY, user_id TEXT REFERENCES users(id))",
        &[],
    )
    .await
    .unwrap();
    populate(&pool).await;
    pool.execute(
        "INSERT INTO sessions (user_id) SELECT id FROM users",
        &[],
    )
    .await
    .unwrap();

    let err = commands::run_rollback(&pool).await.unwrap_err();
    assert_eq!(err.failed_step(), Some(step::DROP_TABLES));
}
