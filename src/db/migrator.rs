//! Schema lifecycle: create, index, partition and drop the persisted model.
//!
//! Every DDL statement runs as its own unit on the pool, outside any
//! transaction. The first failing statement stops the run. Migration assumes
//! no concurrent writers.

use crate::db::pool::PoolManager;
use crate::error::DbResult;
use crate::schema::{SchemaDescriptor, audit_schema};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Hook for splitting high-volume tables into partitions.
#[async_trait]
pub trait PartitionStrategy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    async fn create_partitions(
        &self,
        pool: &PoolManager,
        schema: &SchemaDescriptor,
    ) -> DbResult<()>;
}

/// Leaves every table unpartitioned.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPartitioning;

#[async_trait]
impl PartitionStrategy for NoPartitioning {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn create_partitions(
        &self,
        _pool: &PoolManager,
        _schema: &SchemaDescriptor,
    ) -> DbResult<()> {
        info!("No partitioning strategy configured, skipping partition creation");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SchemaMigrator {
    pool: PoolManager,
    schema: Arc<SchemaDescriptor>,
    partitions: Arc<dyn PartitionStrategy>,
}

impl SchemaMigrator {
    /// Migrator for the audit schema with no partitioning.
    pub fn new(pool: PoolManager) -> Self {
        Self::with_schema(pool, audit_schema())
    }

    pub fn with_schema(pool: PoolManager, schema: SchemaDescriptor) -> Self {
        Self {
            pool,
            schema: Arc::new(schema),
            partitions: Arc::new(NoPartitioning),
        }
    }

    pub fn with_partition_strategy(mut self, strategy: impl PartitionStrategy + 'static) -> Self {
        self.partitions = Arc::new(strategy);
        self
    }

    pub fn pool(&self) -> &PoolManager {
        &self.pool
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Create every table that does not exist yet, parents first.
    ///
    /// Returns the number of statements issued.
    pub async fn create_tables(&self) -> DbResult<usize> {
        self.schema.validate()?;
        let dialect = self.pool.db_type();
        let order = self.schema.creation_order()?;

        for table in &order {
            let sql = table.create_sql(dialect);
            info!(table = %table.name, "Creating table");
            debug!(sql = %sql, "DDL");
            self.pool.execute(&sql, &[]).await?;
        }
        Ok(order.len())
    }

    /// Create every index the backend supports. Full-text indexes are
    /// skipped on SQLite.
    ///
    /// Returns the number of statements issued.
    pub async fn create_indexes(&self) -> DbResult<usize> {
        let dialect = self.pool.db_type();
        let mut applied = 0;

        for index in self.schema.indexes() {
            let Some(sql) = index.create_sql(dialect) else {
                info!(
                    index = %index.name,
                    backend = %dialect,
                    "Index kind not supported by backend, skipping"
                );
                continue;
            };
            info!(index = %index.name, table = %index.table, "Creating index");
            debug!(sql = %sql, "DDL");
            self.pool.execute(&sql, &[]).await?;
            applied += 1;
        }
        Ok(applied)
    }

    pub async fn create_partitions(&self) -> DbResult<()> {
        debug!(strategy = self.partitions.name(), "Applying partition strategy");
        self.partitions
            .create_partitions(&self.pool, &self.schema)
            .await
    }

    /// Drop every table, children first.
    ///
    /// Returns the number of statements issued.
    pub async fn drop_tables(&self) -> DbResult<usize> {
        let dialect = self.pool.db_type();
        let order = self.schema.drop_order()?;

        for table in &order {
            let sql = table.drop_sql(dialect);
            info!(table = %table.name, "Dropping table");
            debug!(sql = %sql, "DDL");
            self.pool.execute(&sql, &[]).await?;
        }
        Ok(order.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::models::PoolConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn sqlite_pool(dir: &TempDir) -> PoolManager {
        let path = dir.path().join("migrator.db");
        PoolManager::new(PoolConfig::sqlite(path.to_string_lossy())).unwrap()
    }

    async fn table_names(pool: &PoolManager) -> Vec<String> {
        let rows = pool
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .await
            .unwrap();
        rows.rows
            .iter()
            .filter_map(|r| r.get("name").and_then(|v| v.as_str()).map(String::from))
            .collect()
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let pool = sqlite_pool(&dir);
        let migrator = SchemaMigrator::new(pool.clone());

        assert_eq!(migrator.create_tables().await.unwrap(), 7);
        assert_eq!(migrator.create_tables().await.unwrap(), 7);

        let tables = table_names(&pool).await;
        assert_eq!(
            tables,
            vec![
                "ai_interactions",
                "audit_logs",
                "performance_metrics",
                "retention_policies",
                "safety_flags",
                "trust_signals",
                "users",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_indexes_skips_full_text_on_sqlite() {
        let dir = TempDir::new().unwrap();
        let pool = sqlite_pool(&dir);
        let migrator = SchemaMigrator::new(pool.clone());

        migrator.create_tables().await.unwrap();
        assert_eq!(migrator.create_indexes().await.unwrap(), 14);
        assert_eq!(migrator.create_indexes().await.unwrap(), 14);

        let rows = pool
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 14);
    }

    #[tokio::test]
    async fn test_indexes_before_tables_fail() {
        let dir = TempDir::new().unwrap();
        let migrator = SchemaMigrator::new(sqlite_pool(&dir));

        let err = migrator.create_indexes().await.unwrap_err();
        assert!(matches!(err, DbError::Statement { .. }));
    }

    #[tokio::test]
    async fn test_drop_tables_removes_everything() {
        let dir = TempDir::new().unwrap();
        let pool = sqlite_pool(&dir);
        let migrator = SchemaMigrator::new(pool.clone());

        migrator.create_tables().await.unwrap();
        migrator.create_indexes().await.unwrap();
        assert_eq!(migrator.drop_tables().await.unwrap(), 7);
        assert!(table_names(&pool).await.is_empty());

        // Dropping an absent schema is not an error
        migrator.drop_tables().await.unwrap();
    }

    #[derive(Debug, Default)]
    struct CountingStrategy {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PartitionStrategy for CountingStrategy {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn create_partitions(
            &self,
            _pool: &PoolManager,
            schema: &SchemaDescriptor,
        ) -> DbResult<()> {
            assert_eq!(schema.tables().len(), 7);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_partition_strategy_is_pluggable() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let migrator = SchemaMigrator::new(sqlite_pool(&dir)).with_partition_strategy(
            CountingStrategy {
                calls: calls.clone(),
            },
        );

        migrator.create_partitions().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_default_partitioning_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let pool = sqlite_pool(&dir);
        SchemaMigrator::new(pool.clone())
            .create_partitions()
            .await
            .unwrap();
        assert!(table_names(&pool).await.is_empty());
    }
}
