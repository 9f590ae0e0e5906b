//! Operator commands: migrate, rollback and health.
//!
//! Runners never close the pool; the caller owns it and closes it on every
//! exit path.

use crate::db::migrator::SchemaMigrator;
use crate::db::pool::{PoolManager, PoolStatistics};
use crate::db::seed::{AdminAccount, RetentionPolicy, RetentionPolicySeeder};
use crate::error::{DbError, DbResult};
use serde::Serialize;
use std::future::Future;
use std::time::Instant;
use tracing::{error, info, warn};

/// Names of the migration steps, as reported in [`DbError::MigrationAborted`].
pub mod step {
    pub const CREATE_TABLES: &str = "create_tables";
    pub const CREATE_INDEXES: &str = "create_indexes";
    pub const CREATE_PARTITIONS: &str = "create_partitions";
    pub const SEED_RETENTION_POLICIES: &str = "seed_retention_policies";
    pub const SEED_ADMIN: &str = "seed_admin";
    pub const DROP_TABLES: &str = "drop_tables";
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub retention_policies: Vec<RetentionPolicy>,
    /// Created only when supplied
    pub admin: Option<AdminAccount>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            retention_policies: RetentionPolicy::defaults(),
            admin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub tables: usize,
    pub indexes: usize,
    pub policies_inserted: u64,
    /// `None` when no admin account was requested
    pub admin_created: Option<bool>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub tables_dropped: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub target: String,
    pub statistics: PoolStatistics,
}

async fn run_step<T>(name: &'static str, fut: impl Future<Output = DbResult<T>>) -> DbResult<T> {
    info!(step = name, "Running migration step");
    fut.await.map_err(|e| {
        error!(step = name, error = %e, "Migration step failed");
        DbError::migration_aborted(name, e)
    })
}

async fn ensure_healthy(pool: &PoolManager) -> DbResult<()> {
    if pool.health_check().await {
        Ok(())
    } else {
        Err(DbError::health_check_failed(pool.config().masked_target()))
    }
}

/// Create the audit schema and seed baseline rows.
pub async fn run_migrate(pool: &PoolManager, options: &MigrationOptions) -> DbResult<MigrationReport> {
    run_migrate_with(&SchemaMigrator::new(pool.clone()), options).await
}

/// [`run_migrate`] with a caller-built migrator, e.g. one with a partition
/// strategy.
pub async fn run_migrate_with(
    migrator: &SchemaMigrator,
    options: &MigrationOptions,
) -> DbResult<MigrationReport> {
    let start = Instant::now();
    let pool = migrator.pool();
    info!(target_db = %pool.config().masked_target(), "Starting migration");

    ensure_healthy(pool).await?;

    let seeder = RetentionPolicySeeder::new(pool.clone());

    let tables = run_step(step::CREATE_TABLES, migrator.create_tables()).await?;
    let indexes = run_step(step::CREATE_INDEXES, migrator.create_indexes()).await?;
    run_step(step::CREATE_PARTITIONS, migrator.create_partitions()).await?;
    let policies_inserted = run_step(
        step::SEED_RETENTION_POLICIES,
        seeder.seed_defaults(&options.retention_policies),
    )
    .await?;

    let admin_created = match &options.admin {
        Some(account) => Some(run_step(step::SEED_ADMIN, seeder.seed_admin(account)).await?),
        None => {
            warn!("No admin password hash supplied, no admin account was created");
            None
        }
    };

    let report = MigrationReport {
        tables,
        indexes,
        policies_inserted,
        admin_created,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        tables = report.tables,
        indexes = report.indexes,
        policies_inserted = report.policies_inserted,
        elapsed_ms = report.elapsed_ms,
        "Migration completed"
    );
    Ok(report)
}

/// Drop every audit table, children first.
pub async fn run_rollback(pool: &PoolManager) -> DbResult<RollbackReport> {
    run_rollback_with(&SchemaMigrator::new(pool.clone())).await
}

pub async fn run_rollback_with(migrator: &SchemaMigrator) -> DbResult<RollbackReport> {
    let start = Instant::now();
    let pool = migrator.pool();
    warn!(target_db = %pool.config().masked_target(), "Rolling back schema, all data will be lost");

    ensure_healthy(pool).await?;

    let tables_dropped = run_step(step::DROP_TABLES, migrator.drop_tables()).await?;

    let report = RollbackReport {
        tables_dropped,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        tables_dropped = report.tables_dropped,
        elapsed_ms = report.elapsed_ms,
        "Rollback completed"
    );
    Ok(report)
}

/// Probe the store and snapshot pool statistics. Never fails.
pub async fn run_health(pool: &PoolManager) -> HealthReport {
    let healthy = pool.health_check().await;
    let report = HealthReport {
        healthy,
        target: pool.config().masked_target(),
        statistics: pool.statistics(),
    };
    info!(
        healthy = report.healthy,
        target_db = %report.target,
        total = report.statistics.total,
        idle = report.statistics.idle,
        "Health check"
    );
    report
}
