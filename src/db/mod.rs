//! Database access layer.
//!
//! This module provides database access functionality:
//! - Connection pool management and the fatal-error signal
//! - Transactional execution
//! - Schema migration and baseline seeding
//! - Type mappings and parameter binding
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod migrator;
pub mod params;
pub mod pool;
pub mod seed;
pub mod transaction;
pub mod types;

pub use migrator::{NoPartitioning, PartitionStrategy, SchemaMigrator};
pub use pool::{ConnectionHandle, DbPool, FatalSignal, PoolManager, PoolStatistics};
pub use seed::{AdminAccount, RetentionPolicy, RetentionPolicySeeder};
pub use transaction::TransactionExecutor;
