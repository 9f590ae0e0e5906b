//! Audit Store Library
//!
//! Storage backbone for an audit-grade AI interaction logging platform: a
//! managed connection pool, a transactional execution wrapper, and a schema
//! lifecycle manager for PostgreSQL (and SQLite).

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;

pub use config::Config;
pub use db::{PoolManager, SchemaMigrator, TransactionExecutor};
pub use error::{DbError, DbResult};
