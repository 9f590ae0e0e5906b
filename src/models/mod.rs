//! Data models for the audit store.
//!
//! This module contains the configuration, parameter and result types shared
//! by the pool, the transaction executor and the migrator.

pub mod connection;
pub mod query;

pub use connection::{DatabaseType, PoolConfig};
pub use query::{QueryParam, RowSet};
