//! Transactional execution on top of the pool.
//!
//! A unit of work runs against one exclusively leased connection between
//! `BEGIN` and `COMMIT`. Any error it returns, or any panic it raises, rolls
//! the transaction back before the error (or panic) continues to the caller.
//! The connection is released on every exit path.
//!
//! Nested transactions are not supported. Calling `transaction` from inside a
//! unit of work leases a second, independent connection; callers must not
//! rely on it seeing the outer unit's uncommitted writes.

use crate::db::pool::{ConnectionHandle, PoolManager};
use crate::error::DbError;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

/// Runs units of work atomically against a [`PoolManager`].
#[derive(Debug, Clone)]
pub struct TransactionExecutor {
    pool: PoolManager,
}

impl TransactionExecutor {
    pub fn new(pool: PoolManager) -> Self {
        Self { pool }
    }

    /// Run `unit` inside a transaction.
    ///
    /// On `Ok` the transaction is committed and the value returned. On `Err`
    /// the transaction is rolled back and the unit's error is returned
    /// unchanged; a failing rollback is logged and does not replace it.
    ///
    /// If COMMIT itself fails, the commit error is returned and the
    /// connection is closed instead of going back to the pool.
    ///
    /// ```ignore
    /// let id = executor
    ///     .transaction(|conn| {
    ///         Box::pin(async move {
    ///             conn.execute("INSERT INTO users (username) VALUES ($1)", &[name.into()])
    ///                 .await?;
    ///             Ok::<_, DbError>(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, E, F>(&self, unit: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut ConnectionHandle) -> BoxFuture<'c, Result<T, E>>,
        E: From<DbError>,
    {
        let mut handle = self.pool.acquire().await?;

        handle.control("BEGIN").await?;
        handle.set_in_transaction(true);
        debug!("Transaction started");

        let outcome = AssertUnwindSafe(unit(&mut handle)).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => match handle.control("COMMIT").await {
                Ok(()) => {
                    handle.set_in_transaction(false);
                    handle.release();
                    debug!("Transaction committed");
                    Ok(value)
                }
                Err(e) => {
                    warn!(error = %e, "Commit failed");
                    // The handle stays marked, so its connection is closed on release
                    if let Err(rollback_err) = handle.control("ROLLBACK").await {
                        warn!(error = %rollback_err, "Rollback after failed commit failed");
                    }
                    handle.release();
                    Err(e.into())
                }
            },
            Ok(Err(err)) => {
                rollback(&mut handle).await;
                handle.release();
                Err(err)
            }
            Err(panic) => {
                rollback(&mut handle).await;
                handle.release();
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Roll back the open transaction on `handle`, best effort.
///
/// The handle stays marked as in a transaction if ROLLBACK fails, so its
/// connection is closed rather than returned to the pool.
async fn rollback(handle: &mut ConnectionHandle) {
    match handle.control("ROLLBACK").await {
        Ok(()) => {
            handle.set_in_transaction(false);
            debug!("Transaction rolled back");
        }
        Err(e) => warn!(error = %e, "Rollback failed"),
    }
}

impl PoolManager {
    /// Run `unit` inside a transaction. See [`TransactionExecutor::transaction`].
    pub async fn transaction<T, E, F>(&self, unit: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut ConnectionHandle) -> BoxFuture<'c, Result<T, E>>,
        E: From<DbError>,
    {
        TransactionExecutor::new(self.clone()).transaction(unit).await
    }
}
