//! Connection pool management.
//!
//! [`PoolManager`] owns one bounded pool of connections to a single endpoint
//! and is the only sanctioned way to reach the store. Components receive it by
//! reference; [`PoolManager::initialize`] offers a process-wide instance for
//! entrypoints that want one.
//!
//! Connections are leased as [`ConnectionHandle`]s. A handle is owned by one
//! caller, and returning it to the pool happens exactly once: explicitly via
//! [`ConnectionHandle::release`] or implicitly when it is dropped on an error
//! or panic path.
//!
//! Errors that leave the pool itself in an untrustworthy state are published
//! on a watch channel (see [`PoolManager::fatal_signal`]). The owner of the
//! pool decides whether to terminate or rebuild; this layer never exits the
//! process.

use crate::db::params::{bind_postgres_param, bind_sqlite_param};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, PoolConfig, QueryParam, RowSet};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgPool, Postgres, Sqlite, SqlitePool};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{OnceCell, watch};
use tracing::{debug, error, info, warn};

/// Session parameters applied to every PostgreSQL connection.
const PG_WORK_MEM: &str = "4MB";
const PG_TEMP_BUFFERS: &str = "8MB";

static GLOBAL_POOL: OnceCell<PoolManager> = OnceCell::const_new();

/// Backend-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        impl_db_dispatch!(self, {
            Postgres(pool) => pool.close().await,
            SQLite(pool) => pool.close().await,
        })
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    fn size(&self) -> u32 {
        impl_db_dispatch!(self, {
            Postgres(pool) => pool.size(),
            SQLite(pool) => pool.size(),
        })
    }

    fn num_idle(&self) -> usize {
        impl_db_dispatch!(self, {
            Postgres(pool) => pool.num_idle(),
            SQLite(pool) => pool.num_idle(),
        })
    }

    fn is_closed(&self) -> bool {
        impl_db_dispatch!(self, {
            Postgres(pool) => pool.is_closed(),
            SQLite(pool) => pool.is_closed(),
        })
    }
}

/// Point-in-time snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatistics {
    /// Open physical connections (idle plus in use)
    pub total: u32,
    pub idle: u32,
    /// Callers currently blocked in `acquire`
    pub waiting: u32,
    /// Handles currently checked out
    pub leased: u32,
}

/// Published when the pool hits an error it cannot recover from.
#[derive(Debug, Clone, Serialize)]
pub struct FatalSignal {
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

struct PoolInner {
    pool: DbPool,
    config: PoolConfig,
    waiting: AtomicUsize,
    leased: AtomicUsize,
    fatal_tx: watch::Sender<Option<FatalSignal>>,
}

impl PoolInner {
    /// Publish fatal errors to the supervisor, then hand the error back.
    fn report(&self, err: DbError) -> DbError {
        if err.is_fatal() {
            error!(
                target_db = %self.config.masked_target(),
                error = %err,
                "Fatal pool error"
            );
            self.fatal_tx.send_replace(Some(FatalSignal {
                message: err.to_string(),
                raised_at: Utc::now(),
            }));
        }
        err
    }
}

/// Bounded pool of connections to one database endpoint.
///
/// Cloning is cheap and yields a handle to the same pool.
#[derive(Clone)]
pub struct PoolManager {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("pool", &self.inner.pool)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl PoolManager {
    /// Build a lazily connecting pool.
    ///
    /// No I/O happens here; an unreachable store surfaces on the first
    /// `acquire` or `health_check`. Must be called within a Tokio runtime.
    pub fn new(config: PoolConfig) -> DbResult<Self> {
        config.validate().map_err(DbError::invalid_input)?;

        let pool = match config.db_type {
            DatabaseType::PostgreSQL => DbPool::Postgres(
                Self::pg_pool_options(&config).connect_lazy_with(Self::pg_connect_options(&config)),
            ),
            DatabaseType::SQLite => DbPool::SQLite(
                Self::sqlite_pool_options(&config)
                    .connect_lazy_with(Self::sqlite_connect_options(&config)),
            ),
        };

        info!(
            target_db = %config.masked_target(),
            max_connections = config.max_connections,
            connect_timeout_ms = config.connect_timeout_ms,
            "Connection pool created"
        );

        Ok(Self::from_parts(pool, config))
    }

    /// Build the pool and verify that one connection can be opened.
    pub async fn connect(config: PoolConfig) -> DbResult<Self> {
        config.validate().map_err(DbError::invalid_input)?;

        info!(target_db = %config.masked_target(), "Connecting to database");

        let pool = match config.db_type {
            DatabaseType::PostgreSQL => Self::pg_pool_options(&config)
                .connect_with(Self::pg_connect_options(&config))
                .await
                .map(DbPool::Postgres),
            DatabaseType::SQLite => Self::sqlite_pool_options(&config)
                .connect_with(Self::sqlite_connect_options(&config))
                .await
                .map(DbPool::SQLite),
        }
        .map_err(|e| {
            DbError::connection(
                format!("Failed to connect: {}", e),
                connection_suggestion(config.db_type, &e),
            )
        })?;

        info!(target_db = %config.masked_target(), "Connected successfully");
        Ok(Self::from_parts(pool, config))
    }

    /// Initialize the process-wide pool, or return it if it already exists.
    ///
    /// Configuration is fixed for the process lifetime: once the pool exists,
    /// `config` is ignored.
    pub async fn initialize(config: PoolConfig) -> DbResult<&'static PoolManager> {
        if GLOBAL_POOL.initialized() {
            warn!("Connection pool already initialized; ignoring new configuration");
        }
        GLOBAL_POOL
            .get_or_try_init(|| async move { Self::new(config) })
            .await
    }

    /// The process-wide pool, if [`PoolManager::initialize`] has run.
    pub fn global() -> Option<&'static PoolManager> {
        GLOBAL_POOL.get()
    }

    fn from_parts(pool: DbPool, config: PoolConfig) -> Self {
        let (fatal_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(PoolInner {
                pool,
                config,
                waiting: AtomicUsize::new(0),
                leased: AtomicUsize::new(0),
                fatal_tx,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn db_type(&self) -> DatabaseType {
        self.inner.pool.db_type()
    }

    /// Whether two managers share the same underlying pool.
    pub fn same_pool(&self, other: &PoolManager) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Lease a connection, waiting up to the configured connect timeout.
    pub async fn acquire(&self) -> DbResult<ConnectionHandle> {
        let start = Instant::now();
        let waiting = WaitingGuard::enter(&self.inner.waiting);

        let result = impl_db_dispatch!(&self.inner.pool, {
            Postgres(pool) => pool.acquire().await.map(LeasedConnection::Postgres),
            SQLite(pool) => pool.acquire().await.map(LeasedConnection::SQLite),
        });
        drop(waiting);

        let conn = result.map_err(|e| match e {
            sqlx::Error::PoolTimedOut if self.has_free_slot() => {
                // Capacity was available, so the time went into failed connects
                let waited_ms = start.elapsed().as_millis() as u64;
                warn!(
                    waited_ms = waited_ms,
                    target_db = %self.inner.config.masked_target(),
                    "Timed out opening a database connection"
                );
                DbError::connection(
                    format!("Timed out after {}ms opening a connection", waited_ms),
                    format!(
                        "Check that the {} server is running and accessible",
                        self.inner.config.db_type
                    ),
                )
            }
            sqlx::Error::PoolTimedOut => {
                let waited_ms = start.elapsed().as_millis() as u64;
                warn!(
                    waited_ms = waited_ms,
                    max_connections = self.inner.config.max_connections,
                    "Connection pool exhausted"
                );
                DbError::pool_exhausted(waited_ms)
            }
            other => self.inner.report(other.into()),
        })?;

        self.inner.leased.fetch_add(1, Ordering::AcqRel);
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Connection acquired"
        );

        Ok(ConnectionHandle {
            conn,
            inner: Arc::clone(&self.inner),
            in_transaction: false,
        })
    }

    fn has_free_slot(&self) -> bool {
        self.inner.leased.load(Ordering::Acquire) < self.inner.config.max_connections as usize
    }

    /// Return a handle to the pool.
    pub fn release(&self, handle: ConnectionHandle) {
        handle.release();
    }

    /// Run one statement on a freshly leased connection and return its rows.
    ///
    /// The connection is released before the result is returned, on success
    /// and failure alike.
    pub async fn query(&self, sql: &str, params: &[QueryParam]) -> DbResult<RowSet> {
        let mut handle = self.acquire().await?;
        let result = handle.query(sql, params).await;
        handle.release();
        result
    }

    /// Run one statement on a freshly leased connection and return the number
    /// of rows affected.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let mut handle = self.acquire().await?;
        let result = handle.execute(sql, params).await;
        handle.release();
        result
    }

    /// Run a trivial statement against the store. Never errors.
    pub async fn health_check(&self) -> bool {
        match self.query("SELECT 1 AS ok", &[]).await {
            Ok(rows) => !rows.is_empty(),
            Err(e) => {
                warn!(
                    target_db = %self.inner.config.masked_target(),
                    error = %e,
                    "Database health check failed"
                );
                false
            }
        }
    }

    /// Snapshot of current pool occupancy.
    pub fn statistics(&self) -> PoolStatistics {
        PoolStatistics {
            total: self.inner.pool.size(),
            idle: self.inner.pool.num_idle() as u32,
            waiting: self.inner.waiting.load(Ordering::Acquire) as u32,
            leased: self.inner.leased.load(Ordering::Acquire) as u32,
        }
    }

    /// Subscribe to fatal pool errors.
    ///
    /// The receiver holds `None` until a fatal error has been observed.
    pub fn fatal_signal(&self) -> watch::Receiver<Option<FatalSignal>> {
        self.inner.fatal_tx.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }

    /// Close all connections. Later acquires fail.
    pub async fn shutdown(&self) {
        if self.is_closed() {
            return;
        }
        self.inner.pool.close().await;
        info!(target_db = %self.inner.config.masked_target(), "Connection pool closed");
    }

    fn pg_connect_options(config: &PoolConfig) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .application_name(&config.application_name)
            .ssl_mode(if config.ssl {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            })
            .options([
                ("statement_timeout", config.statement_timeout_ms.to_string()),
                ("work_mem", PG_WORK_MEM.to_string()),
                ("temp_buffers", PG_TEMP_BUFFERS.to_string()),
            ]);
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        options
    }

    fn pg_pool_options(config: &PoolConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(0)
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .test_before_acquire(true)
    }

    fn sqlite_connect_options(config: &PoolConfig) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&config.database)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.statement_timeout())
    }

    fn sqlite_pool_options(config: &PoolConfig) -> SqlitePoolOptions {
        SqlitePoolOptions::new()
            .min_connections(0)
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .test_before_acquire(true)
    }
}

/// Counts a caller as waiting for as long as it is inside `acquire`,
/// including when the acquire future is dropped early.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Backend-specific leased connection.
pub(crate) enum LeasedConnection {
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

/// A leased connection, exclusively owned by one caller.
///
/// The connection goes back to the pool when the handle is released or
/// dropped. A handle dropped while a transaction is still open has its
/// physical connection closed instead, so no pooled connection ever carries
/// an open transaction.
pub struct ConnectionHandle {
    conn: LeasedConnection,
    inner: Arc<PoolInner>,
    in_transaction: bool,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("db_type", &self.db_type())
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub fn db_type(&self) -> DatabaseType {
        self.inner.pool.db_type()
    }

    /// Whether a transaction opened on this handle is still in progress.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Run a statement and return its rows.
    pub fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [QueryParam],
    ) -> BoxFuture<'a, DbResult<RowSet>> {
        Box::pin(async move {
            debug!(sql = %sql, params = ?param_types(params), "Executing query");

            let result = impl_conn_dispatch!(&mut self.conn, {
                Postgres(conn) => {
                    let mut query = sqlx::query(sql);
                    for param in params {
                        query = bind_postgres_param(query, param);
                    }
                    query.fetch_all(&mut **conn).await.map(|rows| to_row_set(&rows))
                },
                SQLite(conn) => {
                    let mut query = sqlx::query(sql);
                    for param in params {
                        query = bind_sqlite_param(query, param);
                    }
                    query.fetch_all(&mut **conn).await.map(|rows| to_row_set(&rows))
                },
            });

            result.map_err(|e| self.inner.report(e.into()))
        })
    }

    /// Run a statement and return the number of rows affected.
    pub fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [QueryParam],
    ) -> BoxFuture<'a, DbResult<u64>> {
        Box::pin(async move {
            debug!(sql = %sql, params = ?param_types(params), "Executing statement");

            let result = impl_conn_dispatch!(&mut self.conn, {
                Postgres(conn) => {
                    let mut query = sqlx::query(sql);
                    for param in params {
                        query = bind_postgres_param(query, param);
                    }
                    query.execute(&mut **conn).await.map(|r| r.rows_affected())
                },
                SQLite(conn) => {
                    let mut query = sqlx::query(sql);
                    for param in params {
                        query = bind_sqlite_param(query, param);
                    }
                    query.execute(&mut **conn).await.map(|r| r.rows_affected())
                },
            });

            result.map_err(|e| self.inner.report(e.into()))
        })
    }

    /// Issue a transaction control statement (BEGIN, COMMIT, ROLLBACK).
    pub(crate) fn control(&mut self, sql: &'static str) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            debug!(sql = %sql, "Transaction control");

            let result = impl_conn_dispatch!(&mut self.conn, {
                Postgres(conn) => sqlx::Executor::execute(&mut **conn, sqlx::raw_sql(sql)).await.map(|_| ()),
                SQLite(conn) => sqlx::Executor::execute(&mut **conn, sqlx::raw_sql(sql)).await.map(|_| ()),
            });

            result.map_err(|e| self.inner.report(e.into()))
        })
    }

    pub(crate) fn set_in_transaction(&mut self, in_transaction: bool) {
        self.in_transaction = in_transaction;
    }

    /// Return the connection to the pool.
    pub fn release(self) {
        debug!("Connection released");
        drop(self);
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!("Connection dropped inside an open transaction; closing it");
            impl_conn_dispatch!(&mut self.conn, {
                Postgres(conn) => conn.close_on_drop(),
                SQLite(conn) => conn.close_on_drop(),
            });
        }
        self.inner.leased.fetch_sub(1, Ordering::AcqRel);
    }
}

fn param_types(params: &[QueryParam]) -> Vec<&'static str> {
    params.iter().map(QueryParam::type_name).collect()
}

fn to_row_set<R: RowToJson>(rows: &[R]) -> RowSet {
    RowSet {
        columns: rows.first().map(|r| r.column_names()).unwrap_or_default(),
        rows: rows.iter().map(|r| r.to_json_map()).collect(),
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the database user and password".to_string();
    }

    if error_str.contains("does not exist") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match db_type {
        DatabaseType::PostgreSQL => "Verify DB_HOST, DB_PORT and DB_NAME".to_string(),
        DatabaseType::SQLite => "Verify the database file path is writable".to_string(),
    }
}
