//! Backend dispatch macros for reducing code duplication.
//!
//! The pool and its leased connections are enums over the supported
//! backends. These macros expand to the match over those variants so each
//! call site reads as a single expression.

/// Generate match arms over the `DbPool` variants.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     Postgres(p) => p.close().await,
///     SQLite(p) => p.close().await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Generate match arms over the `LeasedConnection` variants.
macro_rules! impl_conn_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::pool::LeasedConnection::$variant($c) => $body,
            )+
        }
    };
}

pub(crate) use impl_conn_dispatch;
pub use impl_db_dispatch;
