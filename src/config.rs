//! Configuration handling for the audit store.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::db::seed::AdminAccount;
use crate::models::connection::{
    DEFAULT_APPLICATION_NAME, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DATABASE, DEFAULT_HOST,
    DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT, DEFAULT_STATEMENT_TIMEOUT_MS,
    DEFAULT_USER,
};
use crate::models::{DatabaseType, PoolConfig};
use clap::{Args, Parser, Subcommand, ValueEnum};

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";

/// Database backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Backend {
    #[default]
    #[value(alias = "postgresql")]
    Postgres,
    Sqlite,
}

impl From<Backend> for DatabaseType {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Postgres => DatabaseType::PostgreSQL,
            Backend::Sqlite => DatabaseType::SQLite,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Postgres => write!(f, "postgres"),
            Backend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Connection target and pool tuning.
#[derive(Clone, Args)]
pub struct DatabaseArgs {
    /// Connection URL; overrides the individual target options when set
    #[arg(long = "database-url", env = "DATABASE_URL", hide_env_values = true, global = true)]
    pub url: Option<String>,

    /// Database backend
    #[arg(long = "db-type", value_enum, default_value_t = Backend::Postgres, env = "DB_TYPE", global = true)]
    pub db_type: Backend,

    /// Database host
    #[arg(long = "db-host", default_value = DEFAULT_HOST, env = "DB_HOST", global = true)]
    pub host: String,

    /// Database port
    #[arg(long = "db-port", default_value_t = DEFAULT_PORT, env = "DB_PORT", global = true)]
    pub port: u16,

    /// Database name, or file path for SQLite
    #[arg(long = "db-name", default_value = DEFAULT_DATABASE, env = "DB_NAME", global = true)]
    pub database: String,

    /// Database user
    #[arg(long = "db-user", default_value = DEFAULT_USER, env = "DB_USER", global = true)]
    pub user: String,

    /// Database password (empty for trust or peer authentication)
    #[arg(
        long = "db-password",
        default_value = "",
        env = "DB_PASSWORD",
        hide_env_values = true,
        hide_default_value = true,
        global = true
    )]
    pub password: String,

    /// Require TLS
    #[arg(long = "db-ssl", env = "DB_SSL", global = true)]
    pub ssl: bool,

    /// Maximum pool size
    #[arg(
        long = "db-max-connections",
        default_value_t = DEFAULT_MAX_CONNECTIONS,
        env = "DB_MAX_CONNECTIONS",
        global = true
    )]
    pub max_connections: u32,

    /// Idle connection timeout in milliseconds
    #[arg(
        long = "db-idle-timeout",
        default_value_t = DEFAULT_IDLE_TIMEOUT_MS,
        env = "DB_IDLE_TIMEOUT",
        global = true
    )]
    pub idle_timeout_ms: u64,

    /// How long to wait for a connection, in milliseconds
    #[arg(
        long = "db-connection-timeout",
        default_value_t = DEFAULT_CONNECT_TIMEOUT_MS,
        env = "DB_CONNECTION_TIMEOUT",
        global = true
    )]
    pub connect_timeout_ms: u64,

    /// Per-statement timeout in milliseconds
    #[arg(
        long = "db-statement-timeout",
        default_value_t = DEFAULT_STATEMENT_TIMEOUT_MS,
        env = "DB_STATEMENT_TIMEOUT",
        global = true
    )]
    pub statement_timeout_ms: u64,
}

impl std::fmt::Debug for DatabaseArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseArgs")
            .field("url", &self.url.as_ref().map(|_| "****"))
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"****")
            .field("ssl", &self.ssl)
            .field("max_connections", &self.max_connections)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .finish()
    }
}

impl Default for DatabaseArgs {
    fn default() -> Self {
        Self {
            url: None,
            db_type: Backend::Postgres,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            ssl: false,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS,
        }
    }
}

#[derive(Clone, Args)]
pub struct MigrateArgs {
    /// Username for the admin account
    #[arg(long, default_value = DEFAULT_ADMIN_USERNAME, env = "ADMIN_USERNAME")]
    pub admin_username: String,

    /// Email for the admin account
    #[arg(long, default_value = DEFAULT_ADMIN_EMAIL, env = "ADMIN_EMAIL")]
    pub admin_email: String,

    /// Pre-hashed (bcrypt/argon2) password for the admin account.
    /// No admin account is created without it.
    #[arg(long, env = "ADMIN_PASSWORD_HASH", hide_env_values = true)]
    pub admin_password_hash: Option<String>,
}

impl std::fmt::Debug for MigrateArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrateArgs")
            .field("admin_username", &self.admin_username)
            .field("admin_email", &self.admin_email)
            .field(
                "admin_password_hash",
                &self.admin_password_hash.as_ref().map(|_| "****"),
            )
            .finish()
    }
}

impl MigrateArgs {
    /// The admin account to seed, if a password hash was supplied.
    pub fn admin_account(&self) -> Option<AdminAccount> {
        self.admin_password_hash
            .as_deref()
            .filter(|hash| !hash.is_empty())
            .map(|hash| AdminAccount::new(&self.admin_username, &self.admin_email, hash))
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create tables, indexes and partitions, then seed baseline rows
    Migrate(MigrateArgs),
    /// Drop every audit table (destroys all data)
    Rollback,
    /// Check connectivity and print pool statistics
    Health,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Migrate(_) => "migrate",
            Command::Rollback => "rollback",
            Command::Health => "health",
        }
    }
}

/// Configuration for the audit store CLI.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "audit-store",
    about = "Schema lifecycle and connection management for the AI interaction audit store",
    version,
    author
)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "JSON_LOGS", global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Build the validated pool configuration.
    pub fn pool_config(&self) -> Result<PoolConfig, String> {
        let db = &self.database;
        let target = match &db.url {
            Some(url) => PoolConfig::from_url(url)?,
            None => PoolConfig {
                db_type: db.db_type.into(),
                host: db.host.clone(),
                port: db.port,
                database: db.database.clone(),
                user: db.user.clone(),
                password: db.password.clone(),
                ssl: db.ssl,
                ..PoolConfig::default()
            },
        };
        let config = PoolConfig {
            max_connections: db.max_connections,
            idle_timeout_ms: db.idle_timeout_ms,
            connect_timeout_ms: db.connect_timeout_ms,
            statement_timeout_ms: db.statement_timeout_ms,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            ..target
        };
        config.validate()?;
        Ok(config)
    }
}
