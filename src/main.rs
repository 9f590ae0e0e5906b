//! audit-store - Main entry point.
//!
//! Runs one schema lifecycle command against the configured store and exits
//! with status 0 on success, 1 on failure.

use audit_store::commands::{self, MigrationOptions};
use audit_store::config::{Command, Config};
use audit_store::db::PoolManager;
use audit_store::error::{DbError, DbResult};
use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the command report.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn print_report<T: Serialize>(report: &T) -> DbResult<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| DbError::internal(format!("Failed to serialize report: {}", e)))?;
    println!("{}", json);
    Ok(())
}

async fn run(command: &Command, pool: &PoolManager) -> DbResult<()> {
    match command {
        Command::Migrate(args) => {
            let options = MigrationOptions {
                admin: args.admin_account(),
                ..MigrationOptions::default()
            };
            let report = commands::run_migrate(pool, &options).await?;
            print_report(&report)
        }
        Command::Rollback => {
            let report = commands::run_rollback(pool).await?;
            print_report(&report)
        }
        Command::Health => {
            let report = commands::run_health(pool).await;
            print_report(&report)?;
            if report.healthy {
                Ok(())
            } else {
                Err(DbError::health_check_failed(report.target))
            }
        }
    }
}

/// Run `command` until it finishes, the pool raises a fatal error, or the
/// process is interrupted.
async fn supervise(command: &Command, pool: &PoolManager) -> DbResult<()> {
    let mut fatal = pool.fatal_signal();

    tokio::select! {
        result = run(command, pool) => result,
        signal = fatal.wait_for(Option::is_some) => {
            let message = match signal {
                Ok(signal) => match &*signal {
                    Some(s) => s.message.clone(),
                    None => String::new(),
                },
                Err(_) => "fatal signal channel closed".to_string(),
            };
            Err(DbError::fatal(message))
        }
        _ = tokio::signal::ctrl_c() => {
            Err(DbError::internal("Interrupted"))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Environment from .env applies before argument parsing
    dotenvy::dotenv().ok();

    let config = Config::parse();
    init_tracing(&config);

    info!(
        command = config.command.name(),
        "Starting audit-store v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool_config = match config.pool_config() {
        Ok(pool_config) => pool_config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let pool = match PoolManager::initialize(pool_config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to create connection pool");
            return ExitCode::FAILURE;
        }
    };

    let result = supervise(&config.command, pool).await;
    pool.shutdown().await;

    match result {
        Ok(()) => {
            info!(command = config.command.name(), "Command completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(
                command = config.command.name(),
                step = e.failed_step().unwrap_or("-"),
                suggestion = e.suggestion().unwrap_or(""),
                error = %e,
                "Command failed"
            );
            ExitCode::FAILURE
        }
    }
}
