//! Baseline rows inserted after schema creation.

use crate::db::pool::PoolManager;
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use crate::schema::UserRole;
use crate::schema::audit::{
    AI_INTERACTIONS, AUDIT_LOGS, PERFORMANCE_METRICS, RETENTION_POLICIES, SAFETY_FLAGS,
    TRUST_SIGNALS, USERS,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Seven years, the audit retention window.
pub const AUDIT_RETENTION_DAYS: i32 = 2555;
pub const METRICS_RETENTION_DAYS: i32 = 365;

/// How long rows in one table are kept and what happens when they expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub table_name: String,
    pub retention_days: i32,
    pub archival_enabled: bool,
    pub deletion_enabled: bool,
    #[serde(default)]
    pub last_cleanup: Option<DateTime<Utc>>,
}

impl RetentionPolicy {
    pub fn new(
        table_name: impl Into<String>,
        retention_days: i32,
        archival_enabled: bool,
        deletion_enabled: bool,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            retention_days,
            archival_enabled,
            deletion_enabled,
            last_cleanup: None,
        }
    }

    /// Baseline policies for the audit tables.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(AI_INTERACTIONS, AUDIT_RETENTION_DAYS, true, false),
            Self::new(TRUST_SIGNALS, AUDIT_RETENTION_DAYS, true, false),
            Self::new(SAFETY_FLAGS, AUDIT_RETENTION_DAYS, true, false),
            Self::new(PERFORMANCE_METRICS, METRICS_RETENTION_DAYS, true, true),
            Self::new(AUDIT_LOGS, AUDIT_RETENTION_DAYS, true, false),
        ]
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.table_name.trim().is_empty() {
            return Err(DbError::invalid_input("Retention policy table_name must not be empty"));
        }
        if self.retention_days <= 0 {
            return Err(DbError::invalid_input(format!(
                "Retention policy for '{}' must have retention_days > 0, got {}",
                self.table_name, self.retention_days
            )));
        }
        Ok(())
    }

    /// Insert statement that leaves an existing row for the same table untouched.
    fn insert_statement(&self) -> (String, Vec<QueryParam>) {
        let mut columns = vec![
            "table_name",
            "retention_days",
            "archival_enabled",
            "deletion_enabled",
        ];
        let mut params = vec![
            QueryParam::from(self.table_name.as_str()),
            QueryParam::from(self.retention_days),
            QueryParam::from(self.archival_enabled),
            QueryParam::from(self.deletion_enabled),
        ];
        // Omitted when unset so the column takes NULL without a typed bind
        if let Some(at) = self.last_cleanup {
            columns.push("last_cleanup");
            params.push(QueryParam::from(at));
        }

        let placeholders = (1..=params.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT (table_name) DO NOTHING",
            RETENTION_POLICIES,
            columns.join(", "),
            placeholders
        );
        (sql, params)
    }
}

/// An administrator account with an operator-supplied credential hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAccount {
    pub username: String,
    pub email: String,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(default = "admin_role")]
    pub role: UserRole,
}

fn admin_role() -> UserRole {
    UserRole::Admin
}

impl std::fmt::Debug for AdminAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"****")
            .field("role", &self.role)
            .finish()
    }
}

impl AdminAccount {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            role: UserRole::Admin,
        }
    }

    /// Rejects empty fields and credentials that are not crypt-style hashes
    /// (`$2b$...`, `$argon2id$...`), so a plaintext password is never stored.
    pub fn validate(&self) -> DbResult<()> {
        if self.username.trim().is_empty() {
            return Err(DbError::invalid_input("Admin username must not be empty"));
        }
        if !self.email.contains('@') {
            return Err(DbError::invalid_input(format!(
                "Admin email '{}' is not a valid address",
                self.email
            )));
        }
        if !self.password_hash.starts_with('$') || self.password_hash.len() < 20 {
            return Err(DbError::invalid_input(
                "Admin password hash must be a crypt-style hash such as bcrypt or argon2, not a plaintext password",
            ));
        }
        Ok(())
    }
}

/// Inserts baseline rows. Existing rows are never updated.
#[derive(Debug, Clone)]
pub struct RetentionPolicySeeder {
    pool: PoolManager,
}

impl RetentionPolicySeeder {
    pub fn new(pool: PoolManager) -> Self {
        Self { pool }
    }

    /// Insert `policies` that are not present yet, in one transaction.
    ///
    /// Every policy is validated before anything is written. Returns the
    /// number of rows actually inserted.
    pub async fn seed_defaults(&self, policies: &[RetentionPolicy]) -> DbResult<u64> {
        for policy in policies {
            policy.validate()?;
        }

        let statements: Vec<_> = policies.iter().map(RetentionPolicy::insert_statement).collect();

        let inserted = self
            .pool
            .transaction(|conn| {
                Box::pin(async move {
                    let mut inserted = 0;
                    for (sql, params) in &statements {
                        debug!(sql = %sql, "Seeding retention policy");
                        inserted += conn.execute(sql, params).await?;
                    }
                    Ok::<_, DbError>(inserted)
                })
            })
            .await?;

        info!(
            inserted,
            skipped = policies.len() as u64 - inserted,
            "Retention policies seeded"
        );
        Ok(inserted)
    }

    /// Insert `account` unless a user with the same username exists.
    ///
    /// Returns whether a row was inserted.
    pub async fn seed_admin(&self, account: &AdminAccount) -> DbResult<bool> {
        account.validate()?;

        let sql = format!(
            "INSERT INTO {} (username, email, password_hash, role) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (username) DO NOTHING",
            USERS
        );
        let params = [
            QueryParam::from(account.username.as_str()),
            QueryParam::from(account.email.as_str()),
            QueryParam::from(account.password_hash.as_str()),
            QueryParam::from(account.role.as_str()),
        ];
        let inserted = self.pool.execute(&sql, &params).await? > 0;

        if inserted {
            info!(username = %account.username, role = %account.role, "Admin account created");
        } else {
            info!(username = %account.username, "Admin account already exists, left unchanged");
        }
        Ok(inserted)
    }
}
