//! The AI interaction audit data model.

use super::index::{IndexColumn, IndexDef};
use super::table::{Check, ColumnDef, ColumnType, DefaultValue, TableDef};
use super::SchemaDescriptor;
use serde::{Deserialize, Serialize};

pub const USERS: &str = "users";
pub const AI_INTERACTIONS: &str = "ai_interactions";
pub const TRUST_SIGNALS: &str = "trust_signals";
pub const SAFETY_FLAGS: &str = "safety_flags";
pub const PERFORMANCE_METRICS: &str = "performance_metrics";
pub const AUDIT_LOGS: &str = "audit_logs";
pub const RETENTION_POLICIES: &str = "retention_policies";

pub const INTERACTION_TYPES: &[&str] = &["text", "image", "multimodal"];
pub const SIGNAL_SOURCES: &[&str] = &["user_feedback", "ai_confidence", "safety_check", "fact_check"];
pub const FLAG_TYPES: &[&str] = &[
    "harmful_content",
    "bias_detected",
    "factual_error",
    "inappropriate_response",
];
pub const SEVERITY_LEVELS: &[&str] = &["low", "medium", "high", "critical"];

/// Access role stored in `users.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Developer,
    Analyst,
    ComplianceOfficer,
    Admin,
}

impl UserRole {
    pub const NAMES: &'static [&'static str] =
        &["developer", "analyst", "compliance_officer", "admin"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::Analyst => "analyst",
            Self::ComplianceOfficer => "compliance_officer",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "developer" => Ok(Self::Developer),
            "analyst" => Ok(Self::Analyst),
            "compliance_officer" => Ok(Self::ComplianceOfficer),
            "admin" => Ok(Self::Admin),
            other => Err(format!(
                "Unknown role '{}'. Expected one of: {}",
                other,
                Self::NAMES.join(", ")
            )),
        }
    }
}

fn id() -> ColumnDef {
    ColumnDef::new("id", ColumnType::Uuid)
        .primary_key()
        .default(DefaultValue::RandomUuid)
}

fn timestamp(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Timestamptz)
}

fn created_at() -> ColumnDef {
    timestamp("created_at").default(DefaultValue::Now)
}

fn updated_at() -> ColumnDef {
    timestamp("updated_at").default(DefaultValue::Now)
}

fn varchar(name: &'static str, len: u16) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Varchar(len))
}

fn jsonb(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Jsonb)
}

fn unit_score(name: &'static str) -> ColumnDef {
    ColumnDef::new(
        name,
        ColumnType::Decimal {
            precision: 3,
            scale: 2,
        },
    )
    .check(Check::Range { min: 0, max: 1 })
}

fn interaction_ref() -> ColumnDef {
    ColumnDef::new("interaction_id", ColumnType::Uuid).references_cascade(AI_INTERACTIONS, "id")
}

fn user_ref(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Uuid).references(USERS, "id")
}

fn tables() -> Vec<TableDef> {
    vec![
        TableDef::new(
            USERS,
            vec![
                id(),
                varchar("username", 100).unique().not_null(),
                varchar("email", 255).unique().not_null(),
                varchar("password_hash", 255).not_null(),
                varchar("role", 50)
                    .not_null()
                    .check(Check::OneOf(UserRole::NAMES)),
                ColumnDef::new("is_active", ColumnType::Boolean).default(DefaultValue::Bool(true)),
                timestamp("last_login"),
                created_at(),
                updated_at(),
            ],
        ),
        TableDef::new(
            AI_INTERACTIONS,
            vec![
                id(),
                user_ref("user_id"),
                varchar("session_id", 255).not_null(),
                varchar("interaction_type", 50)
                    .not_null()
                    .check(Check::OneOf(INTERACTION_TYPES)),
                ColumnDef::new("prompt_content", ColumnType::Text).not_null(),
                jsonb("prompt_metadata"),
                ColumnDef::new("response_content", ColumnType::Text).not_null(),
                jsonb("response_metadata"),
                varchar("ai_model_version", 100),
                varchar("ai_model_provider", 100),
                ColumnDef::new("processing_time_ms", ColumnType::Integer),
                ColumnDef::new("token_count", ColumnType::Integer),
                ColumnDef::new(
                    "cost_usd",
                    ColumnType::Decimal {
                        precision: 10,
                        scale: 6,
                    },
                ),
                ColumnDef::new("ip_address", ColumnType::Inet),
                ColumnDef::new("user_agent", ColumnType::Text),
                created_at(),
                updated_at(),
            ],
        ),
        TableDef::new(
            TRUST_SIGNALS,
            vec![
                id(),
                interaction_ref(),
                varchar("signal_type", 100).not_null(),
                unit_score("signal_value"),
                jsonb("signal_metadata"),
                varchar("source", 100)
                    .not_null()
                    .check(Check::OneOf(SIGNAL_SOURCES)),
                unit_score("confidence_score"),
                created_at(),
            ],
        ),
        TableDef::new(
            SAFETY_FLAGS,
            vec![
                id(),
                interaction_ref(),
                varchar("flag_type", 100)
                    .not_null()
                    .check(Check::OneOf(FLAG_TYPES)),
                varchar("severity_level", 20)
                    .not_null()
                    .check(Check::OneOf(SEVERITY_LEVELS)),
                unit_score("confidence_score"),
                varchar("detection_method", 100),
                jsonb("flag_metadata"),
                ColumnDef::new("is_resolved", ColumnType::Boolean).default(DefaultValue::Bool(false)),
                user_ref("resolved_by"),
                timestamp("resolved_at"),
                created_at(),
            ],
        ),
        TableDef::new(
            PERFORMANCE_METRICS,
            vec![
                id(),
                interaction_ref(),
                varchar("metric_name", 100).not_null(),
                ColumnDef::new(
                    "metric_value",
                    ColumnType::Decimal {
                        precision: 10,
                        scale: 4,
                    },
                )
                .not_null(),
                varchar("metric_unit", 50),
                jsonb("metric_metadata"),
                created_at(),
            ],
        ),
        TableDef::new(
            AUDIT_LOGS,
            vec![
                id(),
                user_ref("user_id"),
                varchar("action", 100).not_null(),
                varchar("resource_type", 100).not_null(),
                ColumnDef::new("resource_id", ColumnType::Uuid),
                jsonb("old_values"),
                jsonb("new_values"),
                ColumnDef::new("ip_address", ColumnType::Inet),
                ColumnDef::new("user_agent", ColumnType::Text),
                created_at(),
            ],
        ),
        TableDef::new(
            RETENTION_POLICIES,
            vec![
                id(),
                varchar("table_name", 100).unique().not_null(),
                ColumnDef::new("retention_days", ColumnType::Integer).not_null(),
                ColumnDef::new("archival_enabled", ColumnType::Boolean)
                    .default(DefaultValue::Bool(true)),
                ColumnDef::new("deletion_enabled", ColumnType::Boolean)
                    .default(DefaultValue::Bool(false)),
                timestamp("last_cleanup"),
                created_at(),
                updated_at(),
            ],
        ),
    ]
}

fn indexes() -> Vec<IndexDef> {
    use IndexColumn as C;

    vec![
        IndexDef::plain("idx_interactions_created_at", AI_INTERACTIONS, C::desc("created_at")),
        IndexDef::plain("idx_interactions_user_id", AI_INTERACTIONS, C::asc("user_id")),
        IndexDef::plain("idx_interactions_session_id", AI_INTERACTIONS, C::asc("session_id")),
        IndexDef::plain("idx_interactions_type", AI_INTERACTIONS, C::asc("interaction_type")),
        IndexDef::composite(
            "idx_interactions_model",
            AI_INTERACTIONS,
            vec![C::asc("ai_model_version"), C::asc("ai_model_provider")],
        ),
        IndexDef::plain("idx_trust_signals_interaction", TRUST_SIGNALS, C::asc("interaction_id")),
        IndexDef::plain("idx_trust_signals_type", TRUST_SIGNALS, C::asc("signal_type")),
        IndexDef::plain("idx_safety_flags_interaction", SAFETY_FLAGS, C::asc("interaction_id")),
        IndexDef::composite(
            "idx_safety_flags_severity",
            SAFETY_FLAGS,
            vec![C::asc("severity_level"), C::asc("is_resolved")],
        ),
        IndexDef::plain(
            "idx_performance_metrics_interaction",
            PERFORMANCE_METRICS,
            C::asc("interaction_id"),
        ),
        IndexDef::composite(
            "idx_audit_logs_user",
            AUDIT_LOGS,
            vec![C::asc("user_id"), C::desc("created_at")],
        ),
        IndexDef::composite(
            "idx_audit_logs_action",
            AUDIT_LOGS,
            vec![C::asc("action"), C::desc("created_at")],
        ),
        IndexDef::composite(
            "idx_interactions_user_date",
            AI_INTERACTIONS,
            vec![C::asc("user_id"), C::desc("created_at")],
        ),
        IndexDef::composite(
            "idx_interactions_type_date",
            AI_INTERACTIONS,
            vec![C::asc("interaction_type"), C::desc("created_at")],
        ),
        IndexDef::full_text("idx_interactions_prompt_fts", AI_INTERACTIONS, "prompt_content"),
        IndexDef::full_text("idx_interactions_response_fts", AI_INTERACTIONS, "response_content"),
    ]
}

/// The full audit schema: seven tables and their sixteen indexes.
pub fn audit_schema() -> SchemaDescriptor {
    SchemaDescriptor::new(tables(), indexes())
}
