//! Table and column descriptors.
//!
//! Descriptors are plain data; DDL text is generated from them per backend.

use crate::models::DatabaseType;
use serde::Serialize;

/// Column storage type, expressed in PostgreSQL terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Uuid,
    Varchar(u16),
    Text,
    Boolean,
    Integer,
    Decimal { precision: u8, scale: u8 },
    Jsonb,
    Inet,
    Timestamptz,
}

impl ColumnType {
    pub fn sql(&self, dialect: DatabaseType) -> String {
        match (self, dialect) {
            (Self::Varchar(len), _) => format!("VARCHAR({})", len),
            (Self::Text, _) => "TEXT".to_string(),
            (Self::Boolean, _) => "BOOLEAN".to_string(),
            (Self::Integer, _) => "INTEGER".to_string(),
            (Self::Decimal { precision, scale }, _) => format!("DECIMAL({},{})", precision, scale),
            (Self::Uuid, DatabaseType::PostgreSQL) => "UUID".to_string(),
            (Self::Jsonb, DatabaseType::PostgreSQL) => "JSONB".to_string(),
            (Self::Inet, DatabaseType::PostgreSQL) => "INET".to_string(),
            (Self::Timestamptz, DatabaseType::PostgreSQL) => "TIMESTAMP WITH TIME ZONE".to_string(),
            (Self::Uuid, DatabaseType::SQLite) => "TEXT".to_string(),
            (Self::Jsonb, DatabaseType::SQLite) => "JSON".to_string(),
            (Self::Inet, DatabaseType::SQLite) => "TEXT".to_string(),
            (Self::Timestamptz, DatabaseType::SQLite) => "TIMESTAMP".to_string(),
        }
    }
}

/// Server-side default for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DefaultValue {
    RandomUuid,
    Now,
    Bool(bool),
}

/// Random v4 UUID in hyphenated text form, for backends without a generator.
const SQLITE_RANDOM_UUID: &str = "(lower(hex(randomblob(4))) || '-' || lower(hex(randomblob(2))) \
    || '-4' || substr(lower(hex(randomblob(2))), 2) || '-' \
    || substr('89ab', abs(random()) % 4 + 1, 1) || substr(lower(hex(randomblob(2))), 2) \
    || '-' || lower(hex(randomblob(6))))";

impl DefaultValue {
    pub fn sql(&self, dialect: DatabaseType) -> &'static str {
        match (self, dialect) {
            (Self::RandomUuid, DatabaseType::PostgreSQL) => "gen_random_uuid()",
            (Self::RandomUuid, DatabaseType::SQLite) => SQLITE_RANDOM_UUID,
            (Self::Now, DatabaseType::PostgreSQL) => "NOW()",
            (Self::Now, DatabaseType::SQLite) => "CURRENT_TIMESTAMP",
            (Self::Bool(true), DatabaseType::PostgreSQL) => "true",
            (Self::Bool(false), DatabaseType::PostgreSQL) => "false",
            (Self::Bool(true), DatabaseType::SQLite) => "1",
            (Self::Bool(false), DatabaseType::SQLite) => "0",
        }
    }
}

/// Value constraint on a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Check {
    OneOf(&'static [&'static str]),
    /// Inclusive bounds
    Range { min: i64, max: i64 },
}

impl Check {
    fn sql(&self, column: &str) -> String {
        match self {
            Self::OneOf(values) => {
                let list = values
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("CHECK ({} IN ({}))", column, list)
            }
            Self::Range { min, max } => {
                format!("CHECK ({col} >= {min} AND {col} <= {max})", col = column)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OnDelete {
    NoAction,
    Cascade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<DefaultValue>,
    pub check: Option<Check>,
    pub references: Option<ForeignKey>,
}

impl ColumnDef {
    /// A nullable column with no constraints.
    pub fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
            check: None,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.check = Some(check);
        self
    }

    pub fn references(mut self, table: &'static str, column: &'static str) -> Self {
        self.references = Some(ForeignKey {
            table,
            column,
            on_delete: OnDelete::NoAction,
        });
        self
    }

    pub fn references_cascade(mut self, table: &'static str, column: &'static str) -> Self {
        self.references = Some(ForeignKey {
            table,
            column,
            on_delete: OnDelete::Cascade,
        });
        self
    }

    /// Column definition as it appears inside CREATE TABLE.
    pub fn sql(&self, dialect: DatabaseType) -> String {
        let mut parts = vec![self.name.to_string(), self.ty.sql(dialect)];
        if self.primary_key {
            parts.push("PRIMARY KEY".to_string());
        }
        if self.unique {
            parts.push("UNIQUE".to_string());
        }
        if !self.nullable && !self.primary_key {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = &self.default {
            parts.push(format!("DEFAULT {}", default.sql(dialect)));
        }
        if let Some(check) = &self.check {
            parts.push(check.sql(self.name));
        }
        if let Some(fk) = &self.references {
            parts.push(format!("REFERENCES {}({})", fk.table, fk.column));
            if fk.on_delete == OnDelete::Cascade {
                parts.push("ON DELETE CASCADE".to_string());
            }
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(name: &'static str, columns: Vec<ColumnDef>) -> Self {
        Self { name, columns }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Tables this one references, in column order, without duplicates or
    /// self references.
    pub fn dependencies(&self) -> Vec<&'static str> {
        let mut deps: Vec<&'static str> = Vec::new();
        for fk in self.columns.iter().filter_map(|c| c.references.as_ref()) {
            if fk.table != self.name && !deps.contains(&fk.table) {
                deps.push(fk.table);
            }
        }
        deps
    }

    pub fn create_sql(&self, dialect: DatabaseType) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("  {}", c.sql(dialect)))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n)", self.name, columns)
    }

    /// `CASCADE` is a fallback on PostgreSQL; SQLite relies on drop order alone.
    pub fn drop_sql(&self, dialect: DatabaseType) -> String {
        match dialect {
            DatabaseType::PostgreSQL => format!("DROP TABLE IF EXISTS {} CASCADE", self.name),
            DatabaseType::SQLite => format!("DROP TABLE IF EXISTS {}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_sql_postgres() {
        let col = ColumnDef::new("role", ColumnType::Varchar(50))
            .not_null()
            .check(Check::OneOf(&["developer", "admin"]));
        assert_eq!(
            col.sql(DatabaseType::PostgreSQL),
            "role VARCHAR(50) NOT NULL CHECK (role IN ('developer', 'admin'))"
        );
    }

    #[test]
    fn test_primary_key_implies_not_null_without_repeating_it() {
        let col = ColumnDef::new("id", ColumnType::Uuid)
            .primary_key()
            .default(DefaultValue::RandomUuid);
        assert!(!col.nullable);
        assert_eq!(
            col.sql(DatabaseType::PostgreSQL),
            "id UUID PRIMARY KEY DEFAULT gen_random_uuid()"
        );
        assert!(col.sql(DatabaseType::SQLite).starts_with("id TEXT PRIMARY KEY DEFAULT (lower(hex("));
    }

    #[test]
    fn test_range_check_and_cascade_reference() {
        let col = ColumnDef::new("score", ColumnType::Decimal { precision: 3, scale: 2 })
            .check(Check::Range { min: 0, max: 1 });
        assert_eq!(
            col.sql(DatabaseType::PostgreSQL),
            "score DECIMAL(3,2) CHECK (score >= 0 AND score <= 1)"
        );

        let fk = ColumnDef::new("interaction_id", ColumnType::Uuid)
            .references_cascade("ai_interactions", "id");
        assert_eq!(
            fk.sql(DatabaseType::PostgreSQL),
            "interaction_id UUID REFERENCES ai_interactions(id) ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_dialect_specific_types_and_defaults() {
        let col = ColumnDef::new("created_at", ColumnType::Timestamptz).default(DefaultValue::Now);
        assert_eq!(
            col.sql(DatabaseType::PostgreSQL),
            "created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()"
        );
        assert_eq!(
            col.sql(DatabaseType::SQLite),
            "created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP"
        );

        let flag = ColumnDef::new("is_active", ColumnType::Boolean).default(DefaultValue::Bool(true));
        assert_eq!(flag.sql(DatabaseType::SQLite), "is_active BOOLEAN DEFAULT 1");
        assert_eq!(flag.sql(DatabaseType::PostgreSQL), "is_active BOOLEAN DEFAULT true");
    }

    #[test]
    fn test_dependencies_skip_self_and_duplicates() {
        let table = TableDef::new(
            "safety_flags",
            vec![
                ColumnDef::new("interaction_id", ColumnType::Uuid)
                    .references_cascade("ai_interactions", "id"),
                ColumnDef::new("resolved_by", ColumnType::Uuid).references("users", "id"),
                ColumnDef::new("reviewer", ColumnType::Uuid).references("users", "id"),
                ColumnDef::new("parent", ColumnType::Uuid).references("safety_flags", "id"),
            ],
        );
        assert_eq!(table.dependencies(), vec!["ai_interactions", "users"]);
    }

    #[test]
    fn test_drop_sql_per_dialect() {
        let table = TableDef::new("users", vec![]);
        assert_eq!(
            table.drop_sql(DatabaseType::PostgreSQL),
            "DROP TABLE IF EXISTS users CASCADE"
        );
        assert_eq!(table.drop_sql(DatabaseType::SQLite), "DROP TABLE IF EXISTS users");
    }

    #[test]
    fn test_check_escapes_quotes() {
        let check = Check::OneOf(&["o'brien"]);
        assert_eq!(check.sql("name"), "CHECK (name IN ('o''brien'))");
    }
}
