//! Index descriptors.

use crate::models::DatabaseType;
use serde::Serialize;

/// Text search configuration used for full-text indexes.
pub const FULL_TEXT_LANGUAGE: &str = "english";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexKind {
    Plain,
    Composite,
    FullText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexColumn {
    pub name: &'static str,
    pub descending: bool,
}

impl IndexColumn {
    pub fn asc(name: &'static str) -> Self {
        Self {
            name,
            descending: false,
        }
    }

    pub fn desc(name: &'static str) -> Self {
        Self {
            name,
            descending: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDef {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: Vec<IndexColumn>,
    pub kind: IndexKind,
}

impl IndexDef {
    pub fn plain(name: &'static str, table: &'static str, column: IndexColumn) -> Self {
        Self {
            name,
            table,
            columns: vec![column],
            kind: IndexKind::Plain,
        }
    }

    pub fn composite(name: &'static str, table: &'static str, columns: Vec<IndexColumn>) -> Self {
        Self {
            name,
            table,
            columns,
            kind: IndexKind::Composite,
        }
    }

    pub fn full_text(name: &'static str, table: &'static str, column: &'static str) -> Self {
        Self {
            name,
            table,
            columns: vec![IndexColumn::asc(column)],
            kind: IndexKind::FullText,
        }
    }

    /// DDL for this index, or `None` when the backend has no equivalent.
    pub fn create_sql(&self, dialect: DatabaseType) -> Option<String> {
        match (self.kind, dialect) {
            (IndexKind::FullText, DatabaseType::SQLite) => None,
            (IndexKind::FullText, DatabaseType::PostgreSQL) => {
                let column = self.columns.first()?;
                Some(format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} USING gin(to_tsvector('{}', {}))",
                    self.name, self.table, FULL_TEXT_LANGUAGE, column.name
                ))
            }
            (IndexKind::Plain | IndexKind::Composite, _) => {
                let columns = self
                    .columns
                    .iter()
                    .map(|c| {
                        if c.descending {
                            format!("{} DESC", c.name)
                        } else {
                            c.name.to_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                    self.name, self.table, columns
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_descending_index() {
        let index = IndexDef::plain(
            "idx_interactions_created_at",
            "ai_interactions",
            IndexColumn::desc("created_at"),
        );
        assert_eq!(
            index.create_sql(DatabaseType::PostgreSQL).unwrap(),
            "CREATE INDEX IF NOT EXISTS idx_interactions_created_at ON ai_interactions(created_at DESC)"
        );
    }

    #[test]
    fn test_composite_index() {
        let index = IndexDef::composite(
            "idx_interactions_user_date",
            "ai_interactions",
            vec![IndexColumn::asc("user_id"), IndexColumn::desc("created_at")],
        );
        assert_eq!(
            index.create_sql(DatabaseType::SQLite).unwrap(),
            "CREATE INDEX IF NOT EXISTS idx_interactions_user_date ON ai_interactions(user_id, created_at DESC)"
        );
    }

    #[test]
    fn test_full_text_index_is_postgres_only() {
        let index = IndexDef::full_text("idx_prompt_fts", "ai_interactions", "prompt_content");
        assert_eq!(
            index.create_sql(DatabaseType::PostgreSQL).unwrap(),
            "CREATE INDEX IF NOT EXISTS idx_prompt_fts ON ai_interactions USING gin(to_tsvector('english', prompt_content))"
        );
        assert!(index.create_sql(DatabaseType::SQLite).is_none());
    }
}
