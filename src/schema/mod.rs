//! Schema descriptors.
//!
//! The persisted data model is described as data: tables with typed columns
//! and foreign keys, plus the indexes laid over them. Creation order is
//! derived from the foreign keys rather than written down by hand, and drop
//! order is its exact reverse.

pub mod audit;
pub mod index;
pub mod table;

pub use audit::{UserRole, audit_schema};
pub use index::{IndexColumn, IndexDef, IndexKind};
pub use table::{Check, ColumnDef, ColumnType, DefaultValue, ForeignKey, OnDelete, TableDef};

use crate::error::{DbError, DbResult};
use std::collections::HashSet;

/// A complete schema: tables in declaration order and their indexes.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    tables: Vec<TableDef>,
    indexes: Vec<IndexDef>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

impl SchemaDescriptor {
    pub fn new(tables: Vec<TableDef>, indexes: Vec<IndexDef>) -> Self {
        Self { tables, indexes }
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables ordered so every table comes after the tables it references.
    ///
    /// Ties are broken by declaration order. Fails on an unknown referenced
    /// table or a dependency cycle.
    pub fn creation_order(&self) -> DbResult<Vec<&TableDef>> {
        let mut marks = vec![Mark::Unvisited; self.tables.len()];
        let mut order = Vec::with_capacity(self.tables.len());
        let mut path = Vec::new();

        for idx in 0..self.tables.len() {
            self.visit(idx, &mut marks, &mut path, &mut order)?;
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        idx: usize,
        marks: &mut [Mark],
        path: &mut Vec<&'static str>,
        order: &mut Vec<&'a TableDef>,
    ) -> DbResult<()> {
        let table = &self.tables[idx];
        match marks[idx] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                path.push(table.name);
                return Err(DbError::schema(
                    format!("Dependency cycle: {}", path.join(" -> ")),
                    table.name,
                ));
            }
            Mark::Unvisited => {}
        }

        marks[idx] = Mark::Visiting;
        path.push(table.name);

        for dep in table.dependencies() {
            let dep_idx = self
                .tables
                .iter()
                .position(|t| t.name == dep)
                .ok_or_else(|| {
                    DbError::schema(
                        format!("Table '{}' references unknown table '{}'", table.name, dep),
                        table.name,
                    )
                })?;
            self.visit(dep_idx, marks, path, order)?;
        }

        path.pop();
        marks[idx] = Mark::Done;
        order.push(table);
        Ok(())
    }

    /// Exact reverse of [`creation_order`](Self::creation_order): children first.
    pub fn drop_order(&self) -> DbResult<Vec<&TableDef>> {
        let mut order = self.creation_order()?;
        order.reverse();
        Ok(order)
    }

    /// Check the schema for structural errors before any DDL runs.
    pub fn validate(&self) -> DbResult<()> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name) {
                return Err(DbError::schema("Duplicate table", table.name));
            }

            let mut columns = HashSet::new();
            for column in &table.columns {
                if !columns.insert(column.name) {
                    return Err(DbError::schema(
                        format!("Duplicate column '{}'", column.name),
                        table.name,
                    ));
                }
            }

            match table.columns.iter().filter(|c| c.primary_key).count() {
                1 => {}
                n => {
                    return Err(DbError::schema(
                        format!("Expected one primary key column, found {}", n),
                        table.name,
                    ));
                }
            }

            for fk in table.columns.iter().filter_map(|c| c.references.as_ref()) {
                let target = self.table(fk.table).ok_or_else(|| {
                    DbError::schema(
                        format!("Table '{}' references unknown table '{}'", table.name, fk.table),
                        table.name,
                    )
                })?;
                if target.column(fk.column).is_none() {
                    return Err(DbError::schema(
                        format!(
                            "Table '{}' references unknown column '{}.{}'",
                            table.name, fk.table, fk.column
                        ),
                        table.name,
                    ));
                }
            }
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            if !index_names.insert(index.name) {
                return Err(DbError::schema("Duplicate index", index.name));
            }
            let table = self.table(index.table).ok_or_else(|| {
                DbError::schema(
                    format!("Index targets unknown table '{}'", index.table),
                    index.name,
                )
            })?;
            if index.columns.is_empty() {
                return Err(DbError::schema("Index has no columns", index.name));
            }
            if let Some(missing) = index.columns.iter().find(|c| table.column(c.name).is_none()) {
                return Err(DbError::schema(
                    format!("Index targets unknown column '{}.{}'", index.table, missing.name),
                    index.name,
                ));
            }
        }

        self.creation_order().map(|_| ())
    }
}
