//! Mutation requests as they arrive from UI collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::identity::RowSelector;
use super::value::CellValue;
use crate::sql;

/// Closed set of reversible mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    CellEdit,
    RowInsert,
    RowDelete,
    ColumnAdd,
    ColumnDrop,
    TableCreate,
    TableRename,
    TableDrop,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CellEdit => "CellEdit",
            Self::RowInsert => "RowInsert",
            Self::RowDelete => "RowDelete",
            Self::ColumnAdd => "ColumnAdd",
            Self::ColumnDrop => "ColumnDrop",
            Self::TableCreate => "TableCreate",
            Self::TableRename => "TableRename",
            Self::TableDrop => "TableDrop",
        }
    }

    /// Kinds that address a single existing row.
    pub fn is_row_targeted(&self) -> bool {
        matches!(self, Self::CellEdit | Self::RowDelete)
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column to add or create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub declared_type: String,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub default: Option<CellValue>,
    /// Only meaningful for `TableCreate`.
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            not_null: false,
            default: None,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<CellValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Column definition clause without key constraints:
    /// `"name" TYPE NOT NULL DEFAULT 'x'`.
    pub fn definition_sql(&self) -> String {
        let mut out = sql::quote_ident(&self.name);
        if !self.declared_type.trim().is_empty() {
            out.push(' ');
            out.push_str(self.declared_type.trim());
        }
        if self.not_null {
            out.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            out.push_str(" DEFAULT ");
            out.push_str(&sql::literal(default));
        }
        out
    }
}

/// A user-requested edit. Validated before anything touches the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationRequest {
    CellEdit {
        table: String,
        row: RowSelector,
        column: String,
        value: CellValue,
    },
    RowInsert {
        table: String,
        values: Vec<(String, CellValue)>,
    },
    RowDelete {
        table: String,
        row: RowSelector,
    },
    ColumnAdd {
        table: String,
        column: ColumnDef,
    },
    ColumnDrop {
        table: String,
        column: String,
    },
    TableCreate {
        table: String,
        columns: Vec<ColumnDef>,
    },
    TableRename {
        from: String,
        to: String,
    },
    TableDrop {
        table: String,
    },
}

impl MutationRequest {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::CellEdit { .. } => MutationKind::CellEdit,
            Self::RowInsert { .. } => MutationKind::RowInsert,
            Self::RowDelete { .. } => MutationKind::RowDelete,
            Self::ColumnAdd { .. } => MutationKind::ColumnAdd,
            Self::ColumnDrop { .. } => MutationKind::ColumnDrop,
            Self::TableCreate { .. } => MutationKind::TableCreate,
            Self::TableRename { .. } => MutationKind::TableRename,
            Self::TableDrop { .. } => MutationKind::TableDrop,
        }
    }

    /// The table the request operates on (the source name for renames).
    pub fn table(&self) -> &str {
        match self {
            Self::CellEdit { table, .. }
            | Self::RowInsert { table, .. }
            | Self::RowDelete { table, .. }
            | Self::ColumnAdd { table, .. }
            | Self::ColumnDrop { table, .. }
            | Self::TableCreate { table, .. }
            | Self::TableDrop { table } => table,
            Self::TableRename { from, .. } => from,
        }
    }

    /// Short description used for blocked requests, before a command exists.
    pub fn describe(&self) -> String {
        match self {
            Self::CellEdit { table, column, value, .. } => {
                format!("edit {table}.{column} to {value}")
            }
            Self::RowInsert { table, .. } => format!("insert row into {table}"),
            Self::RowDelete { table, .. } => format!("delete row from {table}"),
            Self::ColumnAdd { table, column } => format!("add column {table}.{}", column.name),
            Self::ColumnDrop { table, column } => format!("drop column {table}.{column}"),
            Self::TableCreate { table, .. } => format!("create table {table}"),
            Self::TableRename { from, to } => format!("rename table {from} to {to}"),
            Self::TableDrop { table } => format!("drop table {table}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_column_definition() {
        let def = ColumnDef::new("note", "TEXT").not_null().default_value("n/a");
        assert_eq!(def.definition_sql(), "\"note\" TEXT NOT NULL DEFAULT 'n/a'");
        assert_eq!(ColumnDef::new("any", " ").definition_sql(), "\"any\"");
    }

    #[test]
    fn request_serializes_with_kind_tag() {
        let req = MutationRequest::TableDrop { table: "t".into() };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"kind":"table_drop","table":"t"}"#);
        assert_eq!(req.kind(), MutationKind::TableDrop);
    }
}
