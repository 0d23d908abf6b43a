//! Immutable schema snapshot types.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::value::Affinity;

/// One column as reported by `pragma_table_xinfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub cid: i64,
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    /// Default expression as written in the DDL, e.g. `'n/a'` or `CURRENT_TIMESTAMP`.
    pub default_sql: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it.
    pub pk_position: u32,
    /// 0 normal, 1 hidden (virtual tables), 2 generated virtual, 3 generated stored.
    pub hidden: i64,
}

impl ColumnSchema {
    pub fn is_primary_key(&self) -> bool {
        self.pk_position > 0
    }

    pub fn is_generated(&self) -> bool {
        matches!(self.hidden, 2 | 3)
    }

    /// True when the default is evaluated at insert time
    /// (`CURRENT_TIMESTAMP`, `(random())`, ...).
    pub fn has_volatile_default(&self) -> bool {
        match self.default_sql.as_deref().map(str::trim) {
            Some(sql) => {
                sql.starts_with('(') || sql.to_ascii_uppercase().starts_with("CURRENT_")
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint id within the owning table.
    pub id: i64,
    pub from_columns: Vec<String>,
    pub to_table: String,
    /// Referenced columns; resolved to the parent's primary key when the
    /// constraint omits them.
    pub to_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
}

impl ForeignKey {
    fn is_cascading(action: &str) -> bool {
        matches!(
            action.to_ascii_uppercase().as_str(),
            "CASCADE" | "SET NULL" | "SET DEFAULT"
        )
    }

    /// Deleting a parent row touches child rows.
    pub fn cascades_on_delete(&self) -> bool {
        Self::is_cascading(&self.on_delete)
    }

    /// Updating a parent key touches child rows.
    pub fn cascades_on_update(&self) -> bool {
        Self::is_cascading(&self.on_update)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub unique: bool,
    /// `c` (CREATE INDEX), `u` (UNIQUE constraint) or `pk`.
    pub origin: String,
    pub partial: bool,
    pub columns: Vec<String>,
    /// DDL for explicitly created indexes; `None` for automatic ones.
    pub sql: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSchema {
    pub name: String,
    pub sql: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    Virtual,
    /// Backing storage of a virtual table.
    Shadow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub kind: TableKind,
    pub without_rowid: bool,
    pub strict: bool,
    pub autoincrement: bool,
    pub columns: Vec<ColumnSchema>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexSchema>,
    pub triggers: Vec<TriggerSchema>,
    /// `CREATE TABLE` statement from `sqlite_master`.
    pub sql: Option<String>,
}

impl TableSchema {
    /// Column lookup; SQLite identifiers are case-insensitive.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Primary key columns in key order.
    pub fn primary_key(&self) -> Vec<&ColumnSchema> {
        let mut pk: Vec<&ColumnSchema> = self.columns.iter().filter(|c| c.is_primary_key()).collect();
        pk.sort_by_key(|c| c.pk_position);
        pk
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(ColumnSchema::is_primary_key)
    }

    pub fn has_rowid(&self) -> bool {
        self.kind == TableKind::Table && !self.without_rowid
    }

    /// The `INTEGER PRIMARY KEY` column that aliases the rowid, if any.
    pub fn rowid_alias(&self) -> Option<&ColumnSchema> {
        if !self.has_rowid() {
            return None;
        }
        match self.primary_key().as_slice() {
            [only] if only.declared_type.trim().eq_ignore_ascii_case("INTEGER") => Some(only),
            _ => None,
        }
    }

    /// Columns a plain `INSERT` can write (generated columns excluded).
    pub fn writable_columns(&self) -> Vec<&ColumnSchema> {
        self.columns
            .iter()
            .filter(|c| !c.is_generated() && c.hidden != 1)
            .collect()
    }

    /// True when any index covers `column`.
    pub fn is_indexed(&self, column: &str) -> bool {
        self.indexes
            .iter()
            .any(|idx| idx.columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }

    pub fn affinity_of(&self, column: &ColumnSchema) -> Affinity {
        Affinity::for_column(&column.declared_type, self.strict)
    }
}

/// Everything `table_definition` needs to recreate a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub table: String,
    pub create_sql: String,
    pub index_sql: Vec<String>,
    pub trigger_sql: Vec<String>,
    /// `sqlite_sequence` value for AUTOINCREMENT tables.
    pub sequence: Option<i64>,
}

/// Point-in-time view of the database schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Sorted by name.
    pub tables: Vec<TableSchema>,
    pub sqlite_version: String,
}

impl SchemaSnapshot {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Foreign keys in other tables (or the same table) that point at `table`.
    pub fn referencing(&self, table: &str) -> Vec<(&TableSchema, &ForeignKey)> {
        self.tables
            .iter()
            .flat_map(|t| t.foreign_keys.iter().map(move |fk| (t, fk)))
            .filter(|(_, fk)| fk.to_table.eq_ignore_ascii_case(table))
            .collect()
    }

    /// Plain-text ER description: each table, its columns and outgoing keys.
    pub fn render_er_text(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            let _ = writeln!(out, "{}", table.name);
            for col in &table.columns {
                let _ = writeln!(out, "  • {} ({})", col.name, col.declared_type);
            }
            for fk in &table.foreign_keys {
                for (from, to) in fk.from_columns.iter().zip(&fk.to_columns) {
                    let _ = writeln!(out, "  ↳ FK: {from} → {}.{to}", fk.to_table);
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(cid: i64, name: &str, ty: &str, pk: u32) -> ColumnSchema {
        ColumnSchema {
            cid,
            name: name.into(),
            declared_type: ty.into(),
            nullable: pk == 0,
            default_sql: None,
            pk_position: pk,
            hidden: 0,
        }
    }

    fn table(name: &str, columns: Vec<ColumnSchema>) -> TableSchema {
        TableSchema {
            name: name.into(),
            kind: TableKind::Table,
            without_rowid: false,
            strict: false,
            autoincrement: false,
            columns,
            foreign_keys: vec![],
            indexes: vec![],
            triggers: vec![],
            sql: None,
        }
    }

    #[test]
    fn integer_primary_key_aliases_rowid() {
        let t = table("users", vec![col(0, "id", "INTEGER", 1), col(1, "name", "TEXT", 0)]);
        assert_eq!(t.rowid_alias().map(|c| c.name.as_str()), Some("id"));

        let mut wr = t.clone();
        wr.without_rowid = true;
        assert!(wr.rowid_alias().is_none());

        let bigint = table("b", vec![col(0, "id", "BIGINT", 1)]);
        assert!(bigint.rowid_alias().is_none());
    }

    #[test]
    fn primary_key_is_returned_in_key_order() {
        let t = table(
            "pairs",
            vec![col(0, "b", "TEXT", 2), col(1, "a", "TEXT", 1), col(2, "v", "", 0)],
        );
        let names: Vec<_> = t.primary_key().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn volatile_defaults_are_detected() {
        let mut c = col(0, "at", "TEXT", 0);
        c.default_sql = Some("CURRENT_TIMESTAMP".into());
        assert!(c.has_volatile_default());
        c.default_sql = Some("(random())".into());
        assert!(c.has_volatile_default());
        c.default_sql = Some("'x'".into());
        assert!(!c.has_volatile_default());
    }

    #[test]
    fn renders_er_text() {
        let mut orders = table("orders", vec![col(0, "id", "INTEGER", 1), col(1, "user_id", "INTEGER", 0)]);
        orders.foreign_keys.push(ForeignKey {
            id: 0,
            from_columns: vec!["user_id".into()],
            to_table: "users".into(),
            to_columns: vec!["id".into()],
            on_update: "NO ACTION".into(),
            on_delete: "CASCADE".into(),
        });
        let snap = SchemaSnapshot {
            tables: vec![orders],
            sqlite_version: "3.46.0".into(),
        };
        let text = snap.render_er_text();
        assert!(text.contains("orders\n  • id (INTEGER)\n  • user_id (INTEGER)\n"));
        assert!(text.contains("  ↳ FK: user_id → users.id"));
        assert_eq!(snap.referencing("USERS").len(), 1);
        assert!(snap.referencing("users")[0].1.cascades_on_delete());
    }
}
