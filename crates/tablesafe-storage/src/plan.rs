//! Forward/inverse action builders, one per mutation kind.
//!
//! Pure functions: everything they need (old values, captured rows,
//! table definitions) is read by the validator beforehand.

use tablesafe_core::sql::{ident_list, placeholders, quote_ident, where_is};
use tablesafe_core::types::command::{Action, MutationPlan, Precondition, Statement};
use tablesafe_core::types::identity::RowIdentity;
use tablesafe_core::types::mutation::{ColumnDef, MutationKind};
use tablesafe_core::types::schema::TableDefinition;
use tablesafe_core::types::value::CellValue;

/// Definition plus every row of a table, captured before a destructive change.
#[derive(Debug, Clone, PartialEq)]
pub struct TableImage {
    pub definition: TableDefinition,
    pub autoincrement: bool,
    /// Capture columns (rowid first when it is not aliased).
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub fingerprint: u64,
}

/// How the inverse of a ColumnAdd removes the column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRemovalPlan {
    Native,
    Rebuild {
        definition: TableDefinition,
        /// Capture columns copied back after the rebuild.
        columns: Vec<String>,
        /// Declared column names before the add, in order.
        table_columns: Vec<String>,
    },
}

fn row_where(identity: &RowIdentity, first: usize) -> String {
    where_is(&identity.columns, first)
}

/// Statements that put `sqlite_sequence` back to `value`.
fn restore_sequence(table: &str, value: Option<i64>) -> Vec<Statement> {
    let mut statements = vec![Statement::execute(
        "DELETE FROM sqlite_sequence WHERE name = ?1",
        vec![CellValue::from(table)],
    )];
    if let Some(seq) = value {
        statements.push(Statement::execute(
            "INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)",
            vec![CellValue::from(table), CellValue::Integer(seq)],
        ));
    }
    statements
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        ident_list(columns),
        placeholders(1, columns.len())
    )
}

/// Recreate a table from an image: DDL, rows, indexes, triggers, sequence.
fn recreate_statements(image: &TableImage) -> Vec<Statement> {
    let def = &image.definition;
    let mut statements = vec![Statement::execute(def.create_sql.clone(), vec![])];
    if !image.rows.is_empty() {
        statements.push(Statement::InsertRows {
            table: def.table.clone(),
            columns: image.columns.clone(),
            rows: image.rows.clone(),
        });
    }
    statements.extend(def.index_sql.iter().map(|sql| Statement::execute(sql.clone(), vec![])));
    statements.extend(def.trigger_sql.iter().map(|sql| Statement::execute(sql.clone(), vec![])));
    if image.autoincrement {
        statements.extend(restore_sequence(&def.table, def.sequence));
    }
    statements
}

pub fn cell_edit(
    table: &str,
    identity: RowIdentity,
    column: &str,
    old: CellValue,
    new: CellValue,
) -> MutationPlan {
    let set = |value: &CellValue| {
        let mut params = vec![value.clone()];
        params.extend(identity.values.iter().cloned());
        Statement::execute_expecting(
            format!(
                "UPDATE {} SET {} = ?1 WHERE {}",
                quote_ident(table),
                quote_ident(column),
                row_where(&identity, 2)
            ),
            params,
            1,
        )
    };
    let holds = |value: &CellValue| Precondition::RowMatches {
        table: table.to_string(),
        identity: identity.clone(),
        values: vec![(column.to_string(), value.clone())],
    };

    let description = format!("Edit {table}.{column} ({identity}): {old} to {new}");
    MutationPlan {
        kind: MutationKind::CellEdit,
        table: table.to_string(),
        forward: Action::new(vec![holds(&old)], vec![set(&new)]),
        inverse: Action::new(vec![holds(&new)], vec![set(&old)]),
        description,
    }
}

/// `values` holds every inserted column, including an assigned rowid key.
/// `sequence_before` is set for AUTOINCREMENT tables: the inverse puts
/// `sqlite_sequence` back to that value (or removes the entry).
pub fn row_insert(
    table: &str,
    identity: RowIdentity,
    values: Vec<(String, CellValue)>,
    sequence_before: Option<Option<i64>>,
) -> MutationPlan {
    let columns: Vec<String> = values.iter().map(|(c, _)| c.clone()).collect();
    let params: Vec<CellValue> = values.iter().map(|(_, v)| v.clone()).collect();

    let forward = Action::new(
        vec![Precondition::RowAbsent {
            table: table.to_string(),
            identity: identity.clone(),
        }],
        vec![Statement::execute_expecting(insert_sql(table, &columns), params, 1)],
    );

    let mut undo = vec![Statement::execute_expecting(
        format!("DELETE FROM {} WHERE {}", quote_ident(table), row_where(&identity, 1)),
        identity.values.clone(),
        1,
    )];
    if let Some(seq) = sequence_before {
        undo.extend(restore_sequence(table, seq));
    }
    let inverse = Action::new(
        vec![Precondition::RowMatches {
            table: table.to_string(),
            identity: identity.clone(),
            values,
        }],
        undo,
    );

    MutationPlan {
        kind: MutationKind::RowInsert,
        table: table.to_string(),
        forward,
        inverse,
        description: format!("Insert row into {table} ({identity})"),
    }
}

/// `row` is the full pre-delete row over the capture columns.
pub fn row_delete(table: &str, identity: RowIdentity, row: Vec<(String, CellValue)>) -> MutationPlan {
    let columns: Vec<String> = row.iter().map(|(c, _)| c.clone()).collect();
    let values: Vec<CellValue> = row.iter().map(|(_, v)| v.clone()).collect();

    let forward = Action::new(
        vec![Precondition::RowMatches {
            table: table.to_string(),
            identity: identity.clone(),
            values: row,
        }],
        vec![Statement::execute_expecting(
            format!("DELETE FROM {} WHERE {}", quote_ident(table), row_where(&identity, 1)),
            identity.values.clone(),
            1,
        )],
    );
    let inverse = Action::new(
        vec![Precondition::RowAbsent {
            table: table.to_string(),
            identity: identity.clone(),
        }],
        vec![Statement::execute_expecting(insert_sql(table, &columns), values, 1)],
    );

    MutationPlan {
        kind: MutationKind::RowDelete,
        table: table.to_string(),
        forward,
        inverse,
        description: format!("Delete row from {table} ({identity})"),
    }
}

/// `stored_default` is what every existing row holds after the ALTER.
pub fn column_add(
    table: &str,
    column: &ColumnDef,
    stored_default: CellValue,
    removal: ColumnRemovalPlan,
) -> MutationPlan {
    let forward = Action::new(
        vec![
            Precondition::TableExists {
                table: table.to_string(),
            },
            Precondition::ColumnAbsent {
                table: table.to_string(),
                column: column.name.clone(),
            },
        ],
        vec![Statement::execute(
            format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_ident(table),
                column.definition_sql()
            ),
            vec![],
        )],
    );

    let mut preconditions = vec![
        Precondition::ColumnExists {
            table: table.to_string(),
            column: column.name.clone(),
        },
        Precondition::ColumnHolds {
            table: table.to_string(),
            column: column.name.clone(),
            value: stored_default,
        },
    ];
    let remove = match removal {
        ColumnRemovalPlan::Native => Statement::execute(
            format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_ident(table),
                quote_ident(&column.name)
            ),
            vec![],
        ),
        ColumnRemovalPlan::Rebuild {
            definition,
            columns,
            mut table_columns,
        } => {
            // The rebuild recreates the captured DDL, so anything added
            // since would be lost.
            table_columns.push(column.name.clone());
            preconditions.push(Precondition::TableShape {
                table: table.to_string(),
                columns: table_columns,
                index_sql: definition.index_sql.clone(),
                trigger_sql: definition.trigger_sql.clone(),
            });
            Statement::RebuildTable {
                table: table.to_string(),
                create_sql: definition.create_sql,
                columns,
                index_sql: definition.index_sql,
                trigger_sql: definition.trigger_sql,
            }
        }
    };
    let inverse = Action::new(preconditions, vec![remove]);

    MutationPlan {
        kind: MutationKind::ColumnAdd,
        table: table.to_string(),
        forward,
        inverse,
        description: format!("Add column {table}.{} {}", column.name, column.declared_type),
    }
}

/// `after_fingerprint` is the image's fingerprint without the dropped column.
pub fn column_drop(column: &str, image: TableImage, after_fingerprint: u64) -> MutationPlan {
    let table = image.definition.table.clone();
    let forward = Action::new(
        vec![
            Precondition::ColumnExists {
                table: table.clone(),
                column: column.to_string(),
            },
            Precondition::TableContent {
                table: table.clone(),
                fingerprint: image.fingerprint,
            },
        ],
        vec![Statement::execute(
            format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_ident(&table),
                quote_ident(column)
            ),
            vec![],
        )],
    );

    let mut restore = vec![Statement::execute(
        format!("DROP TABLE {}", quote_ident(&table)),
        vec![],
    )];
    restore.extend(recreate_statements(&image));
    let inverse = Action::new(
        vec![
            Precondition::ColumnAbsent {
                table: table.clone(),
                column: column.to_string(),
            },
            Precondition::TableContent {
                table: table.clone(),
                fingerprint: after_fingerprint,
            },
        ],
        restore,
    );

    MutationPlan {
        kind: MutationKind::ColumnDrop,
        description: format!("Drop column {table}.{column} ({} rows kept for undo)", image.rows.len()),
        table,
        forward,
        inverse,
    }
}

/// `CREATE TABLE` statement for new column definitions.
pub fn create_table_sql(table: &str, columns: &[ColumnDef]) -> String {
    let mut parts: Vec<String> = columns.iter().map(ColumnDef::definition_sql).collect();
    let pk: Vec<&str> = columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.as_str())
        .collect();
    if !pk.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", ident_list(&pk)));
    }
    format!("CREATE TABLE {} ({})", quote_ident(table), parts.join(", "))
}

pub fn table_create(table: &str, columns: &[ColumnDef]) -> MutationPlan {
    let forward = Action::new(
        vec![Precondition::TableAbsent {
            table: table.to_string(),
        }],
        vec![Statement::execute(create_table_sql(table, columns), vec![])],
    );
    let inverse = Action::new(
        vec![
            Precondition::TableExists {
                table: table.to_string(),
            },
            Precondition::RowCount {
                table: table.to_string(),
                count: 0,
            },
        ],
        vec![Statement::execute(format!("DROP TABLE {}", quote_ident(table)), vec![])],
    );
    MutationPlan {
        kind: MutationKind::TableCreate,
        table: table.to_string(),
        forward,
        inverse,
        description: format!("Create table {table} ({} columns)", columns.len()),
    }
}

pub fn table_rename(from: &str, to: &str) -> MutationPlan {
    let rename = |a: &str, b: &str| {
        Action::new(
            vec![
                Precondition::TableExists { table: a.to_string() },
                Precondition::TableAbsent { table: b.to_string() },
            ],
            vec![Statement::execute(
                format!("ALTER TABLE {} RENAME TO {}", quote_ident(a), quote_ident(b)),
                vec![],
            )],
        )
    };
    MutationPlan {
        kind: MutationKind::TableRename,
        table: from.to_string(),
        forward: rename(from, to),
        inverse: rename(to, from),
        description: format!("Rename table {from} to {to}"),
    }
}

pub fn table_drop(image: TableImage) -> MutationPlan {
    let table = image.definition.table.clone();
    let forward = Action::new(
        vec![
            Precondition::TableExists {
                table: table.clone(),
            },
            Precondition::TableContent {
                table: table.clone(),
                fingerprint: image.fingerprint,
            },
        ],
        vec![Statement::execute(format!("DROP TABLE {}", quote_ident(&table)), vec![])],
    );
    let inverse = Action::new(
        vec![Precondition::TableAbsent {
            table: table.clone(),
        }],
        recreate_statements(&image),
    );
    MutationPlan {
        kind: MutationKind::TableDrop,
        description: format!("Drop table {table} ({} rows kept for undo)", image.rows.len()),
        table,
        forward,
        inverse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(rows: usize) -> TableImage {
        TableImage {
            definition: TableDefinition {
                table: "items".into(),
                create_sql: "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, v)".into(),
                index_sql: vec!["CREATE INDEX items_v ON items(v)".into()],
                trigger_sql: vec![],
                sequence: Some(rows as i64),
            },
            autoincrement: true,
            columns: vec!["id".into(), "v".into()],
            rows: (1..=rows as i64)
                .map(|i| vec![CellValue::Integer(i), CellValue::Integer(i * 10)])
                .collect(),
            fingerprint: 42,
        }
    }

    #[test]
    fn cell_edit_inverse_restores_old_value() {
        let plan = cell_edit(
            "users",
            RowIdentity::single("id", 1),
            "name",
            CellValue::from("Alice"),
            CellValue::from("Bob"),
        );
        match &plan.inverse.statements[0] {
            Statement::Execute {
                sql,
                params,
                expected_changes,
            } => {
                assert_eq!(sql, "UPDATE \"users\" SET \"name\" = ?1 WHERE \"id\" IS ?2");
                assert_eq!(params, &vec![CellValue::from("Alice"), CellValue::Integer(1)]);
                assert_eq!(*expected_changes, Some(1));
            }
            other => panic!("unexpected statement {other:?}"),
        }
        assert!(plan.description.contains("\"Alice\" to \"Bob\""));
    }

    #[test]
    fn table_drop_inverse_recreates_then_restores_rows_indexes_and_sequence() {
        let plan = table_drop(image(3));
        let kinds: Vec<&str> = plan
            .inverse
            .statements
            .iter()
            .map(|s| match s {
                Statement::Execute { sql, .. } if sql.starts_with("CREATE TABLE") => "create",
                Statement::Execute { sql, .. } if sql.starts_with("CREATE INDEX") => "index",
                Statement::Execute { sql, .. } if sql.contains("sqlite_sequence") => "seq",
                Statement::InsertRows { .. } => "rows",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, ["create", "rows", "index", "seq", "seq"]);
    }

    #[test]
    fn empty_table_drop_skips_row_insert() {
        let plan = table_drop(image(0));
        assert!(!plan
            .inverse
            .statements
            .iter()
            .any(|s| matches!(s, Statement::InsertRows { .. })));
    }

    #[test]
    fn create_sql_uses_table_level_primary_key() {
        let sql = create_table_sql(
            "t",
            &[
                ColumnDef::new("id", "INTEGER").primary_key(),
                ColumnDef::new("name", "TEXT").not_null().default_value(""),
            ],
        );
        assert_eq!(
            sql,
            "CREATE TABLE \"t\" (\"id\" INTEGER, \"name\" TEXT NOT NULL DEFAULT '', PRIMARY KEY (\"id\"))"
        );
    }
}
