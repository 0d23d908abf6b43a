//! Schema inspector. Catalog reads only; never writes.
//!
//! Every metadata query failure surfaces as `SchemaReadError`.

use rusqlite::{params, Connection, OptionalExtension};
use tablesafe_core::errors::SchemaReadError;
use tablesafe_core::types::schema::{
    ColumnSchema, ForeignKey, IndexSchema, SchemaSnapshot, TableDefinition, TableKind,
    TableSchema, TriggerSchema,
};

/// Read a full snapshot of the `main` schema.
pub fn snapshot(conn: &Connection) -> Result<SchemaSnapshot, SchemaReadError> {
    // One read transaction so every catalog query sees the same state.
    let tx = if conn.is_autocommit() {
        Some(conn.unchecked_transaction()?)
    } else {
        None
    };

    let sqlite_version: String = conn.query_row("SELECT sqlite_version()", [], |r| r.get(0))?;
    let mut tables = Vec::new();
    for name in table_names(conn)? {
        tables.push(load_table(conn, &name)?);
    }
    resolve_implicit_references(&mut tables);

    if let Some(tx) = tx {
        tx.rollback()?;
    }
    Ok(SchemaSnapshot {
        tables,
        sqlite_version,
    })
}

/// User tables (ordinary, virtual and shadow), sorted by name.
pub fn table_names(conn: &Connection) -> Result<Vec<String>, SchemaReadError> {
    let mut stmt = conn.prepare_cached(
        "SELECT name FROM pragma_table_list
         WHERE schema = 'main' AND type IN ('table', 'virtual', 'shadow')
           AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Load one table's schema. `TableNotFound` when it does not exist.
pub fn load_table(conn: &Connection, name: &str) -> Result<TableSchema, SchemaReadError> {
    let listing: Option<(String, String, bool, bool)> = conn
        .query_row(
            "SELECT name, type, wr, strict FROM pragma_table_list
             WHERE schema = 'main' AND name = ?1 COLLATE NOCASE
               AND type IN ('table', 'virtual', 'shadow')",
            params![name],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((name, kind, without_rowid, strict)) = listing else {
        return Err(SchemaReadError::TableNotFound(name.to_string()));
    };
    let kind = match kind.as_str() {
        "table" => TableKind::Table,
        "virtual" => TableKind::Virtual,
        _ => TableKind::Shadow,
    };

    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |r| r.get(0),
        )
        .optional()?
        .flatten();
    let autoincrement = sql
        .as_deref()
        .is_some_and(|s| s.to_ascii_uppercase().contains("AUTOINCREMENT"));

    let columns = load_columns(conn, &name)?;
    if columns.is_empty() {
        return Err(SchemaReadError::Inconsistent {
            table: name,
            details: "table reports no columns".to_string(),
        });
    }

    let (foreign_keys, indexes, triggers) = if kind == TableKind::Table {
        (
            load_foreign_keys(conn, &name)?,
            load_indexes(conn, &name)?,
            load_triggers(conn, &name)?,
        )
    } else {
        (Vec::new(), Vec::new(), Vec::new())
    };

    Ok(TableSchema {
        name,
        kind,
        without_rowid,
        strict,
        autoincrement,
        columns,
        foreign_keys,
        indexes,
        triggers,
        sql,
    })
}

fn load_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnSchema>, SchemaReadError> {
    let mut stmt = conn.prepare_cached(
        "SELECT cid, name, type, \"notnull\", dflt_value, pk, hidden
         FROM pragma_table_xinfo(?1)",
    )?;
    let columns = stmt
        .query_map(params![table], |r| {
            Ok(ColumnSchema {
                cid: r.get(0)?,
                name: r.get(1)?,
                declared_type: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                nullable: !r.get::<_, bool>(3)?,
                default_sql: r.get(4)?,
                pk_position: r.get(5)?,
                hidden: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn load_foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKey>, SchemaReadError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete
         FROM pragma_foreign_key_list(?1)
         ORDER BY id, seq",
    )?;
    let rows = stmt
        .query_map(params![table], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut keys: Vec<ForeignKey> = Vec::new();
    for (id, to_table, from, to, on_update, on_delete) in rows {
        match keys.last_mut() {
            Some(fk) if fk.id == id => {
                fk.from_columns.push(from);
                fk.to_columns.push(to.unwrap_or_default());
            }
            _ => keys.push(ForeignKey {
                id,
                from_columns: vec![from],
                to_table,
                to_columns: vec![to.unwrap_or_default()],
                on_update,
                on_delete,
            }),
        }
    }
    Ok(keys)
}

fn load_indexes(conn: &Connection, table: &str) -> Result<Vec<IndexSchema>, SchemaReadError> {
    let mut list = conn.prepare_cached(
        "SELECT l.name, l.\"unique\", l.origin, l.partial, m.sql
         FROM pragma_index_list(?1) AS l
         LEFT JOIN sqlite_master AS m ON m.type = 'index' AND m.name = l.name
         ORDER BY l.name",
    )?;
    let entries = list
        .query_map(params![table], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, bool>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, bool>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut info = conn.prepare_cached(
        "SELECT name FROM pragma_index_info(?1) ORDER BY seqno",
    )?;
    let mut indexes = Vec::with_capacity(entries.len());
    for (name, unique, origin, partial, sql) in entries {
        let columns = info
            .query_map(params![name], |r| r.get::<_, Option<String>>(0))?
            .map(|c| c.map(|c| c.unwrap_or_else(|| "<expr>".to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        indexes.push(IndexSchema {
            name,
            unique,
            origin,
            partial,
            columns,
            sql,
        });
    }
    Ok(indexes)
}

fn load_triggers(conn: &Connection, table: &str) -> Result<Vec<TriggerSchema>, SchemaReadError> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, sql FROM sqlite_master
         WHERE type = 'trigger' AND tbl_name = ?1 COLLATE NOCASE
         ORDER BY name",
    )?;
    let triggers = stmt
        .query_map(params![table], |r| {
            Ok(TriggerSchema {
                name: r.get(0)?,
                sql: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(triggers)
}

/// Foreign keys written as `REFERENCES parent` name no columns;
/// they point at the parent's primary key.
fn resolve_implicit_references(tables: &mut [TableSchema]) {
    let parent_keys: Vec<(String, Vec<String>)> = tables
        .iter()
        .map(|t| {
            (
                t.name.clone(),
                t.primary_key().iter().map(|c| c.name.clone()).collect(),
            )
        })
        .collect();

    for table in tables.iter_mut() {
        for fk in &mut table.foreign_keys {
            if fk.to_columns.iter().all(|c| !c.is_empty()) {
                continue;
            }
            let parent_pk = parent_keys
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&fk.to_table))
                .map(|(_, pk)| pk.as_slice())
                .unwrap_or_default();
            for (i, col) in fk.to_columns.iter_mut().enumerate() {
                if col.is_empty() {
                    *col = parent_pk
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| "rowid".to_string());
                }
            }
        }
    }
}

/// True when any schema object (table, view, index, trigger) has this name.
pub fn object_exists(conn: &Connection, name: &str) -> Result<bool, SchemaReadError> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE name = ?1 COLLATE NOCASE",
        params![name],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Current `sqlite_sequence` value for an AUTOINCREMENT table.
pub fn sequence_value(conn: &Connection, table: &str) -> Result<Option<i64>, SchemaReadError> {
    let has_sequence: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
        [],
        |r| r.get(0),
    )?;
    if has_sequence == 0 {
        return Ok(None);
    }
    let seq = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            params![table],
            |r| r.get(0),
        )
        .optional()?;
    Ok(seq)
}

/// Everything needed to recreate `table`: DDL, index and trigger DDL,
/// and the AUTOINCREMENT sequence.
pub fn table_definition(conn: &Connection, table: &str) -> Result<TableDefinition, SchemaReadError> {
    let schema = load_table(conn, table)?;
    definition_of(conn, &schema)
}

pub fn definition_of(
    conn: &Connection,
    schema: &TableSchema,
) -> Result<TableDefinition, SchemaReadError> {
    let create_sql = schema
        .sql
        .clone()
        .ok_or_else(|| SchemaReadError::Inconsistent {
            table: schema.name.clone(),
            details: "no CREATE statement in sqlite_master".to_string(),
        })?;
    Ok(TableDefinition {
        table: schema.name.clone(),
        create_sql,
        index_sql: schema.indexes.iter().filter_map(|i| i.sql.clone()).collect(),
        trigger_sql: schema.triggers.iter().map(|t| t.sql.clone()).collect(),
        sequence: sequence_value(conn, &schema.name)?,
    })
}
