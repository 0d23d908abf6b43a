//! Safety validator: ALLOW with a fully specified plan, or BLOCK with a reason.
//!
//! Checks run in a fixed order and the first failure wins:
//! request sanity, then (1) row identity, (2) native capability,
//! (3) reversibility, (4) type conversion. Validation only reads.

use rusqlite::Connection;
use tablesafe_core::config::ColumnRemoval;
use tablesafe_core::errors::{EngineError, SchemaReadError, StorageError};
use tablesafe_core::sql::{is_reserved_name, is_strict_type_name, is_valid_type_name, quote_ident};
use tablesafe_core::types::command::MutationPlan;
use tablesafe_core::types::identity::{RowIdentity, RowSelector};
use tablesafe_core::types::mutation::{ColumnDef, MutationRequest};
use tablesafe_core::types::outcome::{BlockReason, ValidationResult};
use tablesafe_core::types::schema::{ColumnSchema, SchemaSnapshot, TableKind, TableSchema};
use tablesafe_core::types::value::{Affinity, CellValue};

use crate::capabilities::{Capabilities, RemovalStrategy};
use crate::plan::{self, ColumnRemovalPlan, TableImage};
use crate::queries::rows::{self, Resolution};
use crate::queries::schema;

/// Engine settings the validator consults.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    pub capabilities: Capabilities,
    pub column_removal: ColumnRemoval,
}

/// Internal short-circuit: either a block decision or a real error.
enum Check {
    Block(BlockReason),
    Error(EngineError),
}

impl From<EngineError> for Check {
    fn from(e: EngineError) -> Self {
        Self::Error(e)
    }
}

impl From<StorageError> for Check {
    fn from(e: StorageError) -> Self {
        match e {
            // A capture that cannot hold the exact bytes cannot be restored.
            StorageError::NonUtf8Text(text) => {
                irreversible(format!("{text}; it cannot be restored byte for byte"))
            }
            e => Self::Error(e.into()),
        }
    }
}

impl From<SchemaReadError> for Check {
    fn from(e: SchemaReadError) -> Self {
        Self::Error(e.into())
    }
}

type Checked<T> = Result<T, Check>;

fn invalid(detail: impl Into<String>) -> Check {
    Check::Block(BlockReason::InvalidRequest {
        detail: detail.into(),
    })
}

fn irreversible(detail: impl Into<String>) -> Check {
    Check::Block(BlockReason::Irreversible {
        detail: detail.into(),
    })
}

fn unsupported(capability: impl Into<String>) -> Check {
    Check::Block(BlockReason::Unsupported {
        capability: capability.into(),
    })
}

/// Decide whether `request` may run against the current schema.
pub fn validate(
    conn: &Connection,
    request: &MutationRequest,
    snapshot: &SchemaSnapshot,
    ctx: &ValidationContext,
) -> Result<ValidationResult, EngineError> {
    let checked = match request {
        MutationRequest::CellEdit {
            table,
            row,
            column,
            value,
        } => cell_edit(conn, snapshot, table, row, column, value),
        MutationRequest::RowInsert { table, values } => row_insert(conn, snapshot, table, values),
        MutationRequest::RowDelete { table, row } => row_delete(conn, snapshot, table, row),
        MutationRequest::ColumnAdd { table, column } => {
            column_add(conn, snapshot, ctx, table, column)
        }
        MutationRequest::ColumnDrop { table, column } => {
            column_drop(conn, snapshot, ctx, table, column)
        }
        MutationRequest::TableCreate { table, columns } => table_create(conn, table, columns),
        MutationRequest::TableRename { from, to } => table_rename(conn, snapshot, from, to),
        MutationRequest::TableDrop { table } => table_drop(conn, snapshot, table),
    };

    match checked {
        Ok(plan) => Ok(ValidationResult::Allow(Box::new(plan))),
        Err(Check::Block(reason)) => {
            tracing::debug!(kind = %request.kind(), reason = %reason, "mutation blocked");
            Ok(ValidationResult::Block(reason))
        }
        Err(Check::Error(e)) => Err(e),
    }
}

// ---- request checks ----

fn check_new_name(name: &str, what: &str) -> Checked<()> {
    if name.trim().is_empty() {
        return Err(invalid(format!("{what} name is empty")));
    }
    if name.contains('\0') {
        return Err(invalid(format!("{what} name contains a NUL character")));
    }
    if is_reserved_name(name) {
        return Err(invalid(format!("{what} name {name:?} is reserved for SQLite")));
    }
    Ok(())
}

fn require_table<'s>(snapshot: &'s SchemaSnapshot, name: &str) -> Checked<&'s TableSchema> {
    if is_reserved_name(name) {
        return Err(invalid(format!("{name} is an internal SQLite table")));
    }
    let table = snapshot
        .table(name)
        .ok_or_else(|| invalid(format!("unknown table {name}")))?;
    if table.kind != TableKind::Table {
        return Err(invalid(format!("{} is a virtual table", table.name)));
    }
    Ok(table)
}

fn require_column<'t>(table: &'t TableSchema, name: &str) -> Checked<&'t ColumnSchema> {
    table
        .column(name)
        .ok_or_else(|| invalid(format!("unknown column {}.{name}", table.name)))
}

fn check_type_name(declared: &str, strict: bool) -> Checked<()> {
    if !is_valid_type_name(declared) {
        return Err(invalid(format!("invalid type name {declared:?}")));
    }
    if strict && !is_strict_type_name(declared) {
        return Err(invalid(format!(
            "STRICT tables only accept INT, INTEGER, REAL, TEXT, BLOB or ANY, not {declared:?}"
        )));
    }
    Ok(())
}

fn no_duplicates<'a>(names: impl IntoIterator<Item = &'a str>, what: &str) -> Checked<()> {
    let mut seen: Vec<&str> = Vec::new();
    for name in names {
        if seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            return Err(invalid(format!("{what} {name} named twice")));
        }
        seen.push(name);
    }
    Ok(())
}

// ---- shared rules ----

/// Rule 1: the table has a key and the selector names exactly one row.
fn resolve_row(conn: &Connection, table: &TableSchema, selector: &RowSelector) -> Checked<RowIdentity> {
    if !table.has_primary_key() {
        return Err(Check::Block(BlockReason::NoPrimaryKey {
            table: table.name.clone(),
        }));
    }

    let pairs = selector.pairs();
    if pairs.is_empty() {
        return Err(invalid("row selector is empty"));
    }
    no_duplicates(pairs.iter().map(|(c, _)| c.as_str()), "selector column")?;
    for (column, _) in pairs {
        require_column(table, column)?;
    }
    if let RowSelector::PrimaryKey(pairs) = selector {
        let pk = table.primary_key();
        let exact = pairs.len() == pk.len()
            && pk
                .iter()
                .all(|c| pairs.iter().any(|(name, _)| name.eq_ignore_ascii_case(&c.name)));
        if !exact {
            let names: Vec<&str> = pk.iter().map(|c| c.name.as_str()).collect();
            return Err(invalid(format!(
                "primary-key selector must name exactly: {}",
                names.join(", ")
            )));
        }
    }

    match rows::resolve_selector(conn, table, selector)? {
        Resolution::Unique(identity) => Ok(identity),
        Resolution::Ambiguous(matches) => Err(Check::Block(BlockReason::AmbiguousRow {
            table: table.name.clone(),
            matches,
        })),
    }
}

/// Row changes on tables with triggers have side effects no inverse covers.
fn reject_triggers(table: &TableSchema) -> Checked<()> {
    if table.triggers.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = table.triggers.iter().map(|t| t.name.as_str()).collect();
    Err(irreversible(format!(
        "{} has triggers ({}) whose effects cannot be undone",
        table.name,
        names.join(", ")
    )))
}

/// Rule 4 plus nullability: the value as it will be stored, without coercion.
fn conform(table: &TableSchema, column: &ColumnSchema, value: &CellValue) -> Checked<CellValue> {
    if value.is_null() && !column.nullable {
        return Err(invalid(format!(
            "{}.{} is NOT NULL",
            table.name, column.name
        )));
    }
    let affinity = table.affinity_of(column);
    value.representable_as(affinity).ok_or_else(|| {
        Check::Block(BlockReason::AmbiguousTypeConversion {
            column: format!("{}.{}", table.name, column.name),
            detail: format!("{} value {value} into a {affinity} column", value.type_name()),
        })
    })
}

fn capture_image(conn: &Connection, table: &TableSchema) -> Checked<TableImage> {
    let columns = rows::capture_columns(table).ok_or_else(|| {
        irreversible(format!(
            "rowid of {} is shadowed by real columns and cannot be captured",
            table.name
        ))
    })?;
    let definition = schema::definition_of(conn, table)?;
    let rows = rows::select_rows(conn, table, &columns)?;
    let fingerprint = rows::fingerprint(&columns, &rows);
    Ok(TableImage {
        definition,
        autoincrement: table.autoincrement,
        columns,
        rows,
        fingerprint,
    })
}

// ---- per kind ----

fn cell_edit(
    conn: &Connection,
    snapshot: &SchemaSnapshot,
    table: &str,
    selector: &RowSelector,
    column: &str,
    value: &CellValue,
) -> Checked<MutationPlan> {
    let table = require_table(snapshot, table)?;
    let col = require_column(table, column)?;
    if col.is_generated() {
        return Err(invalid(format!("{}.{} is a generated column", table.name, col.name)));
    }

    let identity = resolve_row(conn, table, selector)?;

    if col.is_primary_key() {
        return Err(unsupported(format!(
            "editing primary-key column {}.{}",
            table.name, col.name
        )));
    }

    reject_triggers(table)?;
    let cascading: Vec<&str> = snapshot
        .referencing(&table.name)
        .into_iter()
        .filter(|(_, fk)| {
            fk.cascades_on_update() && fk.to_columns.iter().any(|c| c.eq_ignore_ascii_case(&col.name))
        })
        .map(|(child, _)| child.name.as_str())
        .collect();
    if !cascading.is_empty() {
        return Err(irreversible(format!(
            "updating {}.{} cascades into {}",
            table.name,
            col.name,
            cascading.join(", ")
        )));
    }

    let new = conform(table, col, value)?;
    let key_pairs: Vec<(String, CellValue)> = identity
        .columns
        .iter()
        .cloned()
        .zip(identity.values.iter().cloned())
        .collect();
    let old = rows::fetch_row(conn, &table.name, &[col.name.clone()], &key_pairs)?
        .and_then(|mut v| v.pop())
        .ok_or_else(|| {
            Check::Block(BlockReason::AmbiguousRow {
                table: table.name.clone(),
                matches: 0,
            })
        })?;

    Ok(plan::cell_edit(&table.name, identity, &col.name, old, new))
}

fn row_insert(
    conn: &Connection,
    snapshot: &SchemaSnapshot,
    table: &str,
    values: &[(String, CellValue)],
) -> Checked<MutationPlan> {
    let table = require_table(snapshot, table)?;
    no_duplicates(values.iter().map(|(c, _)| c.as_str()), "column")?;
    for (name, _) in values {
        let col = require_column(table, name)?;
        if col.is_generated() {
            return Err(invalid(format!("{}.{} is a generated column", table.name, col.name)));
        }
    }

    if !table.has_primary_key() {
        return Err(irreversible(format!(
            "{} has no primary key, so the inserted row cannot be identified for undo",
            table.name
        )));
    }
    reject_triggers(table)?;

    let alias = table.rowid_alias().map(|c| c.name.clone());
    // A NULL rowid alias means "assign one", same as leaving it out.
    let is_alias = |name: &str| alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(name));
    let provided = |name: &str| {
        values
            .iter()
            .find(|(c, v)| c.eq_ignore_ascii_case(name) && !(v.is_null() && is_alias(c.as_str())))
            .map(|(_, v)| v)
    };

    // Key first, in key order, so the identity is complete.
    let mut row: Vec<(String, CellValue)> = Vec::new();
    let mut key_values = Vec::new();
    let pk = table.primary_key();
    for key in &pk {
        let value = match provided(&key.name) {
            Some(v) if v.is_null() => {
                return Err(invalid(format!("primary key {}.{} cannot be NULL", table.name, key.name)))
            }
            Some(v) => conform(table, key, v)?,
            None if is_alias(&key.name) => {
                CellValue::Integer(next_rowid(conn, table)?)
            }
            None => {
                return Err(irreversible(format!(
                    "no value given for key column {}.{}",
                    table.name, key.name
                )))
            }
        };
        key_values.push(value.clone());
        row.push((key.name.clone(), value));
    }
    let identity = RowIdentity::new(pk.iter().map(|c| c.name.clone()).collect(), key_values);

    for col in table.writable_columns() {
        if col.is_primary_key() {
            continue;
        }
        match provided(&col.name) {
            Some(v) => {
                let stored = conform(table, col, v)?;
                row.push((col.name.clone(), stored));
            }
            None if col.has_volatile_default() => {
                return Err(irreversible(format!(
                    "default of {}.{} is evaluated at insert time",
                    table.name, col.name
                )))
            }
            None if !col.nullable && col.default_sql.is_none() => {
                return Err(invalid(format!(
                    "{}.{} is NOT NULL and has no default",
                    table.name, col.name
                )))
            }
            None => {}
        }
    }

    let pairs: Vec<(String, CellValue)> = identity
        .columns
        .iter()
        .cloned()
        .zip(identity.values.iter().cloned())
        .collect();
    if rows::count_matching(conn, &table.name, &pairs)? > 0 {
        return Err(invalid(format!("{} already has a row with {identity}", table.name)));
    }

    let sequence_before = if table.autoincrement {
        Some(schema::sequence_value(conn, &table.name)?)
    } else {
        None
    };
    Ok(plan::row_insert(&table.name, identity, row, sequence_before))
}

/// The key SQLite would assign: max rowid + 1, never below the
/// AUTOINCREMENT high-water mark.
fn next_rowid(conn: &Connection, table: &TableSchema) -> Checked<i64> {
    let max: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT max({}) FROM {}",
                quote_ident(rows::rowid_name(table).unwrap_or("rowid")),
                quote_ident(&table.name)
            ),
            [],
            |r| r.get(0),
        )
        .map_err(StorageError::from)?;
    let mut high = max.unwrap_or(0);
    if table.autoincrement {
        if let Some(seq) = schema::sequence_value(conn, &table.name)? {
            high = high.max(seq);
        }
    }
    high.checked_add(1)
        .ok_or_else(|| irreversible(format!("rowid space of {} is exhausted", table.name)))
}

fn row_delete(
    conn: &Connection,
    snapshot: &SchemaSnapshot,
    table: &str,
    selector: &RowSelector,
) -> Checked<MutationPlan> {
    let table = require_table(snapshot, table)?;
    let identity = resolve_row(conn, table, selector)?;

    reject_triggers(table)?;
    let cascading: Vec<&str> = snapshot
        .referencing(&table.name)
        .into_iter()
        .filter(|(_, fk)| fk.cascades_on_delete())
        .map(|(child, _)| child.name.as_str())
        .collect();
    if !cascading.is_empty() {
        return Err(irreversible(format!(
            "deleting from {} cascades into {}",
            table.name,
            cascading.join(", ")
        )));
    }

    let columns = rows::capture_columns(table).ok_or_else(|| {
        irreversible(format!("rowid of {} is shadowed by real columns", table.name))
    })?;
    let key_pairs: Vec<(String, CellValue)> = identity
        .columns
        .iter()
        .cloned()
        .zip(identity.values.iter().cloned())
        .collect();
    let values = rows::fetch_row(conn, &table.name, &columns, &key_pairs)?.ok_or_else(|| {
        Check::Block(BlockReason::AmbiguousRow {
            table: table.name.clone(),
            matches: 0,
        })
    })?;

    Ok(plan::row_delete(
        &table.name,
        identity,
        columns.into_iter().zip(values).collect(),
    ))
}

fn column_add(
    conn: &Connection,
    snapshot: &SchemaSnapshot,
    ctx: &ValidationContext,
    table: &str,
    column: &ColumnDef,
) -> Checked<MutationPlan> {
    let table = require_table(snapshot, table)?;
    check_new_name(&column.name, "column")?;
    if table.column(&column.name).is_some() {
        return Err(invalid(format!("{}.{} already exists", table.name, column.name)));
    }
    check_type_name(&column.declared_type, table.strict)?;
    if column.primary_key {
        return Err(invalid("a primary-key column cannot be added to an existing table"));
    }
    let default = column.default.clone().unwrap_or(CellValue::Null);
    if column.not_null && default.is_null() {
        return Err(invalid(format!(
            "NOT NULL column {}.{} needs a non-NULL default",
            table.name, column.name
        )));
    }

    let strategy = ctx.capabilities.column_removal(ctx.column_removal).ok_or_else(|| {
        unsupported("native DROP COLUMN (SQLite 3.35.0 or later) to undo the column add")
    })?;
    let removal = match strategy {
        RemovalStrategy::Native => ColumnRemovalPlan::Native,
        RemovalStrategy::Rebuild => {
            let referencing = snapshot.referencing(&table.name);
            if !referencing.is_empty() {
                return Err(irreversible(format!(
                    "{} is referenced by foreign keys, so it cannot be rebuilt to remove the column",
                    table.name
                )));
            }
            let columns = rows::capture_columns(table).ok_or_else(|| {
                irreversible(format!("rowid of {} is shadowed by real columns", table.name))
            })?;
            ColumnRemovalPlan::Rebuild {
                definition: schema::definition_of(conn, table)?,
                columns,
                table_columns: table.columns.iter().map(|c| c.name.clone()).collect(),
            }
        }
    };

    let affinity = Affinity::for_column(&column.declared_type, table.strict);
    let stored_default = default.representable_as(affinity).ok_or_else(|| {
        Check::Block(BlockReason::AmbiguousTypeConversion {
            column: format!("{}.{}", table.name, column.name),
            detail: format!("default {default} into a {affinity} column"),
        })
    })?;
    let mut column = column.clone();
    if column.default.is_some() {
        column.default = Some(stored_default.clone());
    }

    Ok(plan::column_add(&table.name, &column, stored_default, removal))
}

fn column_drop(
    conn: &Connection,
    snapshot: &SchemaSnapshot,
    ctx: &ValidationContext,
    table: &str,
    column: &str,
) -> Checked<MutationPlan> {
    let table = require_table(snapshot, table)?;
    let col = require_column(table, column)?;
    let qualified = format!("{}.{}", table.name, col.name);

    if col.is_primary_key() {
        return Err(unsupported(format!("dropping primary-key column {qualified}")));
    }
    if col.is_generated() {
        return Err(unsupported(format!("dropping generated column {qualified}")));
    }
    if table.is_indexed(&col.name) {
        return Err(unsupported(format!("dropping indexed or UNIQUE column {qualified}")));
    }
    if table
        .foreign_keys
        .iter()
        .any(|fk| fk.from_columns.iter().any(|c| c.eq_ignore_ascii_case(&col.name)))
    {
        return Err(unsupported(format!("dropping foreign-key column {qualified}")));
    }
    if table.columns.len() <= 1 {
        return Err(unsupported(format!("dropping the only column of {}", table.name)));
    }
    if ctx.capabilities.column_removal(ctx.column_removal) != Some(RemovalStrategy::Native) {
        return Err(unsupported(
            "native DROP COLUMN (SQLite 3.35.0 or later, column_removal not set to rebuild)",
        ));
    }

    let referencing = snapshot.referencing(&table.name);
    if !referencing.is_empty() {
        let children: Vec<&str> = referencing.iter().map(|(t, _)| t.name.as_str()).collect();
        return Err(irreversible(format!(
            "restoring {} would drop a table referenced by {}",
            table.name,
            children.join(", ")
        )));
    }

    let image = capture_image(conn, table)?;
    let keep: Vec<usize> = image
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.eq_ignore_ascii_case(&col.name))
        .map(|(i, _)| i)
        .collect();
    let after_columns: Vec<String> = keep.iter().map(|&i| image.columns[i].clone()).collect();
    let after_rows: Vec<Vec<CellValue>> = image
        .rows
        .iter()
        .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
        .collect();
    let after = rows::fingerprint(&after_columns, &after_rows);

    Ok(plan::column_drop(&col.name, image, after))
}

fn table_create(conn: &Connection, table: &str, columns: &[ColumnDef]) -> Checked<MutationPlan> {
    check_new_name(table, "table")?;
    if schema::object_exists(conn, table)? {
        return Err(invalid(format!("a schema object named {table} already exists")));
    }
    if columns.is_empty() {
        return Err(invalid("a table needs at least one column"));
    }
    no_duplicates(columns.iter().map(|c| c.name.as_str()), "column")?;

    let mut normalized = Vec::with_capacity(columns.len());
    for column in columns {
        check_new_name(&column.name, "column")?;
        check_type_name(&column.declared_type, false)?;
        let mut column = column.clone();
        if let Some(default) = &column.default {
            if column.not_null && default.is_null() {
                return Err(invalid(format!("NOT NULL column {} has a NULL default", column.name)));
            }
            let affinity = Affinity::from_declared_type(&column.declared_type);
            let stored = default.representable_as(affinity).ok_or_else(|| {
                Check::Block(BlockReason::AmbiguousTypeConversion {
                    column: format!("{table}.{}", column.name),
                    detail: format!("default {default} into a {affinity} column"),
                })
            })?;
            column.default = Some(stored);
        }
        normalized.push(column);
    }

    Ok(plan::table_create(table, &normalized))
}

fn table_rename(
    conn: &Connection,
    snapshot: &SchemaSnapshot,
    from: &str,
    to: &str,
) -> Checked<MutationPlan> {
    let table = require_table(snapshot, from)?;
    check_new_name(to, "table")?;
    if table.name.eq_ignore_ascii_case(to) {
        return Err(invalid(format!("{} already has the name {to}", table.name)));
    }
    if schema::object_exists(conn, to)? {
        return Err(invalid(format!("a schema object named {to} already exists")));
    }
    Ok(plan::table_rename(&table.name, to))
}

fn table_drop(conn: &Connection, snapshot: &SchemaSnapshot, table: &str) -> Checked<MutationPlan> {
    let table = require_table(snapshot, table)?;
    let children: Vec<&str> = snapshot
        .referencing(&table.name)
        .into_iter()
        .filter(|(child, _)| !child.name.eq_ignore_ascii_case(&table.name))
        .map(|(child, _)| child.name.as_str())
        .collect();
    if !children.is_empty() {
        return Err(irreversible(format!(
            "{} is referenced by foreign keys from {}",
            table.name,
            children.join(", ")
        )));
    }
    let image = capture_image(conn, table)?;
    Ok(plan::table_drop(image))
}
