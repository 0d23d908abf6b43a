//! Row reads, selector resolution and content fingerprints.

use rusqlite::{params_from_iter, Connection};
use tablesafe_core::errors::StorageError;
use tablesafe_core::sql::{ident_list, quote_ident, where_is};
use tablesafe_core::types::identity::{RowIdentity, RowSelector};
use tablesafe_core::types::schema::TableSchema;
use tablesafe_core::types::value::CellValue;
use xxhash_rust::xxh3::Xxh3;

/// Names SQLite accepts for the rowid, in order of preference.
const ROWID_NAMES: [&str; 3] = ["rowid", "_rowid_", "oid"];

/// Column names plus ordered rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// How a selector resolved against the live table.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Unique(RowIdentity),
    /// Zero or several rows matched.
    Ambiguous(u64),
}

/// A rowid name that no real column shadows.
pub fn rowid_name(table: &TableSchema) -> Option<&'static str> {
    if !table.has_rowid() {
        return None;
    }
    ROWID_NAMES.into_iter().find(|n| table.column(n).is_none())
}

/// Columns that reproduce a row exactly on re-insert: the rowid when it is
/// not aliased, then every writable column.
///
/// `None` when the rowid is needed but every rowid name is shadowed.
pub fn capture_columns(table: &TableSchema) -> Option<Vec<String>> {
    let mut columns = Vec::with_capacity(table.columns.len() + 1);
    if table.has_rowid() && table.rowid_alias().is_none() {
        columns.push(rowid_name(table)?.to_string());
    }
    columns.extend(table.writable_columns().iter().map(|c| c.name.clone()));
    Some(columns)
}

/// Stable row order: rowid for rowid tables, primary key otherwise.
pub fn order_clause(table: &TableSchema) -> String {
    if let Some(rowid) = rowid_name(table) {
        return format!("ORDER BY {}", quote_ident(rowid));
    }
    let pk: Vec<&str> = table.primary_key().iter().map(|c| c.name.as_str()).collect();
    if pk.is_empty() {
        String::new()
    } else {
        format!("ORDER BY {}", ident_list(&pk))
    }
}

fn visible_columns(table: &TableSchema) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|c| c.hidden != 1)
        .map(|c| c.name.clone())
        .collect()
}

/// One page of rows, all visible columns. `limit: None` reads to the end.
pub fn read_rows(
    conn: &Connection,
    table: &TableSchema,
    limit: Option<u64>,
    offset: u64,
) -> Result<RowSet, StorageError> {
    let columns = visible_columns(table);
    let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    let sql = format!(
        "SELECT {} FROM {} {} LIMIT ?1 OFFSET ?2",
        ident_list(&columns),
        quote_ident(&table.name),
        order_clause(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let width = columns.len();
    let rows = stmt
        .query_map([limit, offset], |row| collect_row(row, width))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RowSet { columns, rows })
}

/// Every row, in stable order, for the given columns.
pub fn select_rows(
    conn: &Connection,
    table: &TableSchema,
    columns: &[String],
) -> Result<Vec<Vec<CellValue>>, StorageError> {
    let sql = format!(
        "SELECT {} FROM {} {}",
        ident_list(columns),
        quote_ident(&table.name),
        order_clause(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let width = columns.len();
    let rows = stmt
        .query_map([], |row| collect_row(row, width))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn collect_row(row: &rusqlite::Row<'_>, width: usize) -> rusqlite::Result<Vec<CellValue>> {
    (0..width).map(|i| row.get::<_, CellValue>(i)).collect()
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<u64, StorageError> {
    let n: i64 = conn.query_row(
        &format!("SELECT count(*) FROM {}", quote_ident(table)),
        [],
        |r| r.get(0),
    )?;
    Ok(n.max(0) as u64)
}

/// Rows where every `column IS value` pair holds.
pub fn count_matching(
    conn: &Connection,
    table: &str,
    pairs: &[(String, CellValue)],
) -> Result<u64, StorageError> {
    let columns: Vec<&str> = pairs.iter().map(|(c, _)| c.as_str()).collect();
    let sql = format!(
        "SELECT count(*) FROM {} WHERE {}",
        quote_ident(table),
        where_is(&columns, 1)
    );
    let n: i64 = conn.query_row(&sql, params_from_iter(pairs.iter().map(|(_, v)| v)), |r| {
        r.get(0)
    })?;
    Ok(n.max(0) as u64)
}

/// `columns` of the first row matching `pairs`.
pub fn fetch_row(
    conn: &Connection,
    table: &str,
    columns: &[String],
    pairs: &[(String, CellValue)],
) -> Result<Option<Vec<CellValue>>, StorageError> {
    let keys: Vec<&str> = pairs.iter().map(|(c, _)| c.as_str()).collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {} LIMIT 1",
        ident_list(columns),
        quote_ident(table),
        where_is(&keys, 1)
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(pairs.iter().map(|(_, v)| v)))?;
    match rows.next()? {
        Some(row) => Ok(Some(collect_row(row, columns.len())?)),
        None => Ok(None),
    }
}

/// Resolve a selector to the primary key of exactly one row.
pub fn resolve_selector(
    conn: &Connection,
    table: &TableSchema,
    selector: &RowSelector,
) -> Result<Resolution, StorageError> {
    let pairs = selector.pairs();
    let matches = count_matching(conn, &table.name, pairs)?;
    if matches != 1 {
        return Ok(Resolution::Ambiguous(matches));
    }
    let pk: Vec<String> = table.primary_key().iter().map(|c| c.name.clone()).collect();
    match fetch_row(conn, &table.name, &pk, pairs)? {
        Some(values) => Ok(Resolution::Unique(RowIdentity::new(pk, values))),
        None => Ok(Resolution::Ambiguous(0)),
    }
}

/// xxh3 over column names and ordered rows, with type tags so `1`, `1.0`
/// and `'1'` hash differently.
pub fn fingerprint(columns: &[String], rows: &[Vec<CellValue>]) -> u64 {
    let mut hasher = Xxh3::new();
    for name in columns {
        hasher.update(name.to_ascii_lowercase().as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(&(rows.len() as u64).to_le_bytes());
    for row in rows {
        for value in row {
            hash_value(&mut hasher, value);
        }
        hasher.update(&[0xFF]);
    }
    hasher.digest()
}

fn hash_value(hasher: &mut Xxh3, value: &CellValue) {
    match value {
        CellValue::Null => hasher.update(&[0]),
        CellValue::Integer(i) => {
            hasher.update(&[1]);
            hasher.update(&i.to_le_bytes());
        }
        CellValue::Real(r) => {
            hasher.update(&[2]);
            hasher.update(&r.to_bits().to_le_bytes());
        }
        CellValue::Text(s) => {
            hasher.update(&[3]);
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        CellValue::Blob(b) => {
            hasher.update(&[4]);
            hasher.update(&(b.len() as u64).to_le_bytes());
            hasher.update(b);
        }
    }
}

/// Fingerprint of the live table over its capture columns.
pub fn table_fingerprint(conn: &Connection, table: &TableSchema) -> Result<u64, StorageError> {
    let columns = capture_columns(table).ok_or_else(|| StorageError::NotSupported {
        operation: "fingerprint".to_string(),
        reason: format!("rowid of {} is shadowed by real columns", table.name),
    })?;
    let rows = select_rows(conn, table, &columns)?;
    Ok(fingerprint(&columns, &rows))
}
