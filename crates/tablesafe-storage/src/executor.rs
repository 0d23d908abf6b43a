//! Transactional executor: preconditions then statements, all or nothing.

use rusqlite::{params, params_from_iter, Connection};
use tablesafe_core::errors::{EngineError, SchemaReadError, StorageError};
use tablesafe_core::sql::{ident_list, placeholders, quote_ident};
use tablesafe_core::traits::WorkControl;
use tablesafe_core::types::command::{Action, Command, Direction, Precondition, Statement};
use tablesafe_core::types::identity::RowIdentity;
use tablesafe_core::types::outcome::{ApplyResult, RollbackReason};
use tablesafe_core::types::value::CellValue;

use crate::queries::{rows, schema};

/// Temp table that holds rows while a table is rebuilt.
const STAGING_TABLE: &str = "__tablesafe_stage";

/// Why a transaction was abandoned.
#[derive(Debug)]
enum Abort {
    Precondition(String),
    Cancelled,
    Failed(String),
}

impl From<rusqlite::Error> for Abort {
    fn from(e: rusqlite::Error) -> Self {
        Self::Failed(e.to_string())
    }
}

impl From<StorageError> for Abort {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Cancelled { .. } => Self::Cancelled,
            other => Self::Failed(other.to_string()),
        }
    }
}

impl From<SchemaReadError> for Abort {
    fn from(e: SchemaReadError) -> Self {
        Self::Failed(e.to_string())
    }
}

/// Apply one direction of `command` in its own transaction.
pub fn apply(
    conn: &Connection,
    command: &Command,
    direction: Direction,
    control: &WorkControl,
    batch_size: usize,
) -> Result<ApplyResult, EngineError> {
    tracing::debug!(command = %command.id(), ?direction, "applying command");
    apply_action(conn, command.action(direction), control, batch_size)
}

/// Run `action` atomically. Any failure after `BEGIN` rolls back and is
/// reported as [`ApplyResult::RolledBack`]; only a failure to open the
/// transaction is an error.
pub fn apply_action(
    conn: &Connection,
    action: &Action,
    control: &WorkControl,
    batch_size: usize,
) -> Result<ApplyResult, EngineError> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EngineError::Transaction {
            message: e.to_string(),
        })?;

    let outcome = run(&tx, action, control, batch_size.max(1));
    let reason = match outcome {
        Ok(()) => match tx.commit() {
            Ok(()) => return Ok(ApplyResult::Committed),
            Err(e) => RollbackReason::Failed(format!("commit failed: {e}")),
        },
        // Dropping the transaction rolls it back.
        Err(Abort::Precondition(detail)) => RollbackReason::PreconditionFailed(detail),
        Err(Abort::Cancelled) => RollbackReason::Cancelled,
        Err(Abort::Failed(message)) => RollbackReason::Failed(message),
    };
    tracing::info!(reason = %reason, "transaction rolled back");
    Ok(ApplyResult::RolledBack(reason))
}

fn run(conn: &Connection, action: &Action, control: &WorkControl, batch_size: usize) -> Result<(), Abort> {
    for precondition in &action.preconditions {
        if control.is_cancelled() {
            return Err(Abort::Cancelled);
        }
        match check(conn, precondition) {
            Ok(true) => {}
            Ok(false) => return Err(Abort::Precondition(precondition.to_string())),
            Err(e) => return Err(Abort::Precondition(format!("{precondition}: {e}"))),
        }
    }
    for statement in &action.statements {
        if control.is_cancelled() {
            return Err(Abort::Cancelled);
        }
        execute(conn, statement, control, batch_size)?;
    }
    Ok(())
}

// ---- preconditions ----

fn table_exists(conn: &Connection, table: &str) -> Result<bool, StorageError> {
    let n: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        params![table],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, StorageError> {
    let n: i64 = conn.query_row(
        "SELECT count(*) FROM pragma_table_xinfo(?1) WHERE name = ?2 COLLATE NOCASE",
        params![table, column],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

fn identity_pairs(identity: &RowIdentity) -> Vec<(String, CellValue)> {
    identity
        .columns
        .iter()
        .cloned()
        .zip(identity.values.iter().cloned())
        .collect()
}

fn check(conn: &Connection, precondition: &Precondition) -> Result<bool, StorageError> {
    match precondition {
        Precondition::TableExists { table } => table_exists(conn, table),
        Precondition::TableAbsent { table } => Ok(!schema::object_exists(conn, table)
            .map_err(|e| StorageError::SqliteError {
                message: e.to_string(),
            })?),
        Precondition::ColumnExists { table, column } => column_exists(conn, table, column),
        Precondition::ColumnAbsent { table, column } => {
            Ok(table_exists(conn, table)? && !column_exists(conn, table, column)?)
        }
        Precondition::RowExists { table, identity } => {
            Ok(rows::count_matching(conn, table, &identity_pairs(identity))? == 1)
        }
        Precondition::RowAbsent { table, identity } => {
            Ok(rows::count_matching(conn, table, &identity_pairs(identity))? == 0)
        }
        Precondition::RowMatches {
            table,
            identity,
            values,
        } => {
            if rows::count_matching(conn, table, &identity_pairs(identity))? != 1 {
                return Ok(false);
            }
            let columns: Vec<String> = values.iter().map(|(c, _)| c.clone()).collect();
            let expected: Vec<CellValue> = values.iter().map(|(_, v)| v.clone()).collect();
            let actual = rows::fetch_row(conn, table, &columns, &identity_pairs(identity))?;
            Ok(actual.as_ref() == Some(&expected))
        }
        Precondition::ColumnHolds {
            table,
            column,
            value,
        } => {
            let n: i64 = conn.query_row(
                &format!(
                    "SELECT count(*) FROM {} WHERE NOT ({} IS ?1)",
                    quote_ident(table),
                    quote_ident(column)
                ),
                params![value],
                |r| r.get(0),
            )?;
            Ok(n == 0)
        }
        Precondition::RowCount { table, count } => Ok(rows::count_rows(conn, table)? == *count),
        Precondition::TableContent { table, fingerprint } => {
            let schema = schema::load_table(conn, table).map_err(|e| StorageError::SqliteError {
                message: e.to_string(),
            })?;
            Ok(rows::table_fingerprint(conn, &schema)? == *fingerprint)
        }
        Precondition::TableShape {
            table,
            columns,
            index_sql,
            trigger_sql,
        } => {
            let schema = schema::load_table(conn, table).map_err(|e| StorageError::SqliteError {
                message: e.to_string(),
            })?;
            let live_columns: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
            let live_indexes: Vec<String> = schema.indexes.iter().filter_map(|i| i.sql.clone()).collect();
            let live_triggers: Vec<String> = schema.triggers.iter().map(|t| t.sql.clone()).collect();
            Ok(live_columns == *columns
                && same_ddl(live_indexes, index_sql)
                && same_ddl(live_triggers, trigger_sql))
        }
    }
}

/// Order-insensitive DDL comparison.
fn same_ddl(mut live: Vec<String>, expected: &[String]) -> bool {
    let mut expected = expected.to_vec();
    live.sort();
    expected.sort();
    live == expected
}

// ---- statements ----

fn execute(
    conn: &Connection,
    statement: &Statement,
    control: &WorkControl,
    batch_size: usize,
) -> Result<(), Abort> {
    match statement {
        Statement::Execute {
            sql,
            params,
            expected_changes,
        } => {
            let changes = conn.execute(sql, params_from_iter(params.iter()))?;
            if let Some(expected) = expected_changes {
                if changes != *expected {
                    return Err(Abort::Precondition(format!(
                        "expected {expected} changed rows, got {changes}"
                    )));
                }
            }
            Ok(())
        }
        Statement::InsertRows {
            table,
            columns,
            rows,
        } => insert_rows(conn, table, columns, rows, control, batch_size),
        Statement::RebuildTable {
            table,
            create_sql,
            columns,
            index_sql,
            trigger_sql,
        } => rebuild_table(
            conn,
            &Rebuild {
                table,
                create_sql,
                columns,
                index_sql,
                trigger_sql,
            },
            control,
            batch_size,
        ),
    }
}

fn insert_rows(
    conn: &Connection,
    table: &str,
    columns: &[String],
    rows: &[Vec<CellValue>],
    control: &WorkControl,
    batch_size: usize,
) -> Result<(), Abort> {
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        ident_list(columns),
        placeholders(1, columns.len())
    );
    let operation = format!("restore rows into {table}");
    let total = rows.len() as u64;
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut done = 0u64;
    for batch in rows.chunks(batch_size) {
        if control.is_cancelled() {
            tracing::info!(table, done, total, "row restore cancelled");
            return Err(Abort::Cancelled);
        }
        for row in batch {
            stmt.execute(params_from_iter(row.iter()))?;
        }
        done += batch.len() as u64;
        control.report(&operation, done, Some(total));
    }
    tracing::debug!(table, rows = total, "rows restored");
    Ok(())
}

struct Rebuild<'a> {
    table: &'a str,
    create_sql: &'a str,
    columns: &'a [String],
    index_sql: &'a [String],
    trigger_sql: &'a [String],
}

/// Recreate a table from its DDL, keeping `columns` of every row.
///
/// Rows are staged in a TEMP table with positional columns `c0..cN`, so a
/// captured `rowid` column never collides with the staging table's own rowid.
/// Every step runs inside the caller's transaction; on cancel or failure the
/// rollback also removes the staging table.
fn rebuild_table(
    conn: &Connection,
    rebuild: &Rebuild<'_>,
    control: &WorkControl,
    batch_size: usize,
) -> Result<(), Abort> {
    let table = rebuild.table;
    let source = schema::load_table(conn, table)?;
    let total = rows::count_rows(conn, table)?;
    let operation = format!("rebuild {table}");
    let sequence = schema::sequence_value(conn, table)?;
    let autoincrement = rebuild.create_sql.to_ascii_uppercase().contains("AUTOINCREMENT");

    let stage_columns: Vec<String> = (0..rebuild.columns.len()).map(|i| format!("c{i}")).collect();
    let stage = format!("temp.{}", quote_ident(STAGING_TABLE));
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {stage}; CREATE TEMP TABLE {} ({});",
        quote_ident(STAGING_TABLE),
        ident_list(&stage_columns)
    ))?;

    // Phase 1: copy out, in stable order.
    let copy_out = format!(
        "INSERT INTO {stage} ({}) SELECT {} FROM main.{} {} LIMIT ?1 OFFSET ?2",
        ident_list(&stage_columns),
        ident_list(rebuild.columns),
        quote_ident(table),
        rows::order_clause(&source)
    );
    let batch = i64::try_from(batch_size).unwrap_or(i64::MAX);
    let mut copied = 0u64;
    loop {
        if control.is_cancelled() {
            return Err(Abort::Cancelled);
        }
        let offset = i64::try_from(copied).unwrap_or(i64::MAX);
        let n = conn.execute(&copy_out, params![batch, offset])? as u64;
        copied += n;
        control.report(&operation, copied, Some(total * 2));
        if n < batch_size as u64 {
            break;
        }
    }
    if copied != total {
        return Err(Abort::Failed(format!(
            "staged {copied} of {total} rows of {table}"
        )));
    }

    if control.is_cancelled() {
        return Err(Abort::Cancelled);
    }
    conn.execute_batch(&format!("DROP TABLE main.{};", quote_ident(table)))?;
    conn.execute_batch(rebuild.create_sql)?;

    // Phase 2: copy back by staging rowid range. Staging rowids are 1..=total.
    let copy_back = format!(
        "INSERT INTO main.{} ({}) SELECT {} FROM {stage} WHERE rowid > ?1 AND rowid <= ?2 ORDER BY rowid",
        quote_ident(table),
        ident_list(rebuild.columns),
        ident_list(&stage_columns)
    );
    let mut restored = 0u64;
    while restored < total {
        if control.is_cancelled() {
            return Err(Abort::Cancelled);
        }
        let upper = (restored + batch_size as u64).min(total);
        let lo = i64::try_from(restored).unwrap_or(i64::MAX);
        let hi = i64::try_from(upper).unwrap_or(i64::MAX);
        conn.execute(&copy_back, params![lo, hi])?;
        restored = upper;
        control.report(&operation, total + restored, Some(total * 2));
    }

    conn.execute_batch(&format!("DROP TABLE {stage};"))?;
    for sql in rebuild.index_sql.iter().chain(rebuild.trigger_sql) {
        conn.execute_batch(sql)?;
    }
    if autoincrement {
        conn.execute("DELETE FROM sqlite_sequence WHERE name = ?1", params![table])?;
        if let Some(seq) = sequence {
            conn.execute(
                "INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)",
                params![table, seq],
            )?;
        }
    }
    tracing::debug!(table, rows = total, "table rebuilt");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablesafe_core::traits::CancellationToken;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);
             INSERT INTO t VALUES (1, 'a'), (2, 'b');",
        )
        .unwrap();
        conn
    }

    fn values(conn: &Connection) -> Vec<String> {
        let mut stmt = conn.prepare("SELECT v FROM t ORDER BY id").unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn failed_precondition_changes_nothing() {
        let conn = conn();
        let action = Action::new(
            vec![Precondition::RowCount {
                table: "t".into(),
                count: 5,
            }],
            vec![Statement::execute("DELETE FROM t", vec![])],
        );
        let result = apply_action(&conn, &action, &WorkControl::default(), 500).unwrap();
        assert!(matches!(
            result,
            ApplyResult::RolledBack(RollbackReason::PreconditionFailed(_))
        ));
        assert_eq!(values(&conn), ["a", "b"]);
    }

    #[test]
    fn table_shape_pins_columns_and_indexes() {
        let conn = conn();
        let shape = |columns: &[&str], index_sql: Vec<String>| Precondition::TableShape {
            table: "t".into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            index_sql,
            trigger_sql: vec![],
        };
        assert!(check(&conn, &shape(&["id", "v"], vec![])).unwrap());
        assert!(!check(&conn, &shape(&["v", "id"], vec![])).unwrap());

        conn.execute_batch("CREATE INDEX t_v ON t(v)").unwrap();
        assert!(!check(&conn, &shape(&["id", "v"], vec![])).unwrap());
        assert!(check(&conn, &shape(&["id", "v"], vec!["CREATE INDEX t_v ON t(v)".into()])).unwrap());

        conn.execute_batch("ALTER TABLE t ADD COLUMN w").unwrap();
        let action = Action::new(
            vec![shape(&["id", "v"], vec!["CREATE INDEX t_v ON t(v)".into()])],
            vec![Statement::execute("DELETE FROM t", vec![])],
        );
        let result = apply_action(&conn, &action, &WorkControl::default(), 500).unwrap();
        assert!(matches!(
            result,
            ApplyResult::RolledBack(RollbackReason::PreconditionFailed(_))
        ));
        assert_eq!(values(&conn), ["a", "b"]);
    }

    #[test]
    fn change_count_mismatch_rolls_back_earlier_statements() {
        let conn = conn();
        let action = Action::new(
            vec![],
            vec![
                Statement::execute("UPDATE t SET v = 'z' WHERE id = 1", vec![]),
                Statement::execute_expecting("DELETE FROM t WHERE id = 9", vec![], 1),
            ],
        );
        let result = apply_action(&conn, &action, &WorkControl::default(), 500).unwrap();
        assert!(!result.is_committed());
        assert_eq!(values(&conn), ["a", "b"]);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn batched_insert_reports_progress() {
        let conn = conn();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let control = WorkControl::default().with_observer(std::sync::Arc::new(
            move |p: &tablesafe_core::Progress| sink.lock().unwrap().push(p.done),
        ));
        let rows: Vec<Vec<CellValue>> = (10..15)
            .map(|i| vec![CellValue::Integer(i), CellValue::from("x")])
            .collect();
        let action = Action::new(
            vec![],
            vec![Statement::InsertRows {
                table: "t".into(),
                columns: vec!["id".into(), "v".into()],
                rows,
            }],
        );
        assert!(apply_action(&conn, &action, &control, 2).unwrap().is_committed());
        assert_eq!(*seen.lock().unwrap(), [2, 4, 5]);
        assert_eq!(values(&conn).len(), 7);
    }

    #[test]
    fn rebuild_drops_a_column_and_keeps_rows() {
        let conn = conn();
        conn.execute_batch(
            "CREATE INDEX t_v ON t(v);
             ALTER TABLE t ADD COLUMN extra INTEGER;",
        )
        .unwrap();
        let action = Action::new(
            vec![],
            vec![Statement::RebuildTable {
                table: "t".into(),
                create_sql: "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)".into(),
                columns: vec!["id".into(), "v".into()],
                index_sql: vec!["CREATE INDEX t_v ON t(v)".into()],
                trigger_sql: vec![],
            }],
        );
        assert!(apply_action(&conn, &action, &WorkControl::default(), 1).unwrap().is_committed());
        assert!(!column_exists(&conn, "t", "extra").unwrap());
        assert_eq!(values(&conn), ["a", "b"]);
        let staged: i64 = conn
            .query_row("SELECT count(*) FROM sqlite_temp_master", [], |r| r.get(0))
            .unwrap();
        assert_eq!(staged, 0);
    }

    #[test]
    fn cancelled_rebuild_leaves_table_untouched() {
        let conn = conn();
        conn.execute_batch("ALTER TABLE t ADD COLUMN extra INTEGER;").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let action = Action::new(
            vec![],
            vec![Statement::RebuildTable {
                table: "t".into(),
                create_sql: "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)".into(),
                columns: vec!["id".into(), "v".into()],
                index_sql: vec![],
                trigger_sql: vec![],
            }],
        );
        let result = apply_action(&conn, &action, &WorkControl::new(token), 1).unwrap();
        assert_eq!(result, ApplyResult::RolledBack(RollbackReason::Cancelled));
        assert!(column_exists(&conn, "t", "extra").unwrap());
    }
}
