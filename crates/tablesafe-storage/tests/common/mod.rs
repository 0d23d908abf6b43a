//! Shared fixtures for the storage integration tests.

#![allow(dead_code)]

use tablesafe_core::{CellValue, TableSafeConfig};
use tablesafe_storage::EditorEngine;
use tempfile::TempDir;

/// File-backed engine (WAL, separate reader) in a fresh temp dir.
pub fn temp_engine() -> (TempDir, EditorEngine) {
    temp_engine_with(TableSafeConfig::default())
}

pub fn temp_engine_with(config: TableSafeConfig) -> (TempDir, EditorEngine) {
    let dir = TempDir::new().unwrap();
    let engine = EditorEngine::open(&dir.path().join("test.db"), config).unwrap();
    (dir, engine)
}

pub fn seed(engine: &EditorEngine, sql: &str) {
    engine.execute_raw(sql).unwrap();
}

fn query(engine: &EditorEngine, sql: &str) -> Vec<Vec<CellValue>> {
    engine.execute_raw(sql).unwrap().rows
}

fn text(value: &CellValue) -> String {
    match value {
        CellValue::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Observable state without DDL text: table and column shapes, index and
/// trigger names, every row with its rowid, and `sqlite_sequence`.
pub fn data_state(engine: &EditorEngine) -> Vec<(String, Vec<Vec<CellValue>>)> {
    let mut state = Vec::new();
    let objects = query(
        engine,
        "SELECT type, name, tbl_name FROM sqlite_master WHERE type IN ('index', 'trigger') ORDER BY name",
    );
    state.push(("objects".to_string(), objects));

    let tables = query(
        engine,
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name",
    );
    for row in tables {
        let name = text(&row[0]);
        let columns = query(
            engine,
            &format!(
                "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_xinfo('{name}') ORDER BY cid"
            ),
        );
        state.push((format!("{name}:columns"), columns));
        let rows = query(engine, &format!("SELECT _rowid_, * FROM \"{name}\" ORDER BY _rowid_"));
        state.push((format!("{name}:rows"), rows));
    }

    let has_sequence = !query(
        engine,
        "SELECT 1 FROM sqlite_master WHERE name = 'sqlite_sequence'",
    )
    .is_empty();
    if has_sequence {
        state.push((
            "sqlite_sequence".to_string(),
            query(engine, "SELECT name, seq FROM sqlite_sequence ORDER BY name"),
        ));
    }
    state
}

/// `data_state` plus the exact DDL text of every object.
pub fn full_state(engine: &EditorEngine) -> Vec<(String, Vec<Vec<CellValue>>)> {
    let mut state = data_state(engine);
    state.push((
        "ddl".to_string(),
        query(
            engine,
            "SELECT type, name, sql FROM sqlite_master WHERE name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY type, name",
        ),
    ));
    state
}
