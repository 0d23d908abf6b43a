//! Property: any sequence of validated mutations undoes back to the start
//! and redoes back to the end.

use proptest::prelude::*;
use tablesafe_core::{CellValue, ColumnDef, MutationRequest, RowSelector, TableSafeConfig};
use tablesafe_storage::EditorEngine;

#[derive(Debug, Clone)]
enum Op {
    Edit { id: i64, value: CellValue },
    Insert { value: CellValue },
    Delete { id: i64 },
    AddColumn { n: u8 },
    DropColumn { column: &'static str },
    DropTable,
}

fn value() -> impl Strategy<Value = CellValue> {
    prop_oneof![
        Just(CellValue::Null),
        any::<i64>().prop_map(CellValue::Integer),
        prop::num::f64::NORMAL.prop_map(CellValue::Real),
        "[a-z ]{0,12}".prop_map(CellValue::Text),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(CellValue::Blob),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1i64..6, value()).prop_map(|(id, value)| Op::Edit { id, value }),
        2 => value().prop_map(|value| Op::Insert { value }),
        2 => (1i64..6).prop_map(|id| Op::Delete { id }),
        1 => (0u8..3).prop_map(|n| Op::AddColumn { n }),
        1 => prop::sample::select(vec!["v", "c0", "c1", "c2"]).prop_map(|column| Op::DropColumn { column }),
        1 => Just(Op::DropTable),
    ]
}

fn request(op: &Op) -> MutationRequest {
    match op {
        Op::Edit { id, value } => MutationRequest::CellEdit {
            table: "t".into(),
            row: RowSelector::key("id", *id),
            column: "v".into(),
            value: value.clone(),
        },
        Op::Insert { value } => MutationRequest::RowInsert {
            table: "t".into(),
            values: vec![("v".into(), value.clone())],
        },
        Op::Delete { id } => MutationRequest::RowDelete {
            table: "t".into(),
            row: RowSelector::key("id", *id),
        },
        Op::AddColumn { n } => MutationRequest::ColumnAdd {
            table: "t".into(),
            column: ColumnDef::new(format!("c{n}"), "TEXT"),
        },
        Op::DropColumn { column } => MutationRequest::ColumnDrop {
            table: "t".into(),
            column: column.to_string(),
        },
        Op::DropTable => MutationRequest::TableDrop { table: "t".into() },
    }
}

/// Always commits, so every run records at least one command of each kind.
fn tail() -> Vec<MutationRequest> {
    vec![
        MutationRequest::CellEdit {
            table: "h".into(),
            row: RowSelector::key("id", 1),
            column: "a".into(),
            value: CellValue::from("edited"),
        },
        MutationRequest::RowInsert {
            table: "h".into(),
            values: vec![("a".into(), CellValue::Integer(7))],
        },
        MutationRequest::RowDelete {
            table: "h".into(),
            row: RowSelector::key("id", 1),
        },
        MutationRequest::ColumnDrop {
            table: "h".into(),
            column: "b".into(),
        },
        MutationRequest::TableDrop { table: "h".into() },
    ]
}

type TableState = Option<(Vec<String>, Vec<Vec<CellValue>>)>;

/// `None` for a table that is currently dropped.
fn state(engine: &EditorEngine) -> (TableState, TableState) {
    let read = |table: &str| engine.read_all_rows(table).ok().map(|rows| (rows.columns, rows.rows));
    (read("t"), read("h"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn undo_all_then_redo_all(ops in prop::collection::vec(op(), 1..12)) {
        let engine = EditorEngine::open_in_memory(TableSafeConfig::default()).unwrap();
        // Untyped column: BLOB affinity keeps every value as given.
        engine
            .execute_raw(
                "CREATE TABLE t (id INTEGER PRIMARY KEY, v);
                 INSERT INTO t VALUES (1, 'a'), (2, 2), (3, NULL);
                 CREATE TABLE h (id INTEGER PRIMARY KEY, a, b);
                 INSERT INTO h VALUES (1, 'x', 'y');",
            )
            .unwrap();
        let start = state(&engine);
        prop_assert_eq!(start.0.as_ref().map(|(_, rows)| rows.len()), Some(3));
        prop_assert_eq!(start.1.as_ref().map(|(_, rows)| rows.len()), Some(1));

        let mut applied = 0;
        for op in &ops {
            if engine.request_mutation(request(op)).unwrap().is_committed() {
                applied += 1;
            }
        }
        for request in tail() {
            let outcome = engine.request_mutation(request.clone()).unwrap();
            prop_assert!(outcome.is_committed(), "{:?}: {:?}", request, outcome);
            applied += 1;
        }
        let end = state(&engine);
        prop_assert_eq!(&end.1, &None);

        for _ in 0..applied {
            prop_assert!(engine.undo().unwrap().is_committed());
        }
        prop_assert!(!engine.can_undo());
        prop_assert_eq!(state(&engine), start);

        for _ in 0..applied {
            prop_assert!(engine.redo().unwrap().is_committed());
        }
        prop_assert_eq!(state(&engine), end);
    }
}
