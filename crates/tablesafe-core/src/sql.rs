//! SQL text helpers: identifier quoting and literal rendering.
//!
//! Identifiers are always double-quoted; values travel as bound parameters
//! except where SQLite requires a literal (column `DEFAULT` clauses).

use crate::types::value::CellValue;

/// Quote an identifier for SQLite: `users` → `"users"`, `a"b` → `"a""b"`.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Comma-separated list of quoted identifiers.
pub fn ident_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `?1, ?2, ...` placeholders starting at `first`.
pub fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"a" IS ?first AND "b" IS ?first+1 ...` for the given columns.
///
/// `IS` rather than `=` so NULL key values still match.
pub fn where_is<S: AsRef<str>>(columns: &[S], first: usize) -> String {
    if columns.is_empty() {
        return "1".to_string();
    }
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} IS ?{}", quote_ident(c.as_ref()), first + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Render a value as a SQL literal. Only used in DDL `DEFAULT` clauses.
pub fn literal(value: &CellValue) -> String {
    match value {
        CellValue::Null => "NULL".to_string(),
        CellValue::Integer(i) => i.to_string(),
        CellValue::Real(r) => {
            // Debug formatting keeps a decimal point, so the literal stays REAL.
            format!("{r:?}")
        }
        CellValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        CellValue::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
            format!("X'{hex}'")
        }
    }
}

/// True for names SQLite reserves for its own catalog tables.
pub fn is_reserved_name(name: &str) -> bool {
    name.get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("sqlite_"))
}

/// Words that would turn a "type name" into a column constraint.
const CONSTRAINT_WORDS: [&str; 12] = [
    "PRIMARY", "NOT", "NULL", "UNIQUE", "CHECK", "DEFAULT", "COLLATE", "REFERENCES",
    "GENERATED", "AS", "CONSTRAINT", "AUTOINCREMENT",
];

/// Accepts SQLite type names like `TEXT`, `VARCHAR(20)`, `DECIMAL(10, 2)`,
/// `UNSIGNED BIG INT` or an empty string. Anything that could smuggle in
/// constraints or further SQL is rejected.
pub fn is_valid_type_name(declared: &str) -> bool {
    let (words, args) = match declared.split_once('(') {
        Some((words, rest)) => match rest.strip_suffix(')') {
            Some(args) => (words, Some(args)),
            None => return false,
        },
        None => (declared, None),
    };
    let words_ok = words.split_whitespace().all(|w| {
        w.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !CONSTRAINT_WORDS.iter().any(|k| k.eq_ignore_ascii_case(w))
    });
    let args_ok = args.map_or(true, |a| {
        !a.trim().is_empty()
            && a.chars()
                .all(|c| c.is_ascii_digit() || matches!(c, ' ' | ',' | '+' | '-' | '.'))
    });
    words_ok && args_ok && (args.is_none() || !words.trim().is_empty())
}

/// Type names a STRICT table accepts.
pub fn is_strict_type_name(declared: &str) -> bool {
    ["INT", "INTEGER", "REAL", "TEXT", "BLOB", "ANY"]
        .iter()
        .any(|t| t.eq_ignore_ascii_case(declared.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_embedded_double_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn builds_where_clause_with_offset() {
        assert_eq!(
            where_is(&["id", "tenant"], 2),
            "\"id\" IS ?2 AND \"tenant\" IS ?3"
        );
        assert_eq!(where_is::<&str>(&[], 1), "1");
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
    }

    #[test]
    fn renders_literals() {
        assert_eq!(literal(&CellValue::Null), "NULL");
        assert_eq!(literal(&CellValue::Integer(-4)), "-4");
        assert_eq!(literal(&CellValue::Real(1.0)), "1.0");
        assert_eq!(literal(&CellValue::Text("O'Neil".into())), "'O''Neil'");
        assert_eq!(literal(&CellValue::Blob(vec![0xAB, 0x01])), "X'AB01'");
    }

    #[test]
    fn validates_type_names() {
        for ok in ["", "TEXT", "varchar(20)", "DECIMAL(10, 2)", "UNSIGNED BIG INT"] {
            assert!(is_valid_type_name(ok), "{ok}");
        }
        for bad in ["TEXT NOT NULL", "INT PRIMARY KEY", "TEXT); DROP TABLE t; --", "(5)", "CHAR(x)"] {
            assert!(!is_valid_type_name(bad), "{bad}");
        }
        assert!(is_strict_type_name("int"));
        assert!(!is_strict_type_name("VARCHAR"));
    }

    #[test]
    fn detects_reserved_names() {
        assert!(is_reserved_name("sqlite_sequence"));
        assert!(is_reserved_name("SQLITE_stat1"));
        assert!(!is_reserved_name("sqlite"));
        assert!(!is_reserved_name("users"));
    }
}
