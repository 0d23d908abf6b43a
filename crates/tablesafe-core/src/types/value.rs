//! Cell values and SQLite column affinity.
//!
//! `CellValue` mirrors SQLite's five storage classes one-to-one so captured
//! values can be written back bit-identically.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};

/// Largest integer magnitude an f64 represents exactly.
const MAX_EXACT_F64_INT: u64 = 1 << 53;

/// One SQLite value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    /// Storage class name as SQLite's `typeof()` reports it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the value as stored in a column of `affinity` when that
    /// needs no implicit coercion, or `None` when SQLite would have to
    /// convert it (or could not hold it exactly).
    ///
    /// Exact conversions are made explicit here: `3.0` into an INTEGER
    /// column becomes `Integer(3)`, `7` into a REAL column becomes `Real(7.0)`.
    pub fn representable_as(&self, affinity: Affinity) -> Option<CellValue> {
        match (self, affinity) {
            (Self::Null, _) => Some(Self::Null),
            (Self::Real(r), _) if !r.is_finite() => None,
            (_, Affinity::Blob) => Some(self.clone()),

            (Self::Integer(_), Affinity::Integer | Affinity::Numeric) => Some(self.clone()),
            (Self::Real(r), Affinity::Integer | Affinity::Numeric) => match exact_integer(*r) {
                Some(i) => Some(Self::Integer(i)),
                None if affinity == Affinity::Numeric => Some(self.clone()),
                None => None,
            },

            (Self::Real(_), Affinity::Real) => Some(self.clone()),
            (Self::Integer(i), Affinity::Real) if i.unsigned_abs() <= MAX_EXACT_F64_INT => {
                Some(Self::Real(*i as f64))
            }

            (Self::Text(_), Affinity::Text) => Some(self.clone()),
            // NUMERIC keeps text that is not a number literal as TEXT.
            (Self::Text(s), Affinity::Numeric) if !looks_numeric(s) => Some(self.clone()),

            _ => None,
        }
    }

    /// Parse grid input for a column of the given affinity.
    ///
    /// `NULL` and `<NULL>` (any case) mean SQL NULL. INTEGER and REAL
    /// require well-formed numbers. NUMERIC takes a number when the input
    /// is one and keeps anything else (dates, flags) as text.
    pub fn parse_input(input: &str, affinity: Affinity) -> Result<CellValue, InputError> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("null") || trimmed.eq_ignore_ascii_case("<null>") {
            return Ok(Self::Null);
        }
        let invalid = || InputError {
            input: input.to_string(),
            affinity,
        };
        match affinity {
            Affinity::Integer => trimmed.parse::<i64>().map(Self::Integer).map_err(|_| invalid()),
            Affinity::Real => match trimmed.parse::<f64>() {
                Ok(r) if r.is_finite() => Ok(Self::Real(r)),
                _ => Err(invalid()),
            },
            Affinity::Numeric => {
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Ok(Self::Integer(i));
                }
                match trimmed.parse::<f64>() {
                    Ok(r) if r.is_finite() => Ok(Self::Real(r)),
                    Ok(_) => Err(invalid()),
                    Err(_) => Ok(Self::Text(input.to_string())),
                }
            }
            Affinity::Text | Affinity::Blob => Ok(Self::Text(input.to_string())),
        }
    }
}

/// True when SQLite's NUMERIC affinity might turn `text` into a number.
///
/// Errs towards true: anything Rust parses as a float counts, including
/// `inf` and `nan`, which SQLite would leave alone.
fn looks_numeric(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok()
}

fn exact_integer(r: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if r.fract() == 0.0 && r >= i64::MIN as f64 && r < i64::MAX as f64 {
        Some(r as i64)
    } else {
        None
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r:?}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Self::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl FromSql for CellValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(r) => Self::Real(r),
            ValueRef::Text(t) => match std::str::from_utf8(t) {
                Ok(s) => Self::Text(s.to_owned()),
                Err(_) => return Err(FromSqlError::Other(Box::new(NonUtf8Text { len: t.len() }))),
            },
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        })
    }
}

impl From<Value> for CellValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Integer(i) => Self::Integer(i),
            Value::Real(r) => Self::Real(r),
            Value::Text(s) => Self::Text(s),
            Value::Blob(b) => Self::Blob(b),
        }
    }
}

impl From<CellValue> for Value {
    fn from(v: CellValue) -> Self {
        match v {
            CellValue::Null => Value::Null,
            CellValue::Integer(i) => Value::Integer(i),
            CellValue::Real(r) => Value::Real(r),
            CellValue::Text(s) => Value::Text(s),
            CellValue::Blob(b) => Value::Blob(b),
        }
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for CellValue {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for CellValue {
    fn from(r: f64) -> Self {
        Self::Real(r)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Blob(b)
    }
}

/// SQLite column affinity, derived from a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

impl Affinity {
    /// SQLite's affinity rules, applied in order:
    /// INT → INTEGER; CHAR/CLOB/TEXT → TEXT; BLOB or no type → BLOB;
    /// REAL/FLOA/DOUB → REAL; anything else → NUMERIC.
    pub fn from_declared_type(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            Self::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Numeric
        }
    }

    /// Affinity for a column, honouring STRICT tables where `ANY` stores
    /// values unchanged.
    pub fn for_column(declared: &str, strict: bool) -> Self {
        if strict && declared.trim().eq_ignore_ascii_case("any") {
            Self::Blob
        } else {
            Self::from_declared_type(declared)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
            Self::Real => "REAL",
            Self::Numeric => "NUMERIC",
        }
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored TEXT value whose bytes are not UTF-8.
///
/// Reading it as a `String` would change the bytes, so reads fail instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("TEXT value of {len} bytes is not valid UTF-8")]
pub struct NonUtf8Text {
    pub len: usize,
}

/// Grid input that does not parse for the column's affinity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid value for {affinity} column: {input:?}")]
pub struct InputError {
    pub input: String,
    pub affinity: Affinity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_rules_follow_sqlite_order() {
        assert_eq!(Affinity::from_declared_type("INTEGER"), Affinity::Integer);
        assert_eq!(Affinity::from_declared_type("bigint"), Affinity::Integer);
        // "POINT" contains INT, so SQLite treats it as INTEGER too.
        assert_eq!(Affinity::from_declared_type("FLOATING POINT"), Affinity::Integer);
        assert_eq!(Affinity::from_declared_type("VARCHAR(20)"), Affinity::Text);
        assert_eq!(Affinity::from_declared_type(""), Affinity::Blob);
        assert_eq!(Affinity::from_declared_type("DOUBLE PRECISION"), Affinity::Real);
        assert_eq!(Affinity::from_declared_type("DECIMAL(10,2)"), Affinity::Numeric);
        assert_eq!(Affinity::for_column("ANY", true), Affinity::Blob);
        assert_eq!(Affinity::for_column("ANY", false), Affinity::Numeric);
    }

    #[test]
    fn text_into_integer_column_needs_coercion() {
        assert_eq!(CellValue::from("42").representable_as(Affinity::Integer), None);
        assert_eq!(CellValue::Integer(5).representable_as(Affinity::Text), None);
    }

    #[test]
    fn exact_numeric_conversions_are_made_explicit() {
        assert_eq!(
            CellValue::Real(3.0).representable_as(Affinity::Integer),
            Some(CellValue::Integer(3))
        );
        assert_eq!(CellValue::Real(3.5).representable_as(Affinity::Integer), None);
        assert_eq!(
            CellValue::Real(3.5).representable_as(Affinity::Numeric),
            Some(CellValue::Real(3.5))
        );
        assert_eq!(
            CellValue::Integer(7).representable_as(Affinity::Real),
            Some(CellValue::Real(7.0))
        );
        assert_eq!(CellValue::Integer(i64::MAX).representable_as(Affinity::Real), None);
        assert_eq!(CellValue::Real(f64::NAN).representable_as(Affinity::Blob), None);
    }

    #[test]
    fn numeric_affinity_keeps_non_numeric_text() {
        let date = CellValue::from("2024-02-02");
        assert_eq!(date.representable_as(Affinity::Numeric), Some(date.clone()));
        let flag = CellValue::from("true");
        assert_eq!(flag.representable_as(Affinity::Numeric), Some(flag.clone()));
        // SQLite would store these as numbers.
        for numeric in ["42", " 3.5 ", "1e3", "007", "-12"] {
            let value = CellValue::from(numeric);
            assert_eq!(value.representable_as(Affinity::Numeric), None, "{numeric}");
        }
        assert_eq!(CellValue::from("2024-02-02").representable_as(Affinity::Integer), None);
    }

    #[test]
    fn extreme_integers_into_real_do_not_overflow() {
        assert_eq!(CellValue::Integer(i64::MIN).representable_as(Affinity::Real), None);
        assert_eq!(
            CellValue::Integer(-(1 << 53)).representable_as(Affinity::Real),
            Some(CellValue::Real(-9_007_199_254_740_992.0))
        );
    }

    #[test]
    fn non_utf8_text_is_not_read_lossily() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn
            .query_row("SELECT CAST(X'FF41' AS TEXT)", [], |r| r.get::<_, CellValue>(0))
            .unwrap_err();
        let rusqlite::Error::FromSqlConversionFailure(_, _, source) = err else {
            panic!("expected a conversion failure, got {err:?}");
        };
        assert_eq!(source.downcast_ref::<NonUtf8Text>(), Some(&NonUtf8Text { len: 2 }));

        let ok: CellValue = conn.query_row("SELECT 'héllo'", [], |r| r.get(0)).unwrap();
        assert_eq!(ok, CellValue::from("héllo"));
    }

    #[test]
    fn blob_affinity_accepts_everything_unchanged() {
        let v = CellValue::Text("x".into());
        assert_eq!(v.representable_as(Affinity::Blob), Some(v.clone()));
        assert_eq!(
            CellValue::Null.representable_as(Affinity::Integer),
            Some(CellValue::Null)
        );
    }

    #[test]
    fn parses_grid_input() {
        assert_eq!(CellValue::parse_input("<NULL>", Affinity::Text).unwrap(), CellValue::Null);
        assert_eq!(CellValue::parse_input("null", Affinity::Integer).unwrap(), CellValue::Null);
        assert_eq!(
            CellValue::parse_input(" 12 ", Affinity::Integer).unwrap(),
            CellValue::Integer(12)
        );
        assert!(CellValue::parse_input("12.5", Affinity::Integer).is_err());
        assert_eq!(
            CellValue::parse_input("12.5", Affinity::Numeric).unwrap(),
            CellValue::Real(12.5)
        );
        assert!(CellValue::parse_input("inf", Affinity::Real).is_err());
        assert_eq!(
            CellValue::parse_input("2024-02-02", Affinity::Numeric).unwrap(),
            CellValue::from("2024-02-02")
        );
        assert!(CellValue::parse_input("inf", Affinity::Numeric).is_err());
        assert!(CellValue::parse_input("2024-02-02", Affinity::Integer).is_err());
        assert_eq!(
            CellValue::parse_input(" padded ", Affinity::Text).unwrap(),
            CellValue::Text(" padded ".into())
        );
    }
}
