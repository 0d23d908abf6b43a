//! Row addressing: what the caller selected, and the key it resolved to.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::CellValue;

/// How a caller points at a row. Must resolve to exactly one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSelector {
    /// Primary-key column values, in any order.
    PrimaryKey(Vec<(String, CellValue)>),
    /// Column/value equality filter, e.g. the grid's selected row contents.
    Filter(Vec<(String, CellValue)>),
}

impl RowSelector {
    /// Selector for a single-column key.
    pub fn key(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::PrimaryKey(vec![(column.into(), value.into())])
    }

    pub fn filter(pairs: impl IntoIterator<Item = (String, CellValue)>) -> Self {
        Self::Filter(pairs.into_iter().collect())
    }

    pub fn pairs(&self) -> &[(String, CellValue)] {
        match self {
            Self::PrimaryKey(p) | Self::Filter(p) => p,
        }
    }
}

/// Primary-key columns and values that identify exactly one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIdentity {
    pub columns: Vec<String>,
    pub values: Vec<CellValue>,
}

impl RowIdentity {
    pub fn new(columns: Vec<String>, values: Vec<CellValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn single(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(vec![column.into()], vec![value.into()])
    }

    /// Value of one key column, if present.
    pub fn value_of(&self, column: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|i| &self.values[i])
    }
}

impl fmt::Display for RowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (c, v)) in self.columns.iter().zip(&self.values).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{c}={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_key_pairs() {
        let id = RowIdentity::new(
            vec!["tenant".into(), "id".into()],
            vec![CellValue::from("acme"), CellValue::Integer(7)],
        );
        assert_eq!(id.to_string(), "tenant=\"acme\", id=7");
        assert_eq!(id.value_of("ID"), Some(&CellValue::Integer(7)));
    }
}
