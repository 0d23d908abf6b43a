//! Reversible commands: a forward action, its inverse and metadata.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::RowIdentity;
use super::mutation::MutationKind;
use super::outcome::ValidationResult;
use super::value::CellValue;
use crate::errors::EngineError;

/// Session-unique, monotonic command id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Inverse,
}

/// Database state that must hold immediately before an action runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Precondition {
    TableExists { table: String },
    TableAbsent { table: String },
    ColumnExists { table: String, column: String },
    ColumnAbsent { table: String, column: String },
    RowExists { table: String, identity: RowIdentity },
    RowAbsent { table: String, identity: RowIdentity },
    /// The identified row exists and holds exactly these values.
    RowMatches {
        table: String,
        identity: RowIdentity,
        values: Vec<(String, CellValue)>,
    },
    /// Every row holds `value` in `column`.
    ColumnHolds {
        table: String,
        column: String,
        value: CellValue,
    },
    RowCount { table: String, count: u64 },
    /// xxh3 fingerprint over the table's ordered rows.
    TableContent { table: String, fingerprint: u64 },
    /// Exact ordered column names plus index and trigger DDL. Pins what a
    /// rebuild from captured DDL would otherwise discard.
    TableShape {
        table: String,
        columns: Vec<String>,
        index_sql: Vec<String>,
        trigger_sql: Vec<String>,
    },
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableExists { table } => write!(f, "table {table} exists"),
            Self::TableAbsent { table } => write!(f, "table {table} is absent"),
            Self::ColumnExists { table, column } => write!(f, "column {table}.{column} exists"),
            Self::ColumnAbsent { table, column } => write!(f, "column {table}.{column} is absent"),
            Self::RowExists { table, identity } => write!(f, "row {table}({identity}) exists"),
            Self::RowAbsent { table, identity } => write!(f, "row {table}({identity}) is absent"),
            Self::RowMatches { table, identity, .. } => {
                write!(f, "row {table}({identity}) holds the expected values")
            }
            Self::ColumnHolds { table, column, value } => {
                write!(f, "every {table}.{column} is {value}")
            }
            Self::RowCount { table, count } => write!(f, "{table} has {count} rows"),
            Self::TableContent { table, .. } => write!(f, "{table} content is unchanged"),
            Self::TableShape { table, columns, .. } => {
                write!(f, "{table} has exactly the columns {}", columns.join(", "))
            }
        }
    }
}

/// One step of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "statement", rename_all = "snake_case")]
pub enum Statement {
    /// Parameterized SQL. A differing change count counts as drift.
    Execute {
        sql: String,
        params: Vec<CellValue>,
        expected_changes: Option<usize>,
    },
    /// Batched insert of captured rows.
    InsertRows {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    },
    /// Recreate `table` from `create_sql`, keeping the rows of `columns`.
    /// Runs through a staging table in batches.
    RebuildTable {
        table: String,
        create_sql: String,
        columns: Vec<String>,
        index_sql: Vec<String>,
        trigger_sql: Vec<String>,
    },
}

impl Statement {
    pub fn execute(sql: impl Into<String>, params: Vec<CellValue>) -> Self {
        Self::Execute {
            sql: sql.into(),
            params,
            expected_changes: None,
        }
    }

    pub fn execute_expecting(sql: impl Into<String>, params: Vec<CellValue>, changes: usize) -> Self {
        Self::Execute {
            sql: sql.into(),
            params,
            expected_changes: Some(changes),
        }
    }
}

/// Preconditions followed by statements; applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub preconditions: Vec<Precondition>,
    pub statements: Vec<Statement>,
}

impl Action {
    pub fn new(preconditions: Vec<Precondition>, statements: Vec<Statement>) -> Self {
        Self {
            preconditions,
            statements,
        }
    }
}

/// Validated forward/inverse pair, ready to become a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationPlan {
    pub kind: MutationKind,
    pub table: String,
    pub forward: Action,
    pub inverse: Action,
    pub description: String,
}

/// A reversible mutation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    id: CommandId,
    kind: MutationKind,
    table: String,
    forward: Action,
    inverse: Action,
    created_at: DateTime<Utc>,
    description: String,
}

impl Command {
    /// Build a command from an allowed validation result.
    pub fn build(
        id: CommandId,
        kind: MutationKind,
        validation: ValidationResult,
    ) -> Result<Self, EngineError> {
        let plan = match validation {
            ValidationResult::Allow(plan) => *plan,
            ValidationResult::Block(reason) => {
                return Err(EngineError::Construction {
                    message: format!("cannot build {kind} from a blocked validation: {reason}"),
                })
            }
        };
        if plan.kind != kind {
            return Err(EngineError::Construction {
                message: format!("plan is for {} but {kind} was requested", plan.kind),
            });
        }
        if plan.forward.statements.is_empty() || plan.inverse.statements.is_empty() {
            return Err(EngineError::Construction {
                message: format!("{kind} plan is missing statements"),
            });
        }
        Ok(Self {
            id,
            kind,
            table: plan.table,
            forward: plan.forward,
            inverse: plan.inverse,
            created_at: Utc::now(),
            description: plan.description,
        })
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn forward(&self) -> &Action {
        &self.forward
    }

    pub fn inverse(&self) -> &Action {
        &self.inverse
    }

    pub fn action(&self, direction: Direction) -> &Action {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Inverse => &self.inverse,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::outcome::BlockReason;

    fn plan(kind: MutationKind) -> MutationPlan {
        MutationPlan {
            kind,
            table: "t".into(),
            forward: Action::new(vec![], vec![Statement::execute("DELETE FROM t", vec![])]),
            inverse: Action::new(vec![], vec![Statement::execute("SELECT 1", vec![])]),
            description: "test".into(),
        }
    }

    #[test]
    fn blocked_validation_is_a_construction_error() {
        let err = Command::build(
            CommandId(1),
            MutationKind::RowDelete,
            ValidationResult::Block(BlockReason::NoPrimaryKey { table: "logs".into() }),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Construction { .. }));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let result = Command::build(
            CommandId(1),
            MutationKind::TableDrop,
            ValidationResult::Allow(Box::new(plan(MutationKind::RowDelete))),
        );
        assert!(result.is_err());
    }

    #[test]
    fn builds_from_allowed_plan() {
        let cmd = Command::build(
            CommandId(3),
            MutationKind::RowDelete,
            ValidationResult::Allow(Box::new(plan(MutationKind::RowDelete))),
        )
        .unwrap();
        assert_eq!(cmd.id(), CommandId(3));
        assert_eq!(cmd.action(Direction::Inverse).statements.len(), 1);
        assert_eq!(cmd.description(), "test");
    }
}
