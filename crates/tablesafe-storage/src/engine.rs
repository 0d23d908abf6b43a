//! `EditorEngine`: the session context for one open database.
//!
//! Owns the `DatabaseManager`, the undo/redo history, the single-writer
//! gate and the action log. Every mutation path goes
//! validate -> build -> apply -> record -> log, on the writer connection
//! and under the gate. Snapshot and row reads go through the reader.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crossbeam_channel::Receiver;
use rusqlite::{Batch, Connection};
use tablesafe_core::config::TableSafeConfig;
use tablesafe_core::errors::EngineError;
use tablesafe_core::traits::WorkControl;
use tablesafe_core::types::command::{Command, CommandId, Direction};
use tablesafe_core::types::log::{LogEntry, LogOrigin, LogOutcome};
use tablesafe_core::types::mutation::MutationRequest;
use tablesafe_core::types::outcome::{
    ApplyResult, BlockReason, HistoryOutcome, MutationOutcome, ValidationResult,
};
use tablesafe_core::types::schema::{SchemaSnapshot, TableDefinition};
use tablesafe_core::types::value::CellValue;

use crate::action_log::ActionLog;
use crate::capabilities::Capabilities;
use crate::connection::DatabaseManager;
use crate::executor;
use crate::gate::{GateGuard, SessionGate, SessionState};
use crate::history::HistoryManager;
use crate::maintenance::{self, CopyResult, IntegrityReport};
use crate::queries::rows::{self, RowSet};
use crate::queries::schema;
use crate::validator::{self, ValidationContext};

/// Output of an unchecked SQL console statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSqlResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Rows changed, for a single non-query statement.
    pub changes: Option<u64>,
}

/// What the writer-side half of a mutation request produced.
enum Attempt {
    Blocked(BlockReason),
    Applied(Box<Command>, ApplyResult),
}

pub struct EditorEngine {
    db: DatabaseManager,
    config: TableSafeConfig,
    capabilities: Capabilities,
    history: Mutex<HistoryManager>,
    gate: SessionGate,
    log: ActionLog,
    next_id: AtomicU64,
}

impl EditorEngine {
    /// Open a file database. Fails if another session holds it.
    pub fn open(path: &Path, config: TableSafeConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let db = DatabaseManager::open(path, &config.engine)?;
        Ok(Self::with_db(db, config))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(config: TableSafeConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let db = DatabaseManager::open_in_memory(&config.engine)?;
        Ok(Self::with_db(db, config))
    }

    fn with_db(db: DatabaseManager, config: TableSafeConfig) -> Self {
        let capacity = config.log.effective_subscriber_capacity();
        let log = match &config.log.file {
            Some(path) => ActionLog::with_file(capacity, path),
            None => ActionLog::new(capacity),
        };
        let capabilities = Capabilities::detect();
        tracing::info!(
            sqlite_version = capabilities.sqlite_version,
            native_drop_column = capabilities.native_drop_column,
            "editor session started"
        );
        Self {
            db,
            history: Mutex::new(HistoryManager::new(config.history.max_depth)),
            config,
            capabilities,
            gate: SessionGate::new(),
            log,
            next_id: AtomicU64::new(1),
        }
    }

    /// End the session. History is discarded.
    pub fn close(self) -> Result<(), EngineError> {
        let path = self.db.path().map(|p| p.display().to_string());
        self.db.close()?;
        tracing::info!(path = path.as_deref().unwrap_or(":memory:"), "editor session closed");
        Ok(())
    }

    // A panic inside apply never leaves the stacks half-moved.
    fn history(&self) -> MutexGuard<'_, HistoryManager> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, origin: LogOrigin, description: &str) -> Result<GateGuard<'_>, EngineError> {
        self.gate.try_enter().ok_or_else(|| {
            self.log.append(
                origin,
                None,
                description,
                LogOutcome::Failed,
                Some(EngineError::Busy.to_string()),
            );
            EngineError::Busy
        })
    }

    fn batch_size(&self) -> usize {
        self.config.engine.effective_batch_size()
    }

    // ---- mutations ----

    pub fn request_mutation(&self, request: MutationRequest) -> Result<MutationOutcome, EngineError> {
        self.request_mutation_with(request, &WorkControl::default())
    }

    /// Validate, build, apply and record one mutation.
    pub fn request_mutation_with(
        &self,
        request: MutationRequest,
        control: &WorkControl,
    ) -> Result<MutationOutcome, EngineError> {
        let description = request.describe();
        let _guard = self.enter(LogOrigin::Validated, &description)?;

        let ctx = ValidationContext {
            capabilities: self.capabilities,
            column_removal: self.config.engine.column_removal,
        };
        let attempt = self.db.with_writer(|conn| -> Result<Attempt, EngineError> {
            let snapshot = schema::snapshot(conn)?;
            match validator::validate(conn, &request, &snapshot, &ctx)? {
                ValidationResult::Block(reason) => Ok(Attempt::Blocked(reason)),
                allowed => {
                    let id = CommandId(self.next_id.fetch_add(1, Ordering::Relaxed));
                    let command = Command::build(id, request.kind(), allowed)?;
                    let result =
                        executor::apply(conn, &command, Direction::Forward, control, self.batch_size())?;
                    Ok(Attempt::Applied(Box::new(command), result))
                }
            }
        });

        match attempt {
            Err(e) => {
                self.log.append(
                    LogOrigin::Validated,
                    None,
                    description,
                    LogOutcome::Failed,
                    Some(e.to_string()),
                );
                Err(e)
            }
            Ok(Attempt::Blocked(reason)) => {
                self.log.append(
                    LogOrigin::Validated,
                    None,
                    description,
                    LogOutcome::Blocked,
                    Some(reason.to_string()),
                );
                Ok(MutationOutcome::Blocked(reason))
            }
            Ok(Attempt::Applied(command, result)) => {
                let (outcome, reason) = match &result {
                    ApplyResult::Committed => (LogOutcome::Applied, None),
                    ApplyResult::RolledBack(reason) => (LogOutcome::Failed, Some(reason.to_string())),
                };
                self.log.append(
                    LogOrigin::Validated,
                    Some(command.id()),
                    command.description(),
                    outcome,
                    reason,
                );
                if result.is_committed() {
                    self.history().record(*command);
                }
                Ok(MutationOutcome::Executed(result))
            }
        }
    }

    // ---- history ----

    pub fn undo(&self) -> Result<HistoryOutcome, EngineError> {
        self.undo_with(&WorkControl::default())
    }

    pub fn redo(&self) -> Result<HistoryOutcome, EngineError> {
        self.redo_with(&WorkControl::default())
    }

    /// Apply the inverse of the most recent command. Preconditions are
    /// re-checked; the command only moves to the redo stack on commit.
    pub fn undo_with(&self, control: &WorkControl) -> Result<HistoryOutcome, EngineError> {
        self.replay(Direction::Inverse, control)
    }

    pub fn redo_with(&self, control: &WorkControl) -> Result<HistoryOutcome, EngineError> {
        self.replay(Direction::Forward, control)
    }

    fn replay(&self, direction: Direction, control: &WorkControl) -> Result<HistoryOutcome, EngineError> {
        let (origin, verb) = match direction {
            Direction::Inverse => (LogOrigin::Undo, "Undo"),
            Direction::Forward => (LogOrigin::Redo, "Redo"),
        };
        let _guard = self.enter(origin, verb)?;

        let mut history = self.history();
        let next = match direction {
            Direction::Inverse => history.peek_undo(),
            Direction::Forward => history.peek_redo(),
        }
        .map(|c| (c.id(), format!("{verb} {}", c.description())));
        let Some((id, description)) = next else {
            tracing::debug!(?direction, "nothing to replay");
            return Ok(HistoryOutcome::EmptyHistory);
        };

        let batch = self.batch_size();
        let outcome = self.db.with_writer(|conn| -> Result<_, EngineError> {
            let apply = |command: &Command| executor::apply(conn, command, direction, control, batch);
            match direction {
                Direction::Inverse => history.undo(apply),
                Direction::Forward => history.redo(apply),
            }
        });
        drop(history);

        match &outcome {
            Ok(HistoryOutcome::Executed { result, .. }) => {
                let (entry_outcome, reason) = match result {
                    ApplyResult::Committed => (LogOutcome::Applied, None),
                    ApplyResult::RolledBack(reason) => (LogOutcome::Failed, Some(reason.to_string())),
                };
                self.log.append(origin, Some(id), description, entry_outcome, reason);
            }
            Ok(HistoryOutcome::EmptyHistory) => {}
            Err(e) => {
                self.log.append(origin, Some(id), description, LogOutcome::Failed, Some(e.to_string()));
            }
        }
        outcome
    }

    pub fn can_undo(&self) -> bool {
        self.history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history().can_redo()
    }

    /// Description of the command `undo` would revert, for menu labels.
    pub fn undo_description(&self) -> Option<String> {
        self.history().peek_undo().map(|c| c.description().to_string())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.history().peek_redo().map(|c| c.description().to_string())
    }

    pub fn state(&self) -> SessionState {
        self.gate.state()
    }

    // ---- SQL console ----

    /// Run console SQL without validation. Logged as "unchecked".
    ///
    /// A statement that leaves a transaction open is rolled back and
    /// reported as a transaction error.
    pub fn execute_raw(&self, sql: &str) -> Result<RawSqlResult, EngineError> {
        let _guard = self.enter(LogOrigin::RawSql, sql)?;

        let result = self.db.with_writer(|conn| -> Result<RawSqlResult, EngineError> {
            let output = run_raw(conn, sql);
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK;").map_err(raw_error)?;
                return Err(EngineError::Transaction {
                    message: "statement left a transaction open; it was rolled back".to_string(),
                });
            }
            output
        });

        match &result {
            Ok(output) => {
                let reason = output.changes.map(|n| format!("{n} rows changed"));
                self.log.append(LogOrigin::RawSql, None, sql, LogOutcome::Applied, reason);
            }
            Err(e) => {
                self.log.append(LogOrigin::RawSql, None, sql, LogOutcome::Failed, Some(e.to_string()));
            }
        }
        result
    }

    // ---- reads ----

    pub fn current_snapshot(&self) -> Result<SchemaSnapshot, EngineError> {
        self.db
            .with_reader(|conn| -> Result<_, EngineError> { Ok(schema::snapshot(conn)?) })
    }

    /// Plain-text ER description of the current schema.
    pub fn er_description(&self) -> Result<String, EngineError> {
        Ok(self.current_snapshot()?.render_er_text())
    }

    pub fn table_definition(&self, table: &str) -> Result<TableDefinition, EngineError> {
        self.db.with_reader(|conn| -> Result<_, EngineError> {
            Ok(schema::table_definition(conn, table)?)
        })
    }

    pub fn read_all_rows(&self, table: &str) -> Result<RowSet, EngineError> {
        self.read_page(table, None, 0)
    }

    /// One page of rows in stable order.
    pub fn read_rows(&self, table: &str, limit: u64, offset: u64) -> Result<RowSet, EngineError> {
        self.read_page(table, Some(limit), offset)
    }

    fn read_page(&self, table: &str, limit: Option<u64>, offset: u64) -> Result<RowSet, EngineError> {
        self.db.with_reader(|conn| -> Result<_, EngineError> {
            let schema = schema::load_table(conn, table)?;
            Ok(rows::read_rows(conn, &schema, limit, offset)?)
        })
    }

    /// Parse grid input for a cell. `NULL` and `<NULL>` mean SQL NULL.
    pub fn parse_cell_input(&self, table: &str, column: &str, input: &str) -> Result<CellValue, EngineError> {
        let schema = self.db.with_reader(|conn| Ok::<_, EngineError>(schema::load_table(conn, table)?))?;
        let Some(col) = schema.column(column) else {
            return Err(EngineError::ValidationBlocked {
                reason: BlockReason::InvalidRequest {
                    detail: format!("unknown column {}.{column}", schema.name),
                },
            });
        };
        CellValue::parse_input(input, schema.affinity_of(col)).map_err(|e| EngineError::ValidationBlocked {
            reason: BlockReason::AmbiguousTypeConversion {
                column: format!("{}.{}", schema.name, col.name),
                detail: e.to_string(),
            },
        })
    }

    // ---- action log ----

    pub fn subscribe_log(&self) -> Receiver<LogEntry> {
        self.log.subscribe()
    }

    pub fn log_entries_since(&self, seq: u64) -> Vec<LogEntry> {
        self.log.entries_since(seq)
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.log.entries()
    }

    // ---- maintenance ----

    /// Refused while undo history exists: VACUUM may renumber rowids that
    /// recorded commands identify rows by.
    pub fn vacuum(&self) -> Result<(), EngineError> {
        let description = "VACUUM";
        let _guard = self.enter(LogOrigin::Maintenance, description)?;

        if !self.history().is_empty() {
            let reason = BlockReason::Irreversible {
                detail: "VACUUM may renumber rowids referenced by undo history".to_string(),
            };
            self.log.append(
                LogOrigin::Maintenance,
                None,
                description,
                LogOutcome::Blocked,
                Some(reason.to_string()),
            );
            return Err(EngineError::ValidationBlocked { reason });
        }

        let result = self.db.with_writer(|conn| Ok::<_, EngineError>(maintenance::vacuum(conn)?));
        self.log_maintenance(description, &result);
        result
    }

    pub fn integrity_check(&self) -> Result<IntegrityReport, EngineError> {
        let report = self.db.with_reader(|conn| Ok::<_, EngineError>(maintenance::integrity_check(conn)?))?;
        if !report.is_ok() {
            tracing::warn!(problems = report.messages.len(), "integrity check found problems");
        }
        Ok(report)
    }

    /// Hot copy of the database to a new file, cancellable between page steps.
    pub fn copy_database(&self, dest: &Path, control: &WorkControl) -> Result<CopyResult, EngineError> {
        let description = format!("Copy database to {}", dest.display());
        let result = self
            .db
            .with_reader(|conn| Ok::<_, EngineError>(maintenance::copy_database(conn, dest, control)?));
        self.log_maintenance(&description, &result);
        result
    }

    fn log_maintenance<T>(&self, description: &str, result: &Result<T, EngineError>) {
        match result {
            Ok(_) => self.log.append(LogOrigin::Maintenance, None, description, LogOutcome::Applied, None),
            Err(e) => self.log.append(
                LogOrigin::Maintenance,
                None,
                description,
                LogOutcome::Failed,
                Some(e.to_string()),
            ),
        };
    }

    // ---- accessors ----

    pub fn config(&self) -> &TableSafeConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.db.path()
    }
}

/// Runs every statement in `sql` in order. The result carries the rows of
/// the last query and the summed change count of the other statements.
///
/// Statements before a failing one stay applied; the error says how many.
fn run_raw(conn: &Connection, sql: &str) -> Result<RawSqlResult, EngineError> {
    let mut output = RawSqlResult::default();
    let mut batch = Batch::new(conn, sql);
    let mut ran = 0usize;
    let failed = |ran: usize, e: rusqlite::Error| {
        let message = if ran == 0 {
            e.to_string()
        } else {
            format!("statement {} failed after {ran} applied: {e}", ran + 1)
        };
        EngineError::Transaction { message }
    };

    while let Some(mut stmt) = batch.next().map_err(|e| failed(ran, e))? {
        let width = stmt.column_count();
        if width == 0 {
            let changes = stmt.execute([]).map_err(|e| failed(ran, e))? as u64;
            output.changes = Some(output.changes.unwrap_or(0) + changes);
        } else {
            output.columns = stmt.column_names().into_iter().map(String::from).collect();
            output.rows = stmt
                .query_map([], |row| {
                    (0..width)
                        .map(|i| row.get::<_, CellValue>(i))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })
                .and_then(|mapped| mapped.collect::<Result<Vec<Vec<CellValue>>, _>>())
                .map_err(|e| failed(ran, e))?;
        }
        ran += 1;
    }
    Ok(output)
}

fn raw_error(e: rusqlite::Error) -> EngineError {
    EngineError::Transaction {
        message: e.to_string(),
    }
}
