//! Undo/redo stacks. Session-scoped, never persisted.

use std::collections::VecDeque;

use tablesafe_core::errors::EngineError;
use tablesafe_core::types::command::Command;
use tablesafe_core::types::outcome::{ApplyResult, HistoryOutcome};

/// Two disjoint stacks of applied and undone commands, most recent last.
///
/// `undo`/`redo` take the apply step as a closure so the stacks only move
/// after the database reports `Committed`.
#[derive(Debug, Default)]
pub struct HistoryManager {
    undo: VecDeque<Command>,
    redo: Vec<Command>,
    max_depth: Option<usize>,
}

impl HistoryManager {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    /// Push a newly applied command and clear the redo stack.
    pub fn record(&mut self, command: Command) {
        self.redo.clear();
        self.undo.push_back(command);
        if let Some(max) = self.max_depth {
            while self.undo.len() > max {
                if let Some(evicted) = self.undo.pop_front() {
                    tracing::debug!(
                        command = %evicted.id(),
                        max_depth = max,
                        "evicted oldest command from undo history"
                    );
                }
            }
        }
    }

    /// Apply the inverse of the most recent command. On anything other
    /// than `Committed` the command stays where it was.
    pub fn undo<F>(&mut self, apply_inverse: F) -> Result<HistoryOutcome, EngineError>
    where
        F: FnOnce(&Command) -> Result<ApplyResult, EngineError>,
    {
        let Some(command) = self.undo.back() else {
            return Ok(HistoryOutcome::EmptyHistory);
        };
        let id = command.id();
        let result = apply_inverse(command)?;
        if result.is_committed() {
            if let Some(command) = self.undo.pop_back() {
                self.redo.push(command);
            }
        }
        Ok(HistoryOutcome::Executed {
            command: id,
            result,
        })
    }

    /// Re-apply the forward action of the most recently undone command.
    pub fn redo<F>(&mut self, apply_forward: F) -> Result<HistoryOutcome, EngineError>
    where
        F: FnOnce(&Command) -> Result<ApplyResult, EngineError>,
    {
        let Some(command) = self.redo.last() else {
            return Ok(HistoryOutcome::EmptyHistory);
        };
        let id = command.id();
        let result = apply_forward(command)?;
        if result.is_committed() {
            if let Some(command) = self.redo.pop() {
                self.undo.push_back(command);
            }
        }
        Ok(HistoryOutcome::Executed {
            command: id,
            result,
        })
    }

    pub fn peek_undo(&self) -> Option<&Command> {
        self.undo.back()
    }

    pub fn peek_redo(&self) -> Option<&Command> {
        self.redo.last()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty() && self.redo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
