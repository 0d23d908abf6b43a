//! Append-only action log with push subscribers and an optional
//! JSON-lines file sink.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tablesafe_core::types::command::CommandId;
use tablesafe_core::types::log::{LogEntry, LogOrigin, LogOutcome};

struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    fn write(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

#[derive(Default)]
struct LogInner {
    entries: Vec<LogEntry>,
    next_seq: u64,
    subscribers: Vec<Sender<LogEntry>>,
    sink: Option<FileSink>,
}

/// Session action log. `append` never fails.
pub struct ActionLog {
    inner: Mutex<LogInner>,
    subscriber_capacity: usize,
}

impl ActionLog {
    pub fn new(subscriber_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                next_seq: 1,
                ..LogInner::default()
            }),
            subscriber_capacity: subscriber_capacity.max(1),
        }
    }

    /// Log that also mirrors entries to `path`. If the file cannot be
    /// opened the log starts without a sink and records why.
    pub fn with_file(subscriber_capacity: usize, path: &Path) -> Self {
        let log = Self::new(subscriber_capacity);
        match FileSink::open(path) {
            Ok(sink) => {
                log.lock().sink = Some(sink);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "action log file unavailable");
                log.append(
                    LogOrigin::System,
                    None,
                    format!("open action log file {}", path.display()),
                    LogOutcome::Failed,
                    Some(e.to_string()),
                );
            }
        }
        log
    }

    // A panic while holding the lock cannot leave entries half-written,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one entry and fan it out. Returns the stored entry.
    pub fn append(
        &self,
        origin: LogOrigin,
        command_id: Option<CommandId>,
        description: impl Into<String>,
        outcome: LogOutcome,
        reason: Option<String>,
    ) -> LogEntry {
        let mut inner = self.lock();
        let entry = push(&mut inner, origin, command_id, description.into(), outcome, reason);

        if let Some(sink) = inner.sink.as_mut() {
            if let Err(e) = sink.write(&entry) {
                let path = sink.path.display().to_string();
                inner.sink = None;
                tracing::warn!(path = %path, error = %e, "action log file sink disabled");
                push(
                    &mut inner,
                    LogOrigin::System,
                    None,
                    format!("write action log file {path}"),
                    LogOutcome::Failed,
                    Some(format!("{e}; file logging disabled")),
                );
            }
        }
        entry
    }

    /// Receive every entry appended from now on.
    pub fn subscribe(&self) -> Receiver<LogEntry> {
        let (tx, rx) = bounded(self.subscriber_capacity);
        self.lock().subscribers.push(tx);
        rx
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.clone()
    }

    /// Entries with `seq > after`.
    pub fn entries_since(&self, after: u64) -> Vec<LogEntry> {
        let inner = self.lock();
        let start = inner.entries.partition_point(|e| e.seq <= after);
        inner.entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(1024)
    }
}

fn push(
    inner: &mut LogInner,
    origin: LogOrigin,
    command_id: Option<CommandId>,
    description: String,
    outcome: LogOutcome,
    reason: Option<String>,
) -> LogEntry {
    let entry = LogEntry {
        seq: inner.next_seq,
        timestamp: Utc::now(),
        origin,
        command_id,
        description,
        outcome,
        reason,
    };
    inner.next_seq += 1;

    match outcome {
        LogOutcome::Applied => tracing::info!(
            seq = entry.seq,
            origin = %origin,
            command = ?command_id.map(|c| c.0),
            "{}",
            entry.description
        ),
        LogOutcome::Blocked | LogOutcome::Failed => tracing::warn!(
            seq = entry.seq,
            origin = %origin,
            outcome = %outcome,
            reason = entry.reason.as_deref().unwrap_or(""),
            "{}",
            entry.description
        ),
    }

    // A full subscriber misses this entry but can catch up via entries_since.
    inner.subscribers.retain(|tx| match tx.try_send(entry.clone()) {
        Ok(()) | Err(TrySendError::Full(_)) => true,
        Err(TrySendError::Disconnected(_)) => false,
    });
    inner.entries.push(entry.clone());
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_strictly_increasing() {
        let log = ActionLog::default();
        let a = log.append(LogOrigin::Validated, None, "a", LogOutcome::Applied, None);
        let b = log.append(LogOrigin::RawSql, None, "b", LogOutcome::Failed, Some("x".into()));
        assert_eq!((a.seq, b.seq), (1, 2));
        assert_eq!(log.entries_since(1), vec![b]);
        assert!(log.entries_since(2).is_empty());
    }

    #[test]
    fn subscribers_receive_and_disconnected_ones_are_dropped() {
        let log = ActionLog::new(4);
        let rx = log.subscribe();
        let gone = log.subscribe();
        drop(gone);
        log.append(LogOrigin::Undo, Some(CommandId(3)), "undo", LogOutcome::Applied, None);
        let got = rx.try_recv().unwrap();
        assert_eq!(got.command_id, Some(CommandId(3)));
        assert_eq!(log.lock().subscribers.len(), 1);
    }

    #[test]
    fn full_subscriber_does_not_block_append() {
        let log = ActionLog::new(1);
        let rx = log.subscribe();
        for i in 0..3 {
            log.append(LogOrigin::Validated, None, format!("e{i}"), LogOutcome::Applied, None);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(rx.try_recv().unwrap().seq, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn file_sink_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actions.jsonl");
        let log = ActionLog::with_file(8, &path);
        log.append(LogOrigin::Validated, Some(CommandId(1)), "edit", LogOutcome::Applied, None);
        log.append(LogOrigin::Validated, None, "drop", LogOutcome::Blocked, Some("no".into()));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<LogEntry> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, log.entries());
    }

    #[test]
    fn unopenable_file_is_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::with_file(8, &dir.path().join("missing").join("log.jsonl"));
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].origin, LogOrigin::System);
        log.append(LogOrigin::Validated, None, "x", LogOutcome::Applied, None);
        assert_eq!(log.len(), 2);
    }
}
