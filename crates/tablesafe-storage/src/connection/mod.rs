//! DatabaseManager: one writer connection plus a read-only snapshot connection.
//!
//! The writer is owned exclusively by the session. File databases in WAL
//! mode get a separate reader so snapshot reads see committed state only;
//! in-memory databases route reads through the writer.

pub mod lock;
pub mod pragmas;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags};
use tablesafe_core::config::EngineConfig;
use tablesafe_core::errors::StorageError;

use self::lock::SessionLock;

pub struct DatabaseManager {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
    path: Option<PathBuf>,
    _lock: Option<SessionLock>,
}

impl DatabaseManager {
    /// Open a file database, taking the session lock first.
    pub fn open(path: &Path, config: &EngineConfig) -> Result<Self, StorageError> {
        let lock = SessionLock::acquire(path)?;

        let writer = Connection::open(path)?;
        pragmas::configure_connection(&writer, config, true)?;

        let reader = if config.effective_journal_wal() {
            let reader = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            pragmas::configure_readonly_connection(&reader, config)?;
            Some(Mutex::new(reader))
        } else {
            None
        };

        tracing::info!(path = %path.display(), wal = reader.is_some(), "database opened");
        Ok(Self {
            writer: Mutex::new(writer),
            reader,
            path: Some(path.to_path_buf()),
            _lock: Some(lock),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(config: &EngineConfig) -> Result<Self, StorageError> {
        let writer = Connection::open_in_memory()?;
        pragmas::configure_connection(&writer, config, false)?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader: None,
            path: None,
            _lock: None,
        })
    }

    /// Execute a closure with the writer connection.
    pub fn with_writer<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StorageError>,
    {
        let conn = self.writer.lock().map_err(|e| StorageError::SqliteError {
            message: format!("writer lock poisoned: {e}"),
        })?;
        f(&conn)
    }

    /// Execute a closure with the snapshot reader.
    ///
    /// Falls back to the writer when there is no reader (in-memory or non-WAL).
    pub fn with_reader<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StorageError>,
    {
        let Some(reader) = &self.reader else {
            return self.with_writer(f);
        };
        let conn = reader.lock().map_err(|e| StorageError::SqliteError {
            message: format!("reader lock poisoned: {e}"),
        })?;
        f(&conn)
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn has_reader(&self) -> bool {
        self.reader.is_some()
    }

    /// Close both connections, surfacing close errors.
    pub fn close(self) -> Result<(), StorageError> {
        if let Some(reader) = self.reader {
            let conn = reader.into_inner().map_err(|e| StorageError::SqliteError {
                message: format!("reader lock poisoned: {e}"),
            })?;
            conn.close().map_err(|(_, e)| StorageError::from(e))?;
        }
        let conn = self.writer.into_inner().map_err(|e| StorageError::SqliteError {
            message: format!("writer lock poisoned: {e}"),
        })?;
        conn.close().map_err(|(_, e)| StorageError::from(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_sees_committed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseManager::open(&dir.path().join("r.db"), &EngineConfig::default()).unwrap();
        assert!(db.has_reader());

        db.with_writer(|conn| {
            conn.execute_batch("CREATE TABLE t(x); INSERT INTO t VALUES (1);")?;
            Ok::<_, StorageError>(())
        })
        .unwrap();

        let count: i64 = db
            .with_reader(|conn| {
                Ok::<_, StorageError>(conn.query_row("SELECT count(*) FROM t", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn in_memory_reads_go_through_writer() {
        let db = DatabaseManager::open_in_memory(&EngineConfig::default()).unwrap();
        assert!(!db.has_reader());
        assert!(db.path().is_none());
        db.with_writer(|conn| {
            conn.execute_batch("CREATE TABLE t(x)")?;
            Ok::<_, StorageError>(())
        })
        .unwrap();
        let n: i64 = db
            .with_reader(|conn| {
                Ok::<_, StorageError>(conn.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE name = 't'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(n, 1);
        db.close().unwrap();
    }

    #[test]
    fn second_open_of_same_file_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l.db");
        let _first = DatabaseManager::open(&path, &EngineConfig::default()).unwrap();
        let second = DatabaseManager::open(&path, &EngineConfig::default());
        assert!(matches!(second, Err(StorageError::Locked { .. })));
    }
}
