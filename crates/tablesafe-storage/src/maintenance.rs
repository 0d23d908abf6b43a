//! VACUUM, integrity check and hot database copy.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rusqlite::backup::{Backup, StepResult};
use rusqlite::Connection;
use tablesafe_core::errors::StorageError;
use tablesafe_core::traits::WorkControl;

/// Pages copied per backup step; cancellation is checked between steps.
const PAGES_PER_STEP: std::os::raw::c_int = 256;
const BUSY_SLEEP: Duration = Duration::from_millis(10);

/// Result of [`integrity_check`]. Healthy databases report exactly `["ok"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub messages: Vec<String>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.messages.len() == 1 && self.messages[0] == "ok"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyResult {
    pub destination: PathBuf,
    pub pages: u64,
    pub size_bytes: u64,
}

pub fn vacuum(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch("VACUUM;")?;
    Ok(())
}

pub fn integrity_check(conn: &Connection) -> Result<IntegrityReport, StorageError> {
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let messages = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(IntegrityReport { messages })
}

/// Copy the live database to `dest` with the SQLite backup API.
///
/// `dest` must not exist. On cancellation or failure the partial file is
/// removed.
pub fn copy_database(
    src: &Connection,
    dest: &Path,
    control: &WorkControl,
) -> Result<CopyResult, StorageError> {
    if dest.exists() {
        return Err(StorageError::NotSupported {
            operation: "copy database".to_string(),
            reason: format!("{} already exists", dest.display()),
        });
    }

    let result = run_backup(src, dest, control);
    if result.is_err() {
        // The destination connection is closed by now.
        if let Err(e) = std::fs::remove_file(dest) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %dest.display(), error = %e, "could not remove partial copy");
            }
        }
    }
    result
}

fn run_backup(src: &Connection, dest: &Path, control: &WorkControl) -> Result<CopyResult, StorageError> {
    let operation = format!("copy database to {}", dest.display());
    let mut dst = Connection::open(dest)?;
    let pages = {
        let backup = Backup::new(src, &mut dst)?;
        loop {
            if control.is_cancelled() {
                tracing::info!(path = %dest.display(), "database copy cancelled");
                return Err(StorageError::Cancelled { operation });
            }
            let step = backup.step(PAGES_PER_STEP)?;
            let progress = backup.progress();
            let total = progress.pagecount.max(0) as u64;
            let remaining = progress.remaining.max(0) as u64;
            control.report(&operation, total.saturating_sub(remaining), Some(total));
            match step {
                StepResult::Done => break total,
                StepResult::More => {}
                StepResult::Busy | StepResult::Locked => thread::sleep(BUSY_SLEEP),
                // StepResult is non-exhaustive.
                _ => thread::sleep(BUSY_SLEEP),
            }
        }
    };
    dst.close().map_err(|(_, e)| StorageError::from(e))?;

    let size_bytes = std::fs::metadata(dest)?.len();
    tracing::info!(path = %dest.display(), pages, size_bytes, "database copied");
    Ok(CopyResult {
        destination: dest.to_path_buf(),
        pages,
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablesafe_core::traits::CancellationToken;

    fn source() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);
             INSERT INTO t VALUES (1, 'a'), (2, 'b');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn fresh_database_is_intact() {
        let conn = source();
        assert!(integrity_check(&conn).unwrap().is_ok());
        vacuum(&conn).unwrap();
    }

    #[test]
    fn copy_reproduces_rows() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("copy.db");
        let result = copy_database(&source(), &dest, &WorkControl::default()).unwrap();
        assert!(result.pages > 0);

        let copy = Connection::open(&dest).unwrap();
        let n: i64 = copy.query_row("SELECT count(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn cancelled_copy_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("copy.db");
        let token = CancellationToken::new();
        token.cancel();
        let err = copy_database(&source(), &dest, &WorkControl::new(token)).unwrap_err();
        assert!(matches!(err, StorageError::Cancelled { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn existing_destination_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("copy.db");
        std::fs::write(&dest, b"keep me").unwrap();
        assert!(copy_database(&source(), &dest, &WorkControl::default()).is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"keep me");
    }
}
