//! Exclusive session lock via fd-lock on a sidecar file.
//! A second editor session on the same database is refused.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fd_lock::RwLock;
use tablesafe_core::errors::StorageError;

/// Advisory write lock held for the whole session.
///
/// The OS releases it when the file handle closes, i.e. when this value drops.
pub struct SessionLock {
    _lock_file: RwLock<File>,
    lock_path: PathBuf,
}

impl SessionLock {
    /// Lock `<db>-tablesafe.lock` next to the database (non-blocking).
    pub fn acquire(db_path: &Path) -> Result<Self, StorageError> {
        let lock_path = lock_path_for(db_path);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        let mut lock_file = RwLock::new(file);

        match lock_file.try_write() {
            // The guard only borrows; the lock itself lives as long as the handle.
            Ok(guard) => std::mem::forget(guard),
            Err(e) => {
                return Err(StorageError::Locked {
                    path: db_path.display().to_string(),
                    message: format!("another session has this database open ({e})"),
                })
            }
        }

        tracing::debug!(lock = %lock_path.display(), "session lock acquired");
        Ok(Self {
            _lock_file: lock_file,
            lock_path,
        })
    }

    /// Get the lock file path.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push("-tablesafe.lock");
    db_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_database_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("app.db");

        let first = SessionLock::acquire(&db).unwrap();
        assert!(first.path().ends_with("app.db-tablesafe.lock"));

        let second = SessionLock::acquire(&db);
        assert!(matches!(second, Err(StorageError::Locked { .. })));

        drop(first);
        assert!(SessionLock::acquire(&db).is_ok());
    }
}
