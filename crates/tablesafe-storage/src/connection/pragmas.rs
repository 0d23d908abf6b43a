//! PRAGMA setup for session connections.
//! Must be called on every connection immediately after opening.

use std::time::Duration;

use rusqlite::Connection;
use tablesafe_core::config::EngineConfig;
use tablesafe_core::errors::StorageError;

/// Configure the writer connection.
///
/// WAL is only requested for file databases; in-memory databases keep
/// the `memory` journal.
pub fn configure_connection(
    conn: &Connection,
    config: &EngineConfig,
    file_backed: bool,
) -> Result<(), StorageError> {
    conn.busy_timeout(Duration::from_millis(u64::from(
        config.effective_busy_timeout_ms(),
    )))?;
    conn.pragma_update(None, "foreign_keys", config.effective_foreign_keys())?;
    if file_backed && config.effective_journal_wal() {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(mode = %mode, "WAL journal mode not available");
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    }
    conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
    Ok(())
}

/// Configure a read-only snapshot connection.
/// `query_only` guards against writes through this handle.
pub fn configure_readonly_connection(
    conn: &Connection,
    config: &EngineConfig,
) -> Result<(), StorageError> {
    conn.busy_timeout(Duration::from_millis(u64::from(
        config.effective_busy_timeout_ms(),
    )))?;
    conn.execute_batch("PRAGMA query_only = ON; PRAGMA temp_store = MEMORY;")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_busy_timeout_and_foreign_keys() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn, &EngineConfig::default(), false).unwrap();

        let timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000);
        let fk: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn foreign_keys_follow_config() {
        let conn = Connection::open_in_memory().unwrap();
        let config = EngineConfig {
            foreign_keys: Some(false),
            ..Default::default()
        };
        configure_connection(&conn, &config, false).unwrap();
        let fk: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 0);
    }

    #[test]
    fn file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("w.db")).unwrap();
        configure_connection(&conn, &EngineConfig::default(), true).unwrap();
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn readonly_connection_rejects_writes() {
        let conn = Connection::open_in_memory().unwrap();
        configure_readonly_connection(&conn, &EngineConfig::default()).unwrap();
        assert!(conn.execute_batch("CREATE TABLE t(x)").is_err());
    }
}
