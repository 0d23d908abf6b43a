//! Config loading: TOML parsing, defaults, validation, file loading.

use std::fs;

use tablesafe_core::config::ColumnRemoval;
use tablesafe_core::errors::ConfigError;
use tablesafe_core::{ErrorCode, TableSafeConfig};

#[test]
fn full_config_parses() {
    let config = TableSafeConfig::from_toml(
        r#"
        [engine]
        busy_timeout_ms = 250
        foreign_keys = false
        batch_size = 64
        column_removal = "native"
        journal_wal = false

        [history]
        max_depth = 100

        [log]
        filter = "tablesafe_storage=debug"
        file = "actions.jsonl"
        subscriber_capacity = 16
        "#,
    )
    .unwrap();

    assert_eq!(config.engine.effective_busy_timeout_ms(), 250);
    assert!(!config.engine.effective_foreign_keys());
    assert_eq!(config.engine.effective_batch_size(), 64);
    assert_eq!(config.engine.column_removal, ColumnRemoval::Native);
    assert!(!config.engine.effective_journal_wal());
    assert_eq!(config.history.max_depth, Some(100));
    assert_eq!(config.log.effective_filter(), "tablesafe_storage=debug");
    assert_eq!(config.log.effective_subscriber_capacity(), 16);
    assert!(config.log.file.is_some());
}

#[test]
fn partial_config_keeps_defaults() {
    let config = TableSafeConfig::from_toml("[history]\nmax_depth = 5\n").unwrap();
    assert_eq!(config.history.max_depth, Some(5));
    assert_eq!(config.engine.effective_batch_size(), 500);
    assert!(config.engine.effective_foreign_keys());
    assert_eq!(config.engine.column_removal, ColumnRemoval::Auto);
    assert_eq!(config.log.effective_filter(), "info");
    assert_eq!(config.log.effective_subscriber_capacity(), 1024);
}

#[test]
fn zero_batch_size_is_rejected() {
    let err = TableSafeConfig::from_toml("[engine]\nbatch_size = 0\n").unwrap_err();
    match &err {
        ConfigError::Invalid { field, .. } => assert_eq!(field, "engine.batch_size"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.error_code(), "CONFIG_ERROR");
}

#[test]
fn unknown_column_removal_mode_is_a_parse_error() {
    let err = TableSafeConfig::from_toml("[engine]\ncolumn_removal = \"guess\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn load_reads_file_and_tolerates_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tablesafe.toml");

    let missing = TableSafeConfig::load(&path).unwrap();
    assert_eq!(missing, TableSafeConfig::default());

    fs::write(&path, "[engine]\nbatch_size = 7\n").unwrap();
    let loaded = TableSafeConfig::load(&path).unwrap();
    assert_eq!(loaded.engine.effective_batch_size(), 7);
}
