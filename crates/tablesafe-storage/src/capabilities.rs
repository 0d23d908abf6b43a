//! What the linked SQLite library can do natively.

use tablesafe_core::config::ColumnRemoval;

/// `ALTER TABLE ... DROP COLUMN` arrived in SQLite 3.35.0.
pub const NATIVE_DROP_COLUMN_VERSION: i32 = 3_035_000;

/// How a column is taken out of a table again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStrategy {
    Native,
    Rebuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub sqlite_version: i32,
    pub native_drop_column: bool,
}

impl Capabilities {
    /// Capabilities of the SQLite library rusqlite is linked against.
    pub fn detect() -> Self {
        Self::from_version(rusqlite::version_number())
    }

    pub fn from_version(sqlite_version: i32) -> Self {
        Self {
            sqlite_version,
            native_drop_column: sqlite_version >= NATIVE_DROP_COLUMN_VERSION,
        }
    }

    /// Strategy for removing a column under the configured mode.
    /// `None` when the mode demands native support that is missing.
    pub fn column_removal(&self, mode: ColumnRemoval) -> Option<RemovalStrategy> {
        match mode {
            ColumnRemoval::Auto if self.native_drop_column => Some(RemovalStrategy::Native),
            ColumnRemoval::Auto => Some(RemovalStrategy::Rebuild),
            ColumnRemoval::Native if self.native_drop_column => Some(RemovalStrategy::Native),
            ColumnRemoval::Native => None,
            ColumnRemoval::Rebuild => Some(RemovalStrategy::Rebuild),
        }
    }
}
