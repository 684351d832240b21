//! Error types for the migration engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for engine operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Everything the engine can fail with.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Missing or invalid connection string, directory or table name.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A migration file's version token is not an unsigned integer.
    #[error("invalid version format in '{file}': {reason}")]
    InvalidVersionFormat {
        /// Offending file (or archive entry) name.
        file: String,
        /// Why the token was rejected.
        reason: String,
    },

    /// The up or down counterpart of a known version does not exist.
    #[error("missing migration file with version: {0}")]
    MissingMigrationFile(u64),

    /// A requested file name does not follow the migration naming pattern.
    #[error("not a migration file: {0}")]
    NotAMigrationFile(String),

    /// The squash archive cannot be parsed (or written).
    #[error("corrupt squash file at line {line}: {reason}")]
    CorruptSquashFile {
        /// 1-based line number inside the archive.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Anything coming out of the database driver.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An operation that needs a confirmation callback was called without one.
    #[error("{0} is only usable interactively")]
    InteractiveOnly(&'static str),

    /// The ledger has no row for this version.
    #[error("migration with version {0} has not been applied")]
    NotApplied(u64),

    /// A new migration name does not match `^[a-z0-9][a-z0-9_]+$`.
    #[error("invalid migration name '{0}', must match the regexp: ^[a-z0-9][a-z0-9_]+$")]
    InvalidMigrationName(String),

    /// File system error.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Ledger snapshot (de)serialization failed.
    #[error("ledger snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// `pg_dump`, `psql` or another external tool failed.
    #[error("external tool '{tool}' failed: {reason}")]
    ExternalTool {
        /// Binary name.
        tool: String,
        /// Exit status or spawn error.
        reason: String,
    },
}

impl MigrateError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Create a squash archive error.
    pub fn corrupt_squash(line: usize, reason: impl Into<String>) -> Self {
        Self::CorruptSquashFile { line, reason: reason.into() }
    }

    /// Create an external tool error.
    pub fn external_tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExternalTool { tool: tool.into(), reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_display() {
        let err = MigrateError::MissingMigrationFile(1000000001);
        assert_eq!(err.to_string(), "missing migration file with version: 1000000001");
    }

    #[test]
    fn test_corrupt_squash_display() {
        let err = MigrateError::corrupt_squash(3, "expected 3 fields, got 2");
        let msg = err.to_string();
        assert!(msg.contains("line 3"));
        assert!(msg.contains("expected 3 fields"));
    }

    #[test]
    fn test_interactive_only_display() {
        let err = MigrateError::InteractiveOnly("sync");
        assert_eq!(err.to_string(), "sync is only usable interactively");
    }
}
