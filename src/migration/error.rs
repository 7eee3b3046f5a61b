//! Migration-specific error types

use crate::executor::DbError;
use crate::transaction::TransactionError;

/// Migration-specific errors
#[derive(Debug)]
pub enum MigrationError {
    /// Database execution error
    Database(DbError),
    /// Begin/commit around a migration failed
    Transaction(TransactionError),
    /// Checksum mismatch
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },
    /// Migration failed during execution
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },
    /// Applied version no longer compiled in
    UnknownVersion(i64),
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {}", e),
            MigrationError::Transaction(e) => write!(f, "Migration transaction error: {}", e),
            MigrationError::ChecksumMismatch {
                version,
                name,
                stored,
                current,
            } => {
                write!(
                    f,
                    "Migration '{}' (version {}) has been modified after being applied.\n\
                     Stored checksum: {}\n\
                     Current checksum: {}",
                    name, version, stored, current
                )
            }
            MigrationError::ExecutionFailed {
                version,
                name,
                error,
            } => {
                write!(
                    f,
                    "Migration '{}' (version {}) failed during execution: {}",
                    name, version, error
                )
            }
            MigrationError::UnknownVersion(version) => {
                write!(f, "Applied migration {} is not known to this build", version)
            }
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<DbError> for MigrationError {
    fn from(error: DbError) -> Self {
        MigrationError::Database(error)
    }
}

impl From<TransactionError> for MigrationError {
    fn from(error: TransactionError) -> Self {
        MigrationError::Transaction(error)
    }
}
