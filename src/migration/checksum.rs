//! Checksum calculation for migrations

use super::error::MigrationError;
use super::migration::Migration;
use sha2::{Digest, Sha256};

/// Hex SHA-256 over a migration's forward statements, one per line.
pub fn calculate_checksum(migration: &dyn Migration) -> String {
    let mut hasher = Sha256::new();
    for statement in migration.up_statements() {
        hasher.update(statement.trim().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Compare the stored checksum of an applied migration with the current one.
pub fn validate_checksum(
    migration: &dyn Migration,
    stored_checksum: &str,
) -> Result<(), MigrationError> {
    let current = calculate_checksum(migration);
    if stored_checksum == current {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch {
            version: migration.version(),
            name: migration.name().to_string(),
            stored: stored_checksum.to_string(),
            current,
        })
    }
}
