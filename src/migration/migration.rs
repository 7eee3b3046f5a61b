//! Migration trait definition

use super::schema_manager::SchemaManager;
use crate::executor::DbError;

/// A versioned schema change.
///
/// Statements are plain SQL, executed one at a time. The checksum recorded for a migration is
/// taken over [`up_statements`](Migration::up_statements), so they must not change once shipped.
pub trait Migration: Send + Sync {
    /// Human-readable identifier
    fn name(&self) -> &str;

    /// Timestamp version: YYYYMMDDHHMMSS
    fn version(&self) -> i64;

    fn up_statements(&self) -> &[&'static str];

    fn down_statements(&self) -> &[&'static str];

    /// Apply the migration
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.execute_all(self.up_statements())
    }

    /// Undo the migration
    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.execute_all(self.down_statements())
    }
}
