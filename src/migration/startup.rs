//! In-process migration execution

use super::checksum::{calculate_checksum, validate_checksum};
use super::error::MigrationError;
use super::migration::Migration;
use super::schema::builtin_migrations;
use super::schema_manager::SchemaManager;
use super::state_table::{applied_migrations, initialize_state_table, record_applied, remove_applied};
use crate::executor::MayPostgresExecutor;
use std::time::Instant;

/// Apply every pending built-in migration, each in its own transaction.
///
/// Checksums of already applied migrations are validated first; a mismatch fails before
/// anything new is applied. Returns how many migrations ran.
pub fn run_migrations(executor: &MayPostgresExecutor) -> Result<usize, MigrationError> {
    apply(executor, &builtin_migrations())
}

/// Same as [`run_migrations`] over an explicit migration list.
pub fn apply(
    executor: &MayPostgresExecutor,
    migrations: &[Box<dyn Migration>],
) -> Result<usize, MigrationError> {
    initialize_state_table(executor)?;
    let applied = applied_migrations(executor)?;

    for record in &applied {
        let migration = migrations
            .iter()
            .find(|m| m.version() == record.version)
            .ok_or(MigrationError::UnknownVersion(record.version))?;
        validate_checksum(migration.as_ref(), &record.checksum)?;
    }

    let mut pending: Vec<&dyn Migration> = migrations
        .iter()
        .map(|m| m.as_ref())
        .filter(|m| !applied.iter().any(|a| a.version == m.version()))
        .collect();
    pending.sort_by_key(|m| m.version());

    for migration in &pending {
        let start = Instant::now();
        let transaction = executor.begin()?;
        migration
            .up(&SchemaManager::new(&transaction))
            .map_err(|e| MigrationError::ExecutionFailed {
                version: migration.version(),
                name: migration.name().to_string(),
                error: e.to_string(),
            })?;
        let elapsed_ms = i32::try_from(start.elapsed().as_millis()).unwrap_or(i32::MAX);
        record_applied(
            &transaction,
            migration.version(),
            migration.name(),
            &calculate_checksum(*migration),
            elapsed_ms,
        )?;
        transaction.commit()?;
        log::info!(
            "applied migration {} ({}) in {}ms",
            migration.version(),
            migration.name(),
            elapsed_ms
        );
    }

    if pending.is_empty() {
        log::debug!("No pending migrations to apply");
    }
    Ok(pending.len())
}

/// Roll back the most recently applied built-in migration. Returns its version, if any.
pub fn revert_latest(executor: &MayPostgresExecutor) -> Result<Option<i64>, MigrationError> {
    initialize_state_table(executor)?;
    let Some(latest) = applied_migrations(executor)?.pop() else {
        return Ok(None);
    };
    let migrations = builtin_migrations();
    let migration = migrations
        .iter()
        .find(|m| m.version() == latest.version)
        .ok_or(MigrationError::UnknownVersion(latest.version))?;

    let transaction = executor.begin()?;
    migration
        .down(&SchemaManager::new(&transaction))
        .map_err(|e| MigrationError::ExecutionFailed {
            version: latest.version,
            name: latest.name.clone(),
            error: e.to_string(),
        })?;
    remove_applied(&transaction, latest.version)?;
    transaction.commit()?;
    log::info!("reverted migration {} ({})", latest.version, latest.name);
    Ok(Some(latest.version))
}
