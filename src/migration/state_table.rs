//! Migration state table management

use crate::executor::{DbError, Executor};
use crate::model::column;
use chrono::{DateTime, Utc};

/// A row of `commission_migrations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

/// Create the `commission_migrations` table and its index if they don't exist.
pub fn initialize_state_table(executor: &dyn Executor) -> Result<(), DbError> {
    executor.execute(
        r#"
        CREATE TABLE IF NOT EXISTS commission_migrations (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            checksum VARCHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            execution_time_ms INTEGER
        )
        "#,
        &[],
    )?;
    executor.execute(
        "CREATE INDEX IF NOT EXISTS idx_commission_migrations_applied_at \
         ON commission_migrations(applied_at)",
        &[],
    )?;
    Ok(())
}

/// Applied migrations ordered by version.
pub fn applied_migrations(executor: &dyn Executor) -> Result<Vec<AppliedMigration>, DbError> {
    let rows = executor.query_all(
        "SELECT version, name, checksum, applied_at FROM commission_migrations ORDER BY version",
        &[],
    )?;
    rows.iter()
        .map(|row| {
            Ok(AppliedMigration {
                version: column(row, "version")?,
                name: column(row, "name")?,
                checksum: column(row, "checksum")?,
                applied_at: column(row, "applied_at")?,
            })
        })
        .collect()
}

pub fn record_applied(
    executor: &dyn Executor,
    version: i64,
    name: &str,
    checksum: &str,
    execution_time_ms: i32,
) -> Result<(), DbError> {
    executor.execute(
        "INSERT INTO commission_migrations (version, name, checksum, execution_time_ms) \
         VALUES ($1, $2, $3, $4)",
        &[&version, &name, &checksum, &execution_time_ms],
    )?;
    Ok(())
}

pub fn remove_applied(executor: &dyn Executor, version: i64) -> Result<(), DbError> {
    executor.execute(
        "DELETE FROM commission_migrations WHERE version = $1",
        &[&version],
    )?;
    Ok(())
}
