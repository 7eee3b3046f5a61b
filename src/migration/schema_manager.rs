//! SchemaManager - runs migration statements and answers schema questions

use crate::executor::{DbError, Executor};
use may_postgres::types::ToSql;

/// Wraps an [`Executor`] for the duration of one migration.
pub struct SchemaManager<'a> {
    executor: &'a dyn Executor,
}

impl<'a> SchemaManager<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        Self { executor }
    }

    /// Execute DDL statements in order, stopping at the first failure.
    pub fn execute_all(&self, statements: &[&str]) -> Result<(), DbError> {
        for statement in statements {
            self.executor.execute(statement, &[])?;
        }
        Ok(())
    }

    /// Execute a single statement with parameters.
    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<(), DbError> {
        self.executor.execute(sql, params).map(|_| ())
    }

    /// Whether a table exists in the current search path.
    pub fn has_table(&self, table: &str) -> Result<bool, DbError> {
        let row = self.executor.query_one(
            "SELECT to_regclass($1) IS NOT NULL AS present",
            &[&table],
        )?;
        crate::model::column(&row, "present")
    }

    pub fn executor(&self) -> &dyn Executor {
        self.executor
    }
}
