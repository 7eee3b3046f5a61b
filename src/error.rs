//! Error types for commission settlement.
//!
//! `CommissionError` is what every engine entry point returns. Storage faults arrive as
//! [`DbError`] / [`TransactionError`] and are the only retryable kind.

use crate::executor::DbError;
use crate::transaction::TransactionError;
use rust_decimal::Decimal;

/// The entity a `NotFound` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Booking,
    Product,
    User,
    Rank,
    Wallet,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Booking => "booking",
            Entity::Product => "product",
            Entity::User => "user",
            Entity::Rank => "rank",
            Entity::Wallet => "wallet",
        };
        f.write_str(name)
    }
}

/// Error type for commission operations
#[derive(Debug)]
pub enum CommissionError {
    /// Booking, product or user missing
    NotFound { entity: Entity, id: i64 },
    /// Seller rank or SELLER share missing, or percentages out of range
    Configuration(String),
    /// Stored ledger rows do not add up to the commission pool
    Anomaly {
        booking_id: i64,
        expected: Decimal,
        actual: Decimal,
    },
    /// Begin/commit/rollback failed
    Transaction(String),
    /// Statement failed inside the store
    Database(DbError),
}

impl CommissionError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        CommissionError::NotFound { entity, id }
    }

    /// Storage faults may succeed on retry; everything else is a data problem.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommissionError::Transaction(_) | CommissionError::Database(_)
        )
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CommissionError::NotFound { .. } => "not_found",
            CommissionError::Configuration(_) => "configuration",
            CommissionError::Anomaly { .. } => "anomaly",
            CommissionError::Transaction(_) => "transaction",
            CommissionError::Database(_) => "database",
        }
    }
}

impl std::fmt::Display for CommissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommissionError::NotFound { entity, id } => {
                write!(f, "{} {} not found", entity, id)
            }
            CommissionError::Configuration(msg) => {
                write!(f, "Commission configuration error: {}", msg)
            }
            CommissionError::Anomaly {
                booking_id,
                expected,
                actual,
            } => write!(
                f,
                "Ledger for booking {} sums to {} but the commission pool is {}",
                booking_id, actual, expected
            ),
            CommissionError::Transaction(msg) => write!(f, "Transaction failure: {}", msg),
            CommissionError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for CommissionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommissionError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for CommissionError {
    fn from(err: DbError) -> Self {
        CommissionError::Database(err)
    }
}

impl From<TransactionError> for CommissionError {
    fn from(err: TransactionError) -> Self {
        CommissionError::Transaction(err.to_string())
    }
}
