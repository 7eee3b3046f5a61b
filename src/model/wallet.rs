use super::{column, label_column};
use crate::executor::DbError;
use chrono::{DateTime, Utc};
use may_postgres::Row;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wallet {
    pub user_id: i64,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub const COLUMNS: &'static str = "user_id, balance, created_at, updated_at";

    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            user_id: column(row, "user_id")?,
            balance: column(row, "balance")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

/// Label stored on every wallet audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletTransactionKind {
    CommissionProvider,
    CommissionSeller,
    CommissionReferrer,
    CommissionManager,
    /// Debit undoing an earlier commission credit during recalculation.
    CommissionReversal,
}

impl WalletTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTransactionKind::CommissionProvider => "COMMISSION_PROVIDER",
            WalletTransactionKind::CommissionSeller => "COMMISSION_SELLER",
            WalletTransactionKind::CommissionReferrer => "COMMISSION_REFERRER",
            WalletTransactionKind::CommissionManager => "COMMISSION_MANAGER",
            WalletTransactionKind::CommissionReversal => "COMMISSION_REVERSAL",
        }
    }

    pub fn is_credit(&self) -> bool {
        !matches!(self, WalletTransactionKind::CommissionReversal)
    }
}

impl fmt::Display for WalletTransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletTransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMMISSION_PROVIDER" => Ok(WalletTransactionKind::CommissionProvider),
            "COMMISSION_SELLER" => Ok(WalletTransactionKind::CommissionSeller),
            "COMMISSION_REFERRER" => Ok(WalletTransactionKind::CommissionReferrer),
            "COMMISSION_MANAGER" => Ok(WalletTransactionKind::CommissionManager),
            "COMMISSION_REVERSAL" => Ok(WalletTransactionKind::CommissionReversal),
            other => Err(format!("unknown wallet transaction kind '{other}'")),
        }
    }
}

/// Append-only audit row; `amount` is negative for reversals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletTransaction {
    pub id: i64,
    pub user_id: i64,
    pub booking_id: i64,
    pub settlement_id: Uuid,
    pub kind: WalletTransactionKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub const COLUMNS: &'static str =
        "id, user_id, booking_id, settlement_id, kind, amount, balance_after, created_at";

    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            user_id: column(row, "user_id")?,
            booking_id: column(row, "booking_id")?,
            settlement_id: column(row, "settlement_id")?,
            kind: label_column(row, "kind")?,
            amount: column(row, "amount")?,
            balance_after: column(row, "balance_after")?,
            created_at: column(row, "created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewWalletTransaction {
    pub user_id: i64,
    pub booking_id: i64,
    pub settlement_id: Uuid,
    pub kind: WalletTransactionKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
}
