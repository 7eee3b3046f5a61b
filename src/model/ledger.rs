use super::{column, label_column};
use crate::executor::DbError;
use chrono::{DateTime, Utc};
use may_postgres::Row;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Who a ledger row pays. `System` rows carry no beneficiary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerRole {
    Provider,
    Seller,
    Referrer,
    Manager,
    System,
}

impl LedgerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerRole::Provider => "PROVIDER",
            LedgerRole::Seller => "SELLER",
            LedgerRole::Referrer => "REFERRER",
            LedgerRole::Manager => "MANAGER",
            LedgerRole::System => "SYSTEM",
        }
    }
}

impl fmt::Display for LedgerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PROVIDER" => Ok(LedgerRole::Provider),
            "SELLER" => Ok(LedgerRole::Seller),
            "REFERRER" => Ok(LedgerRole::Referrer),
            "MANAGER" => Ok(LedgerRole::Manager),
            "SYSTEM" => Ok(LedgerRole::System),
            other => Err(format!("unknown ledger role '{other}'")),
        }
    }
}

/// One immutable row of the revenue ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueLedger {
    pub id: i64,
    pub booking_id: i64,
    /// Groups the rows written by one settlement run.
    pub settlement_id: Uuid,
    pub role: LedgerRole,
    pub beneficiary_user_id: Option<i64>,
    pub amount: Decimal,
    pub pct: Decimal,
    pub created_at: DateTime<Utc>,
}

impl RevenueLedger {
    pub const COLUMNS: &'static str =
        "id, booking_id, settlement_id, role, beneficiary_user_id, amount, pct, created_at";

    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            booking_id: column(row, "booking_id")?,
            settlement_id: column(row, "settlement_id")?,
            role: label_column(row, "role")?,
            beneficiary_user_id: column(row, "beneficiary_user_id")?,
            amount: column(row, "amount")?,
            pct: column(row, "pct")?,
            created_at: column(row, "created_at")?,
        })
    }
}

/// A ledger row before insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub booking_id: i64,
    pub settlement_id: Uuid,
    pub role: LedgerRole,
    pub beneficiary_user_id: Option<i64>,
    pub amount: Decimal,
    pub pct: Decimal,
}
