use super::column;
use crate::executor::DbError;
use may_postgres::Row;
use rust_decimal::Decimal;
use serde::Serialize;

/// A listed property. Both percentages are fractions of `price`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    /// The provider.
    pub owner_user_id: i64,
    pub price: Decimal,
    /// Share of price forming the whole commission pool, e.g. `0.05`.
    pub commission_pct: Decimal,
    /// Share of price reserved for the provider, e.g. `0.01`. Not a share of the pool.
    pub provider_desired_pct: Decimal,
}

impl Product {
    pub const COLUMNS: &'static str =
        "id, owner_user_id, price, commission_pct, provider_desired_pct";

    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            owner_user_id: column(row, "owner_user_id")?,
            price: column(row, "price")?,
            commission_pct: column(row, "commission_pct")?,
            provider_desired_pct: column(row, "provider_desired_pct")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppUser {
    pub id: i64,
    pub full_name: String,
}

impl AppUser {
    pub const COLUMNS: &'static str = "id, full_name";

    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            full_name: column(row, "full_name")?,
        })
    }
}
