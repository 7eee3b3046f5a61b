use super::{column, label_column};
use crate::executor::DbError;
use chrono::{DateTime, Utc};
use may_postgres::Row;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A rank level, e.g. "Hạng 1" through "Hạng 5".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rank {
    pub id: i64,
    pub name: String,
    pub level: i32,
}

impl Rank {
    pub const COLUMNS: &'static str = "id, name, level";

    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            name: column(row, "name")?,
            level: column(row, "level")?,
        })
    }
}

/// Roles whose share of the remaining commission is configured per rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShareRole {
    Seller,
    Referrer,
    Manager,
}

impl ShareRole {
    pub const ALL: [ShareRole; 3] = [ShareRole::Seller, ShareRole::Referrer, ShareRole::Manager];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShareRole::Seller => "SELLER",
            ShareRole::Referrer => "REFERRER",
            ShareRole::Manager => "MANAGER",
        }
    }
}

impl fmt::Display for ShareRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShareRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SELLER" => Ok(ShareRole::Seller),
            "REFERRER" => Ok(ShareRole::Referrer),
            "MANAGER" => Ok(ShareRole::Manager),
            other => Err(format!("unknown share role '{other}'")),
        }
    }
}

/// Fraction of the remaining commission `role` receives under `rank_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankShare {
    pub rank_id: i64,
    pub role: ShareRole,
    pub pct: Decimal,
}

impl RankShare {
    pub const COLUMNS: &'static str = "rank_id, role, pct";

    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            rank_id: column(row, "rank_id")?,
            role: label_column(row, "role")?,
            pct: column(row, "pct")?,
        })
    }
}

/// Temporal assignment of a user to a rank. `effective_to = None` is open-ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRank {
    pub id: i64,
    pub user_id: i64,
    pub rank_id: i64,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
}

impl UserRank {
    pub const COLUMNS: &'static str = "id, user_id, rank_id, effective_from, effective_to";

    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            user_id: column(row, "user_id")?,
            rank_id: column(row, "rank_id")?,
            effective_from: column(row, "effective_from")?,
            effective_to: column(row, "effective_to")?,
        })
    }

    /// Both bounds are inclusive.
    pub fn is_effective_at(&self, as_of: DateTime<Utc>) -> bool {
        self.effective_from <= as_of && self.effective_to.map_or(true, |to| to >= as_of)
    }

    pub fn is_open_ended(&self) -> bool {
        self.effective_to.is_none()
    }
}
