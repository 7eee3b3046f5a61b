//! Rows read from the marketplace schema and written to the ledger schema.
//!
//! Bookings, products, users, ranks and rank assignments are owned by upstream CRUD flows and
//! are read only here. Ledger rows, wallets and wallet transactions are written by settlement.

mod booking;
mod ledger;
mod product;
mod rank;
mod wallet;

pub use booking::{Booking, BookingStatus};
pub use ledger::{LedgerRole, NewLedgerEntry, RevenueLedger};
pub use product::{AppUser, Product};
pub use rank::{Rank, RankShare, ShareRole, UserRank};
pub use wallet::{NewWalletTransaction, Wallet, WalletTransaction, WalletTransactionKind};

use crate::executor::DbError;
use may_postgres::types::FromSql;
use may_postgres::Row;

/// Reads a named column, turning decode failures into `DbError::ParseError`.
pub(crate) fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T, DbError> {
    row.try_get::<&str, T>(name)
        .map_err(|e| DbError::ParseError(format!("column {name}: {e}")))
}

/// Reads a text column holding one of the crate's upper-case enum labels.
pub(crate) fn label_column<T>(row: &Row, name: &str) -> Result<T, DbError>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = column(row, name)?;
    raw.parse::<T>().map_err(DbError::ParseError)
}
