//! Persistence seam for settlement.
//!
//! [`CommissionStore`] is the set of reads and writes the engine performs; [`StoreProvider`]
//! decides where a unit of work runs and makes the transactional closure all-or-nothing.
//!
//! - [`PgStore`] runs the SQL over any [`Executor`](crate::Executor): a pooled connection for
//!   reads, a [`Transaction`](crate::transaction::Transaction) for settlements.
//! - [`MemoryStore`] keeps everything in process; used by tests and embedders without PostgreSQL.

mod memory;
mod postgres;

pub use memory::{MemoryStore, MemoryTx};
pub use postgres::{PgStore, PgStoreProvider};

use crate::error::CommissionError;
use crate::model::{
    AppUser, Booking, BookingStatus, NewLedgerEntry, NewWalletTransaction, Product, Rank,
    RankShare, RevenueLedger, ShareRole, UserRank, Wallet, WalletTransaction,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub type StoreResult<T> = Result<T, CommissionError>;

/// Reads and writes used by settlement.
///
/// Methods take `&self`; write isolation comes from the unit of work the store was opened in.
pub trait CommissionStore {
    fn find_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>>;

    /// Like `find_booking`, but holds the row until the unit of work ends (`FOR UPDATE`).
    fn lock_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>>;

    fn set_booking_status(
        &self,
        booking_id: i64,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Ids of every `COMPLETED` booking, ascending.
    fn completed_booking_ids(&self) -> StoreResult<Vec<i64>>;

    fn find_product(&self, product_id: i64) -> StoreResult<Option<Product>>;

    fn find_user(&self, user_id: i64) -> StoreResult<Option<AppUser>>;

    /// Assignments of `user_id` effective at `as_of`, in no particular order.
    fn find_effective_user_ranks(
        &self,
        user_id: i64,
        as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<UserRank>>;

    /// Assignments of `user_id` with no `effective_to`, whatever their start.
    fn count_open_ended_user_ranks(&self, user_id: i64) -> StoreResult<i64>;

    fn find_rank(&self, rank_id: i64) -> StoreResult<Option<Rank>>;

    fn find_rank_share(&self, rank_id: i64, role: ShareRole) -> StoreResult<Option<RankShare>>;

    /// Returns how many rows were removed.
    fn delete_ledger_for_booking(&self, booking_id: i64) -> StoreResult<u64>;

    fn insert_ledger_entry(&self, entry: &NewLedgerEntry) -> StoreResult<RevenueLedger>;

    /// Rows of one booking ordered by id.
    fn ledger_for_booking(&self, booking_id: i64) -> StoreResult<Vec<RevenueLedger>>;

    fn find_wallet(&self, user_id: i64) -> StoreResult<Option<Wallet>>;

    /// Creates a zero-balance wallet unless one already exists.
    fn create_wallet(&self, user_id: i64) -> StoreResult<()>;

    /// Adds `delta` in one atomic step and returns the balance after the change.
    fn increment_wallet_balance(&self, user_id: i64, delta: Decimal) -> StoreResult<Decimal>;

    fn insert_wallet_transaction(
        &self,
        transaction: &NewWalletTransaction,
    ) -> StoreResult<WalletTransaction>;

    /// Audit rows of one booking ordered by id.
    fn wallet_transactions_for_booking(
        &self,
        booking_id: i64,
    ) -> StoreResult<Vec<WalletTransaction>>;
}

/// Opens units of work over a [`CommissionStore`].
pub trait StoreProvider {
    /// Runs `work` without a transaction. Used for previews and read paths.
    fn read<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn CommissionStore) -> StoreResult<T>;

    /// Runs `work` in one transaction: committed when it returns `Ok`, rolled back otherwise.
    fn transaction<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn CommissionStore) -> StoreResult<T>;
}
