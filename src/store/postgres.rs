//! `CommissionStore` over PostgreSQL.

use super::{CommissionStore, StoreProvider, StoreResult};
use crate::error::{CommissionError, Entity};
use crate::executor::Executor;
use crate::model::{
    AppUser, Booking, BookingStatus, NewLedgerEntry, NewWalletTransaction, Product, Rank,
    RankShare, RevenueLedger, ShareRole, UserRank, Wallet, WalletTransaction,
};
use crate::pool::ConnectionPool;
use crate::transaction::IsolationLevel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Runs the store's SQL over a borrowed executor.
pub struct PgStore<'a> {
    executor: &'a dyn Executor,
}

impl<'a> PgStore<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        Self { executor }
    }
}

impl CommissionStore for PgStore<'_> {
    fn find_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", Booking::COLUMNS);
        let row = self.executor.query_opt(&sql, &[&booking_id])?;
        Ok(row.as_ref().map(Booking::from_row).transpose()?)
    }

    fn lock_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            Booking::COLUMNS
        );
        let row = self.executor.query_opt(&sql, &[&booking_id])?;
        Ok(row.as_ref().map(Booking::from_row).transpose()?)
    }

    fn set_booking_status(
        &self,
        booking_id: i64,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let affected = self.executor.execute(
            "UPDATE bookings SET status = $1, updated_at = $2 WHERE id = $3",
            &[&status.as_str(), &at, &booking_id],
        )?;
        if affected == 0 {
            return Err(CommissionError::not_found(Entity::Booking, booking_id));
        }
        Ok(())
    }

    fn completed_booking_ids(&self) -> StoreResult<Vec<i64>> {
        let rows = self.executor.query_all(
            "SELECT id FROM bookings WHERE status = $1 ORDER BY id",
            &[&BookingStatus::Completed.as_str()],
        )?;
        Ok(rows
            .iter()
            .map(|row| crate::model::column::<i64>(row, "id"))
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn find_product(&self, product_id: i64) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = $1", Product::COLUMNS);
        let row = self.executor.query_opt(&sql, &[&product_id])?;
        Ok(row.as_ref().map(Product::from_row).transpose()?)
    }

    fn find_user(&self, user_id: i64) -> StoreResult<Option<AppUser>> {
        let sql = format!("SELECT {} FROM app_users WHERE id = $1", AppUser::COLUMNS);
        let row = self.executor.query_opt(&sql, &[&user_id])?;
        Ok(row.as_ref().map(AppUser::from_row).transpose()?)
    }

    fn find_effective_user_ranks(
        &self,
        user_id: i64,
        as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<UserRank>> {
        let sql = format!(
            "SELECT {} FROM user_ranks \
             WHERE user_id = $1 AND effective_from <= $2 \
               AND (effective_to IS NULL OR effective_to >= $2) \
             ORDER BY effective_from DESC, id DESC",
            UserRank::COLUMNS
        );
        let rows = self.executor.query_all(&sql, &[&user_id, &as_of])?;
        Ok(rows
            .iter()
            .map(UserRank::from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn count_open_ended_user_ranks(&self, user_id: i64) -> StoreResult<i64> {
        let row = self.executor.query_one(
            "SELECT COUNT(*) FROM user_ranks WHERE user_id = $1 AND effective_to IS NULL",
            &[&user_id],
        )?;
        Ok(row.get(0))
    }

    fn find_rank(&self, rank_id: i64) -> StoreResult<Option<Rank>> {
        let sql = format!("SELECT {} FROM ranks WHERE id = $1", Rank::COLUMNS);
        let row = self.executor.query_opt(&sql, &[&rank_id])?;
        Ok(row.as_ref().map(Rank::from_row).transpose()?)
    }

    fn find_rank_share(&self, rank_id: i64, role: ShareRole) -> StoreResult<Option<RankShare>> {
        let sql = format!(
            "SELECT {} FROM rank_shares WHERE rank_id = $1 AND role = $2",
            RankShare::COLUMNS
        );
        let row = self.executor.query_opt(&sql, &[&rank_id, &role.as_str()])?;
        Ok(row.as_ref().map(RankShare::from_row).transpose()?)
    }

    fn delete_ledger_for_booking(&self, booking_id: i64) -> StoreResult<u64> {
        Ok(self.executor.execute(
            "DELETE FROM revenue_ledger WHERE booking_id = $1",
            &[&booking_id],
        )?)
    }

    fn insert_ledger_entry(&self, entry: &NewLedgerEntry) -> StoreResult<RevenueLedger> {
        let sql = format!(
            "INSERT INTO revenue_ledger \
             (booking_id, settlement_id, role, beneficiary_user_id, amount, pct) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            RevenueLedger::COLUMNS
        );
        let row = self.executor.query_one(
            &sql,
            &[
                &entry.booking_id,
                &entry.settlement_id,
                &entry.role.as_str(),
                &entry.beneficiary_user_id,
                &entry.amount,
                &entry.pct,
            ],
        )?;
        Ok(RevenueLedger::from_row(&row)?)
    }

    fn ledger_for_booking(&self, booking_id: i64) -> StoreResult<Vec<RevenueLedger>> {
        let sql = format!(
            "SELECT {} FROM revenue_ledger WHERE booking_id = $1 ORDER BY id",
            RevenueLedger::COLUMNS
        );
        let rows = self.executor.query_all(&sql, &[&booking_id])?;
        Ok(rows
            .iter()
            .map(RevenueLedger::from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn find_wallet(&self, user_id: i64) -> StoreResult<Option<Wallet>> {
        let sql = format!("SELECT {} FROM wallets WHERE user_id = $1", Wallet::COLUMNS);
        let row = self.executor.query_opt(&sql, &[&user_id])?;
        Ok(row.as_ref().map(Wallet::from_row).transpose()?)
    }

    fn create_wallet(&self, user_id: i64) -> StoreResult<()> {
        // Two settlements may race to create the same wallet; the loser is a no-op.
        self.executor.execute(
            "INSERT INTO wallets (user_id, balance) VALUES ($1, 0) ON CONFLICT (user_id) DO NOTHING",
            &[&user_id],
        )?;
        Ok(())
    }

    fn increment_wallet_balance(&self, user_id: i64, delta: Decimal) -> StoreResult<Decimal> {
        // Single-statement increment: the row lock serializes concurrent credits until commit.
        let row = self.executor.query_opt(
            "UPDATE wallets SET balance = balance + $1, updated_at = NOW() \
             WHERE user_id = $2 RETURNING balance",
            &[&delta, &user_id],
        )?;
        match row {
            Some(row) => Ok(crate::model::column(&row, "balance")?),
            None => Err(CommissionError::not_found(Entity::Wallet, user_id)),
        }
    }

    fn insert_wallet_transaction(
        &self,
        transaction: &NewWalletTransaction,
    ) -> StoreResult<WalletTransaction> {
        let sql = format!(
            "INSERT INTO wallet_transactions \
             (user_id, booking_id, settlement_id, kind, amount, balance_after) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            WalletTransaction::COLUMNS
        );
        let row = self.executor.query_one(
            &sql,
            &[
                &transaction.user_id,
                &transaction.booking_id,
                &transaction.settlement_id,
                &transaction.kind.as_str(),
                &transaction.amount,
                &transaction.balance_after,
            ],
        )?;
        Ok(WalletTransaction::from_row(&row)?)
    }

    fn wallet_transactions_for_booking(
        &self,
        booking_id: i64,
    ) -> StoreResult<Vec<WalletTransaction>> {
        let sql = format!(
            "SELECT {} FROM wallet_transactions WHERE booking_id = $1 ORDER BY id",
            WalletTransaction::COLUMNS
        );
        let rows = self.executor.query_all(&sql, &[&booking_id])?;
        Ok(rows
            .iter()
            .map(WalletTransaction::from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

/// Hands each unit of work its own pooled connection.
pub struct PgStoreProvider {
    pool: ConnectionPool,
    isolation_level: IsolationLevel,
}

impl PgStoreProvider {
    pub fn new(pool: ConnectionPool) -> Self {
        Self::with_isolation(pool, IsolationLevel::ReadCommitted)
    }

    pub fn with_isolation(pool: ConnectionPool, isolation_level: IsolationLevel) -> Self {
        Self {
            pool,
            isolation_level,
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl StoreProvider for PgStoreProvider {
    fn read<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn CommissionStore) -> StoreResult<T>,
    {
        let connection = self.pool.acquire()?;
        let store = PgStore::new(&*connection);
        work(&store)
    }

    fn transaction<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn CommissionStore) -> StoreResult<T>,
    {
        let connection = self.pool.acquire()?;
        let transaction = connection.begin_with_isolation(self.isolation_level)?;

        let outcome = {
            let store = PgStore::new(&transaction);
            work(&store)
        };

        match outcome {
            Ok(value) => {
                transaction.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = transaction.rollback() {
                    log::error!("rollback after '{e}' failed: {rollback_error}");
                }
                Err(e)
            }
        }
    }
}
