//! In-process `CommissionStore`.
//!
//! A transaction works on a copy of the state taken under the store's mutex and swaps it in
//! on success, so units of work are fully serialized and a failed one leaves nothing behind.

use super::{CommissionStore, StoreProvider, StoreResult};
use crate::error::{CommissionError, Entity};
use crate::executor::DbError;
use crate::model::{
    AppUser, Booking, BookingStatus, NewLedgerEntry, NewWalletTransaction, Product, Rank,
    RankShare, RevenueLedger, ShareRole, UserRank, Wallet, WalletTransaction,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    bookings: BTreeMap<i64, Booking>,
    products: HashMap<i64, Product>,
    users: HashMap<i64, AppUser>,
    ranks: HashMap<i64, Rank>,
    rank_shares: HashMap<(i64, ShareRole), RankShare>,
    user_ranks: Vec<UserRank>,
    ledger: Vec<RevenueLedger>,
    wallets: BTreeMap<i64, Wallet>,
    wallet_transactions: Vec<WalletTransaction>,
    next_ledger_id: i64,
    next_wallet_transaction_id: i64,
    failing_wallets: HashSet<i64>,
}

/// Thread-safe in-memory store seeded through its `insert_*` methods.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| CommissionError::Transaction("memory store mutex poisoned".to_string()))
    }

    fn seed(&self, apply: impl FnOnce(&mut MemoryState)) {
        // Seeding happens in test setup; a poisoned mutex there is already a failed test.
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut state);
    }

    pub fn insert_booking(&self, booking: Booking) {
        self.seed(|s| {
            s.bookings.insert(booking.id, booking);
        });
    }

    pub fn insert_product(&self, product: Product) {
        self.seed(|s| {
            s.products.insert(product.id, product);
        });
    }

    pub fn insert_user(&self, user: AppUser) {
        self.seed(|s| {
            s.users.insert(user.id, user);
        });
    }

    pub fn insert_rank(&self, rank: Rank) {
        self.seed(|s| {
            s.ranks.insert(rank.id, rank);
        });
    }

    pub fn insert_rank_share(&self, share: RankShare) {
        self.seed(|s| {
            s.rank_shares.insert((share.rank_id, share.role), share);
        });
    }

    pub fn insert_user_rank(&self, assignment: UserRank) {
        self.seed(|s| s.user_ranks.push(assignment));
    }

    /// Makes every later balance change of `user_id` fail like a lost connection would.
    pub fn fail_wallet_updates_for(&self, user_id: i64) {
        self.seed(|s| {
            s.failing_wallets.insert(user_id);
        });
    }

    pub fn clear_wallet_failures(&self) {
        self.seed(|s| s.failing_wallets.clear());
    }
}

impl StoreProvider for MemoryStore {
    fn read<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn CommissionStore) -> StoreResult<T>,
    {
        let mut guard = self.lock()?;
        let view = MemoryTx {
            state: RefCell::new(&mut *guard),
        };
        work(&view)
    }

    fn transaction<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn CommissionStore) -> StoreResult<T>,
    {
        let mut guard = self.lock()?;
        let mut staged = guard.clone();
        let outcome = {
            let tx = MemoryTx {
                state: RefCell::new(&mut staged),
            };
            work(&tx)
        };
        if outcome.is_ok() {
            *guard = staged;
        }
        outcome
    }
}

/// A unit of work over the in-memory state.
pub struct MemoryTx<'a> {
    state: RefCell<&'a mut MemoryState>,
}

impl CommissionStore for MemoryTx<'_> {
    fn find_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        Ok(self.state.borrow().bookings.get(&booking_id).cloned())
    }

    fn lock_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        // The store mutex already serializes units of work.
        self.find_booking(booking_id)
    }

    fn set_booking_status(
        &self,
        booking_id: i64,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.borrow_mut();
        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| CommissionError::not_found(Entity::Booking, booking_id))?;
        booking.status = status;
        booking.updated_at = at;
        Ok(())
    }

    fn completed_booking_ids(&self) -> StoreResult<Vec<i64>> {
        Ok(self
            .state
            .borrow()
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Completed)
            .map(|b| b.id)
            .collect())
    }

    fn find_product(&self, product_id: i64) -> StoreResult<Option<Product>> {
        Ok(self.state.borrow().products.get(&product_id).cloned())
    }

    fn find_user(&self, user_id: i64) -> StoreResult<Option<AppUser>> {
        Ok(self.state.borrow().users.get(&user_id).cloned())
    }

    fn find_effective_user_ranks(
        &self,
        user_id: i64,
        as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<UserRank>> {
        Ok(self
            .state
            .borrow()
            .user_ranks
            .iter()
            .filter(|ur| ur.user_id == user_id && ur.is_effective_at(as_of))
            .cloned()
            .collect())
    }

    fn count_open_ended_user_ranks(&self, user_id: i64) -> StoreResult<i64> {
        let count = self
            .state
            .borrow()
            .user_ranks
            .iter()
            .filter(|ur| ur.user_id == user_id && ur.is_open_ended())
            .count();
        Ok(count as i64)
    }

    fn find_rank(&self, rank_id: i64) -> StoreResult<Option<Rank>> {
        Ok(self.state.borrow().ranks.get(&rank_id).cloned())
    }

    fn find_rank_share(&self, rank_id: i64, role: ShareRole) -> StoreResult<Option<RankShare>> {
        Ok(self.state.borrow().rank_shares.get(&(rank_id, role)).cloned())
    }

    fn delete_ledger_for_booking(&self, booking_id: i64) -> StoreResult<u64> {
        let mut state = self.state.borrow_mut();
        let before = state.ledger.len();
        state.ledger.retain(|row| row.booking_id != booking_id);
        Ok((before - state.ledger.len()) as u64)
    }

    fn insert_ledger_entry(&self, entry: &NewLedgerEntry) -> StoreResult<RevenueLedger> {
        let mut state = self.state.borrow_mut();
        state.next_ledger_id += 1;
        let row = RevenueLedger {
            id: state.next_ledger_id,
            booking_id: entry.booking_id,
            settlement_id: entry.settlement_id,
            role: entry.role,
            beneficiary_user_id: entry.beneficiary_user_id,
            amount: entry.amount,
            pct: entry.pct,
            created_at: Utc::now(),
        };
        state.ledger.push(row.clone());
        Ok(row)
    }

    fn ledger_for_booking(&self, booking_id: i64) -> StoreResult<Vec<RevenueLedger>> {
        Ok(self
            .state
            .borrow()
            .ledger
            .iter()
            .filter(|row| row.booking_id == booking_id)
            .cloned()
            .collect())
    }

    fn find_wallet(&self, user_id: i64) -> StoreResult<Option<Wallet>> {
        Ok(self.state.borrow().wallets.get(&user_id).cloned())
    }

    fn create_wallet(&self, user_id: i64) -> StoreResult<()> {
        let now = Utc::now();
        self.state
            .borrow_mut()
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet {
                user_id,
                balance: Decimal::ZERO,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    fn increment_wallet_balance(&self, user_id: i64, delta: Decimal) -> StoreResult<Decimal> {
        let mut state = self.state.borrow_mut();
        if state.failing_wallets.contains(&user_id) {
            return Err(CommissionError::Database(DbError::Other(format!(
                "connection lost while updating wallet {user_id}"
            ))));
        }
        let wallet = state
            .wallets
            .get_mut(&user_id)
            .ok_or_else(|| CommissionError::not_found(Entity::Wallet, user_id))?;
        wallet.balance += delta;
        wallet.updated_at = Utc::now();
        Ok(wallet.balance)
    }

    fn insert_wallet_transaction(
        &self,
        transaction: &NewWalletTransaction,
    ) -> StoreResult<WalletTransaction> {
        let mut state = self.state.borrow_mut();
        state.next_wallet_transaction_id += 1;
        let row = WalletTransaction {
            id: state.next_wallet_transaction_id,
            user_id: transaction.user_id,
            booking_id: transaction.booking_id,
            settlement_id: transaction.settlement_id,
            kind: transaction.kind,
            amount: transaction.amount,
            balance_after: transaction.balance_after,
            created_at: Utc::now(),
        };
        state.wallet_transactions.push(row.clone());
        Ok(row)
    }

    fn wallet_transactions_for_booking(
        &self,
        booking_id: i64,
    ) -> StoreResult<Vec<WalletTransaction>> {
        Ok(self
            .state
            .borrow()
            .wallet_transactions
            .iter()
            .filter(|row| row.booking_id == booking_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn entry(booking_id: i64) -> NewLedgerEntry {
        NewLedgerEntry {
            booking_id,
            settlement_id: Uuid::nil(),
            role: crate::model::LedgerRole::System,
            beneficiary_user_id: None,
            amount: dec!(10),
            pct: dec!(0.1),
        }
    }

    #[test]
    fn test_failed_transaction_discards_staged_writes() {
        let store = MemoryStore::new();
        let result: StoreResult<()> = store.transaction(|tx| {
            tx.insert_ledger_entry(&entry(1))?;
            Err(CommissionError::Configuration("abort".to_string()))
        });
        assert!(result.is_err());

        let rows = store.read(|s| s.ledger_for_booking(1)).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_committed_transaction_is_visible() {
        let store = MemoryStore::new();
        store
            .transaction(|tx| {
                tx.insert_ledger_entry(&entry(1))?;
                tx.insert_ledger_entry(&entry(2))?;
                Ok(())
            })
            .unwrap();

        let deleted = store.transaction(|tx| tx.delete_ledger_for_booking(1)).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.read(|s| s.ledger_for_booking(2)).unwrap().len(), 1);
    }

    #[test]
    fn test_increment_requires_wallet() {
        let store = MemoryStore::new();
        let err = store
            .transaction(|tx| tx.increment_wallet_balance(9, dec!(5)))
            .unwrap_err();
        assert!(matches!(
            err,
            CommissionError::NotFound {
                entity: Entity::Wallet,
                id: 9
            }
        ));

        let balance = store
            .transaction(|tx| {
                tx.create_wallet(9)?;
                tx.create_wallet(9)?;
                tx.increment_wallet_balance(9, dec!(5))
            })
            .unwrap();
        assert_eq!(balance, dec!(5));
    }
}
