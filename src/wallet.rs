//! Wallet balance updates with an audit trail.
//!
//! Balances only change through `CommissionStore::increment_wallet_balance`, one atomic
//! statement per credit, and every change leaves a `WalletTransaction` carrying the balance
//! that statement returned.

use crate::calculator::CommissionSplit;
use crate::model::{NewWalletTransaction, WalletTransaction, WalletTransactionKind};
use crate::store::{CommissionStore, StoreResult};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "metrics")]
use rust_decimal::prelude::ToPrimitive;

/// One credit to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletCredit {
    pub user_id: i64,
    pub amount: Decimal,
    pub booking_id: i64,
    pub settlement_id: Uuid,
    pub kind: WalletTransactionKind,
}

impl WalletCredit {
    /// Credits a split pays out, sorted by user id so concurrent settlements lock wallets in
    /// the same order.
    pub fn for_split(split: &CommissionSplit, settlement_id: Uuid) -> Vec<WalletCredit> {
        let mut credits = vec![(
            split.provider.user_id,
            split.provider.amount,
            WalletTransactionKind::CommissionProvider,
        )];
        credits.push((
            split.seller.user_id,
            split.seller.amount,
            WalletTransactionKind::CommissionSeller,
        ));
        if let Some(referrer) = &split.referrer {
            credits.push((
                referrer.user_id,
                referrer.amount,
                WalletTransactionKind::CommissionReferrer,
            ));
        }
        if let Some(manager) = &split.manager {
            credits.push((
                manager.user_id,
                manager.amount,
                WalletTransactionKind::CommissionManager,
            ));
        }

        let mut credits: Vec<WalletCredit> = credits
            .into_iter()
            .filter(|(_, amount, _)| *amount > Decimal::ZERO)
            .map(|(user_id, amount, kind)| WalletCredit {
                user_id,
                amount,
                booking_id: split.booking_id,
                settlement_id,
                kind,
            })
            .collect();
        credits.sort_by_key(|credit| credit.user_id);
        credits
    }
}

pub struct WalletCreditor<'s> {
    store: &'s dyn CommissionStore,
}

impl<'s> WalletCreditor<'s> {
    pub fn new(store: &'s dyn CommissionStore) -> Self {
        Self { store }
    }

    /// Apply one credit. Non-positive amounts are skipped and return `None`.
    pub fn credit(&self, credit: &WalletCredit) -> StoreResult<Option<WalletTransaction>> {
        if credit.amount <= Decimal::ZERO {
            return Ok(None);
        }
        let row = self.apply(
            credit.user_id,
            credit.amount,
            credit.booking_id,
            credit.settlement_id,
            credit.kind,
        )?;

        #[cfg(feature = "metrics")]
        METRICS.record_credit(credit.amount.to_f64().unwrap_or_default(), credit.kind.as_str());

        Ok(Some(row))
    }

    /// Apply every credit in order; skipped ones are left out of the result.
    pub fn credit_all(&self, credits: &[WalletCredit]) -> StoreResult<Vec<WalletTransaction>> {
        let mut rows = Vec::with_capacity(credits.len());
        for credit in credits {
            if let Some(row) = self.credit(credit)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Debit whatever a booking's earlier settlements still hold in each wallet.
    ///
    /// The net of all prior rows per user is undone with one `COMMISSION_REVERSAL` row, so
    /// reversing twice is a no-op.
    pub fn reverse(
        &self,
        booking_id: i64,
        settlement_id: Uuid,
    ) -> StoreResult<Vec<WalletTransaction>> {
        let mut outstanding: BTreeMap<i64, Decimal> = BTreeMap::new();
        for row in self.store.wallet_transactions_for_booking(booking_id)? {
            *outstanding.entry(row.user_id).or_default() += row.amount;
        }

        let mut rows = Vec::new();
        for (user_id, net) in outstanding {
            if net <= Decimal::ZERO {
                continue;
            }
            rows.push(self.apply(
                user_id,
                -net,
                booking_id,
                settlement_id,
                WalletTransactionKind::CommissionReversal,
            )?);
        }
        if !rows.is_empty() {
            log::info!(
                "booking {}: reversed commission credits in {} wallets",
                booking_id,
                rows.len()
            );
        }
        Ok(rows)
    }

    fn apply(
        &self,
        user_id: i64,
        amount: Decimal,
        booking_id: i64,
        settlement_id: Uuid,
        kind: WalletTransactionKind,
    ) -> StoreResult<WalletTransaction> {
        self.store.create_wallet(user_id)?;
        let balance_after = self.store.increment_wallet_balance(user_id, amount)?;
        log::debug!(
            "wallet {}: {} {} for booking {}, balance {}",
            user_id,
            kind,
            amount,
            booking_id,
            balance_after
        );
        self.store.insert_wallet_transaction(&NewWalletTransaction {
            user_id,
            booking_id,
            settlement_id,
            kind,
            amount,
            balance_after,
        })
    }
}
