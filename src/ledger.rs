//! Immutable ledger of commission splits.
//!
//! Rows are never updated. Settling a booking again replaces its rows wholesale inside the same
//! transaction, so a booking's ledger always reflects exactly one settlement.

use crate::calculator::{CommissionSplit, Payout};
use crate::model::{LedgerRole, NewLedgerEntry, RevenueLedger};
use crate::store::{CommissionStore, StoreResult};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

/// Decimal places kept for stored percentages.
pub const PCT_SCALE: u32 = 6;

fn stored_pct(pct: Decimal) -> Decimal {
    pct.round_dp_with_strategy(PCT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub struct LedgerWriter<'s> {
    store: &'s dyn CommissionStore,
}

impl<'s> LedgerWriter<'s> {
    pub fn new(store: &'s dyn CommissionStore) -> Self {
        Self { store }
    }

    /// Rows a split turns into: one per participant with a non-zero amount, plus a `System`
    /// row without beneficiary when there is a residual.
    pub fn entries(split: &CommissionSplit, settlement_id: Uuid) -> Vec<NewLedgerEntry> {
        let participant = |role: LedgerRole, payout: &Payout| NewLedgerEntry {
            booking_id: split.booking_id,
            settlement_id,
            role,
            beneficiary_user_id: Some(payout.user_id),
            amount: payout.amount,
            pct: stored_pct(payout.pct),
        };

        let mut entries = vec![
            participant(LedgerRole::Provider, &split.provider),
            participant(LedgerRole::Seller, &split.seller),
        ];
        if let Some(referrer) = &split.referrer {
            entries.push(participant(LedgerRole::Referrer, referrer));
        }
        if let Some(manager) = &split.manager {
            entries.push(participant(LedgerRole::Manager, manager));
        }
        entries.retain(|entry| entry.amount > Decimal::ZERO);

        if split.system_residual > Decimal::ZERO {
            let remaining = split.remaining();
            // Residual as a fraction of the remaining commission, like the participant shares.
            let pct = if remaining.is_zero() {
                Decimal::ZERO
            } else {
                split.system_residual / remaining
            };
            entries.push(NewLedgerEntry {
                booking_id: split.booking_id,
                settlement_id,
                role: LedgerRole::System,
                beneficiary_user_id: None,
                amount: split.system_residual,
                pct: stored_pct(pct),
            });
        }
        entries
    }

    /// Replace the booking's rows with the ones for `split`.
    pub fn write(
        &self,
        split: &CommissionSplit,
        settlement_id: Uuid,
    ) -> StoreResult<Vec<RevenueLedger>> {
        let purged = self.store.delete_ledger_for_booking(split.booking_id)?;
        if purged > 0 {
            log::info!(
                "booking {}: replaced {} ledger rows (settlement {})",
                split.booking_id,
                purged,
                settlement_id
            );
        }

        let rows = Self::entries(split, settlement_id)
            .iter()
            .map(|entry| self.store.insert_ledger_entry(entry))
            .collect::<StoreResult<Vec<_>>>()?;
        log::debug!(
            "booking {}: wrote {} ledger rows",
            split.booking_id,
            rows.len()
        );
        Ok(rows)
    }

    /// Stored rows of a booking, ordered by id.
    pub fn read(&self, booking_id: i64) -> StoreResult<Vec<RevenueLedger>> {
        self.store.ledger_for_booking(booking_id)
    }
}
