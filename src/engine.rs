//! Commission settlement entry points.
//!
//! [`CommissionEngine`] reacts to booking status changes. A change to `COMPLETED` loads the
//! booking graph, computes the split and writes ledger rows and wallet credits in the same
//! transaction as the status update, so either all of it is visible or none of it is.

use crate::calculator::{compute, CalculationInput, CommissionSplit};
use crate::error::{CommissionError, Entity};
use crate::ledger::LedgerWriter;
use crate::model::{Booking, BookingStatus, RevenueLedger, WalletTransaction};
use crate::pool::config::{CommissionSettings, ReplayPolicy};
use crate::resolver::RankShareResolver;
use crate::store::{CommissionStore, StoreProvider, StoreResult};
use crate::wallet::{WalletCredit, WalletCreditor};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Instant;
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Hypothetical booking for UI quoting.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    pub product_id: i64,
    pub price: Decimal,
    pub seller_user_id: i64,
    pub referrer_user_id: Option<i64>,
    pub manager_user_id: Option<i64>,
}

/// Outcome of [`CommissionEngine::recalculate_all`].
#[derive(Debug, Default)]
pub struct RecalculationReport {
    pub processed: Vec<i64>,
    pub failed: Vec<(i64, CommissionError)>,
}

impl RecalculationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct CommissionEngine<P: StoreProvider> {
    provider: P,
    settings: CommissionSettings,
}

impl<P: StoreProvider> CommissionEngine<P> {
    pub fn new(provider: P) -> Self {
        Self::with_settings(provider, CommissionSettings::default())
    }

    pub fn with_settings(provider: P, settings: CommissionSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn settings(&self) -> &CommissionSettings {
        &self.settings
    }

    /// Record a booking's new status; settle its commission when it becomes `COMPLETED`.
    ///
    /// Returns the split that was written, or `None` when nothing was settled.
    pub fn on_booking_status_changed(
        &self,
        booking_id: i64,
        new_status: BookingStatus,
    ) -> Result<Option<CommissionSplit>, CommissionError> {
        self.on_booking_status_changed_at(booking_id, new_status, Utc::now())
    }

    /// Like [`on_booking_status_changed`](Self::on_booking_status_changed), resolving ranks at
    /// `as_of` instead of now.
    pub fn on_booking_status_changed_at(
        &self,
        booking_id: i64,
        new_status: BookingStatus,
        as_of: DateTime<Utc>,
    ) -> Result<Option<CommissionSplit>, CommissionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::settle_booking_span(booking_id, new_status.as_str()).entered();

        let start = Instant::now();
        let policy = self.settings.replay_policy;
        let outcome = self.provider.transaction(|store| {
            let booking = store
                .lock_booking(booking_id)?
                .ok_or_else(|| CommissionError::not_found(Entity::Booking, booking_id))?;
            let previous = booking.status;
            store.set_booking_status(booking_id, new_status, Utc::now())?;

            if new_status != BookingStatus::Completed {
                if previous == BookingStatus::Completed {
                    // Settled commission stays until someone recalculates.
                    log::warn!(
                        "booking {} moved from COMPLETED to {}; ledger and wallets left unchanged",
                        booking_id,
                        new_status
                    );
                }
                return Ok(None);
            }

            // A booking can leave COMPLETED and come back; its stored rows still count.
            if is_settled(store, booking_id)? {
                match policy {
                    ReplayPolicy::Skip => {
                        log::info!("booking {} already settled, skipping", booking_id);
                        return Ok(None);
                    }
                    ReplayPolicy::Recalculate => {
                        log::info!("booking {} already settled, recalculating", booking_id);
                        return settle(store, &booking, as_of, true).map(Some);
                    }
                }
            }

            settle(store, &booking, as_of, false).map(Some)
        });

        match &outcome {
            Ok(Some(_)) => record_settled(start),
            Ok(None) => {}
            Err(e) => record_failure(booking_id, e),
        }
        outcome
    }

    /// Quote a hypothetical booking. Nothing is written; the split carries booking id 0.
    pub fn get_commission_preview(
        &self,
        request: &PreviewRequest,
    ) -> Result<CommissionSplit, CommissionError> {
        self.get_commission_preview_at(request, Utc::now())
    }

    pub fn get_commission_preview_at(
        &self,
        request: &PreviewRequest,
        as_of: DateTime<Utc>,
    ) -> Result<CommissionSplit, CommissionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::preview_span(request.product_id).entered();

        self.provider.read(|store| {
            let input = load_input(
                store,
                &Participants {
                    booking_id: 0,
                    product_id: request.product_id,
                    price: request.price,
                    seller_user_id: request.seller_user_id,
                    referrer_user_id: request.referrer_user_id,
                    manager_user_id: request.manager_user_id,
                },
                as_of,
            )?;
            let split = compute(&input)?;
            record_anomalies(&split);
            Ok(split)
        })
    }

    /// Stored ledger rows of a booking, ordered by id.
    pub fn ledger_for_booking(
        &self,
        booking_id: i64,
    ) -> Result<Vec<RevenueLedger>, CommissionError> {
        self.provider
            .read(|store| LedgerWriter::new(store).read(booking_id))
    }

    /// Wallet audit rows of a booking, ordered by id.
    pub fn wallet_transactions_for_booking(
        &self,
        booking_id: i64,
    ) -> Result<Vec<WalletTransaction>, CommissionError> {
        self.provider
            .read(|store| store.wallet_transactions_for_booking(booking_id))
    }

    /// Current balance; zero for users who were never credited.
    pub fn wallet_balance(&self, user_id: i64) -> Result<Decimal, CommissionError> {
        self.provider.read(|store| {
            Ok(store
                .find_wallet(user_id)?
                .map_or(Decimal::ZERO, |wallet| wallet.balance))
        })
    }

    /// Settle a `COMPLETED` booking again with ranks resolved at `as_of`.
    ///
    /// Earlier credits are reversed and the ledger is replaced under a new settlement id, so
    /// the net wallet effect equals the new split.
    pub fn recalculate_booking(
        &self,
        booking_id: i64,
        as_of: DateTime<Utc>,
    ) -> Result<CommissionSplit, CommissionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::recalculate_booking_span(booking_id).entered();

        let start = Instant::now();
        let outcome = self.provider.transaction(|store| {
            let booking = store
                .lock_booking(booking_id)?
                .ok_or_else(|| CommissionError::not_found(Entity::Booking, booking_id))?;
            if booking.status != BookingStatus::Completed {
                return Err(CommissionError::Configuration(format!(
                    "booking {} is {}, only COMPLETED bookings can be recalculated",
                    booking_id, booking.status
                )));
            }
            settle(store, &booking, as_of, true)
        });

        match &outcome {
            Ok(_) => record_settled(start),
            Err(e) => record_failure(booking_id, e),
        }
        outcome
    }

    /// Recalculate every completed booking, each in its own transaction.
    pub fn recalculate_all(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<RecalculationReport, CommissionError> {
        let booking_ids = self.provider.read(|store| store.completed_booking_ids())?;
        log::info!("recalculating {} completed bookings", booking_ids.len());

        let mut report = RecalculationReport::default();
        for booking_id in booking_ids {
            match self.recalculate_booking(booking_id, as_of) {
                Ok(_) => report.processed.push(booking_id),
                Err(e) => report.failed.push((booking_id, e)),
            }
        }
        if !report.is_clean() {
            log::warn!(
                "recalculation finished with {} failures out of {}",
                report.failed.len(),
                report.failed.len() + report.processed.len()
            );
        }
        Ok(report)
    }

    /// Check that a booking's stored rows add up to its commission pool.
    ///
    /// Returns the pool on success and `CommissionError::Anomaly` on a mismatch.
    pub fn verify_ledger(&self, booking_id: i64) -> Result<Decimal, CommissionError> {
        self.provider.read(|store| {
            let booking = store
                .find_booking(booking_id)?
                .ok_or_else(|| CommissionError::not_found(Entity::Booking, booking_id))?;
            let product = store
                .find_product(booking.product_id)?
                .ok_or_else(|| CommissionError::not_found(Entity::Product, booking.product_id))?;
            let expected = crate::calculator::round_amount(booking.price * product.commission_pct);
            let actual: Decimal = store
                .ledger_for_booking(booking_id)?
                .iter()
                .map(|row| row.amount)
                .sum();

            if actual != expected {
                log::error!(
                    "booking {}: ledger sums to {} but the pool is {}",
                    booking_id,
                    actual,
                    expected
                );
                #[cfg(feature = "metrics")]
                METRICS.record_anomaly("ledger_mismatch");
                return Err(CommissionError::Anomaly {
                    booking_id,
                    expected,
                    actual,
                });
            }
            Ok(expected)
        })
    }
}

/// Who takes part in a (possibly hypothetical) booking.
struct Participants {
    booking_id: i64,
    product_id: i64,
    price: Decimal,
    seller_user_id: i64,
    referrer_user_id: Option<i64>,
    manager_user_id: Option<i64>,
}

impl From<&Booking> for Participants {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            product_id: booking.product_id,
            price: booking.price,
            seller_user_id: booking.seller_user_id,
            referrer_user_id: booking.referrer_user_id,
            manager_user_id: booking.manager_user_id,
        }
    }
}

fn require_user(store: &dyn CommissionStore, user_id: i64) -> StoreResult<()> {
    store
        .find_user(user_id)?
        .map(|_| ())
        .ok_or_else(|| CommissionError::not_found(Entity::User, user_id))
}

fn load_input(
    store: &dyn CommissionStore,
    participants: &Participants,
    as_of: DateTime<Utc>,
) -> StoreResult<CalculationInput> {
    let product = store
        .find_product(participants.product_id)?
        .ok_or_else(|| CommissionError::not_found(Entity::Product, participants.product_id))?;

    require_user(store, product.owner_user_id)?;
    require_user(store, participants.seller_user_id)?;
    for user_id in [participants.referrer_user_id, participants.manager_user_id]
        .into_iter()
        .flatten()
    {
        require_user(store, user_id)?;
    }

    let rank_shares =
        RankShareResolver::new(store).resolve_rank_shares(participants.seller_user_id, as_of)?;

    Ok(CalculationInput {
        booking_id: participants.booking_id,
        price: participants.price,
        commission_pct: product.commission_pct,
        provider_desired_pct: product.provider_desired_pct,
        provider_user_id: product.owner_user_id,
        seller_user_id: participants.seller_user_id,
        referrer_user_id: participants.referrer_user_id,
        manager_user_id: participants.manager_user_id,
        shares: rank_shares.shares,
    })
}

/// Compute and persist one booking's split inside the caller's transaction.
fn settle(
    store: &dyn CommissionStore,
    booking: &Booking,
    as_of: DateTime<Utc>,
    reverse_previous: bool,
) -> StoreResult<CommissionSplit> {
    let input = load_input(store, &Participants::from(booking), as_of)?;
    let split = compute(&input)?;
    record_anomalies(&split);

    let settlement_id = Uuid::new_v4();
    let creditor = WalletCreditor::new(store);
    if reverse_previous {
        creditor.reverse(booking.id, settlement_id)?;
    }
    LedgerWriter::new(store).write(&split, settlement_id)?;
    creditor.credit_all(&WalletCredit::for_split(&split, settlement_id))?;

    log::info!(
        "booking {} settled: pool {}, provider {}, seller {}, residual {} (settlement {})",
        booking.id,
        split.pool,
        split.provider.amount,
        split.seller.amount,
        split.system_residual,
        settlement_id
    );
    Ok(split)
}

fn is_settled(store: &dyn CommissionStore, booking_id: i64) -> StoreResult<bool> {
    Ok(!LedgerWriter::new(store).read(booking_id)?.is_empty()
        || !store.wallet_transactions_for_booking(booking_id)?.is_empty())
}

fn record_anomalies(split: &CommissionSplit) {
    for anomaly in &split.anomalies {
        log::warn!("booking {}: commission anomaly {:?}", split.booking_id, anomaly);
        #[cfg(feature = "metrics")]
        METRICS.record_anomaly(anomaly.kind());
    }
}

fn record_settled(start: Instant) {
    let elapsed = start.elapsed();
    log::debug!("settlement committed in {:?}", elapsed);
    #[cfg(feature = "metrics")]
    METRICS.record_settlement(elapsed);
}

fn record_failure(booking_id: i64, error: &CommissionError) {
    log::error!(
        "settlement of booking {} rolled back ({}): {}",
        booking_id,
        error.kind(),
        error
    );
    #[cfg(feature = "metrics")]
    METRICS.record_settlement_failure(error.kind());
}
