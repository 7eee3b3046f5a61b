//! Commission split arithmetic.
//!
//! Pure functions only: no store access, no clock. Given a booking price, the product's
//! commission and provider percentages and the seller rank's shares, [`compute`] produces the
//! amounts every participant receives.
//!
//! ```text
//! pool       = round(price * commission_pct)
//! provider   = round(price * provider_desired_pct)        capped at pool
//! remain     = pool - provider
//! C_role     = round(remain * share_role)                  shares normalized when s + r + m > 1
//! residual   = remain - (C_seller + C_referrer + C_manager) clamped at 0
//! ```
//!
//! Each amount is rounded on its own to whole currency units, half away from zero, and the
//! system residual absorbs the drift, so
//! `provider + seller + referrer + manager + residual == pool` whenever no anomaly was recorded.

use crate::error::CommissionError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Round to whole currency units, half away from zero.
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Fractions of the remaining commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Shares {
    pub seller: Decimal,
    pub referrer: Decimal,
    pub manager: Decimal,
}

impl Shares {
    pub fn sum(&self) -> Decimal {
        self.seller + self.referrer + self.manager
    }

    /// Scale down so the shares sum to exactly one. Division residue goes to the seller.
    fn normalized(&self) -> Shares {
        let total = self.sum();
        let referrer = self.referrer / total;
        let manager = self.manager / total;
        Shares {
            seller: Decimal::ONE - referrer - manager,
            referrer,
            manager,
        }
    }
}

/// Everything the arithmetic needs about one booking.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationInput {
    /// 0 for previews
    pub booking_id: i64,
    pub price: Decimal,
    pub commission_pct: Decimal,
    pub provider_desired_pct: Decimal,
    pub provider_user_id: i64,
    pub seller_user_id: i64,
    pub referrer_user_id: Option<i64>,
    pub manager_user_id: Option<i64>,
    /// Shares of the seller's effective rank
    pub shares: Shares,
}

/// One participant's cut.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payout {
    pub user_id: i64,
    pub amount: Decimal,
    /// Provider: fraction of price. Other roles: fraction of the remaining commission.
    pub pct: Decimal,
}

/// Arithmetic oddities recorded on a split instead of failing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Independent rounding overshot the remaining commission; the residual was clamped to 0.
    NegativeResidual { residual: Decimal },
    /// The provider's cut was larger than the pool and was capped.
    ProviderExceedsPool { requested: Decimal, pool: Decimal },
}

impl Anomaly {
    pub fn kind(&self) -> &'static str {
        match self {
            Anomaly::NegativeResidual { .. } => "negative_residual",
            Anomaly::ProviderExceedsPool { .. } => "provider_exceeds_pool",
        }
    }
}

/// Result of [`compute`]; also the receipt handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommissionSplit {
    pub booking_id: i64,
    pub price: Decimal,
    /// `price * commission_pct` before rounding
    pub base_commission: Decimal,
    pub pool: Decimal,
    pub provider: Payout,
    pub seller: Payout,
    pub referrer: Option<Payout>,
    pub manager: Option<Payout>,
    /// Shares after normalization
    pub shares: Shares,
    pub system_residual: Decimal,
    pub anomalies: Vec<Anomaly>,
}

impl CommissionSplit {
    /// Payouts in ledger order: provider, seller, referrer, manager.
    pub fn payouts(&self) -> impl Iterator<Item = &Payout> {
        std::iter::once(&self.provider)
            .chain(std::iter::once(&self.seller))
            .chain(self.referrer.iter())
            .chain(self.manager.iter())
    }

    /// Provider, participants and residual together; equals `pool` when nothing was clamped.
    pub fn distributed(&self) -> Decimal {
        self.payouts().map(|p| p.amount).sum::<Decimal>() + self.system_residual
    }

    pub fn remaining(&self) -> Decimal {
        self.pool - self.provider.amount
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn check_fraction(name: &str, value: Decimal) -> Result<(), CommissionError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(CommissionError::Configuration(format!(
            "{name} must be between 0 and 1, got {value}"
        )));
    }
    Ok(())
}

fn validate(input: &CalculationInput) -> Result<(), CommissionError> {
    if input.price < Decimal::ZERO {
        return Err(CommissionError::Configuration(format!(
            "booking {} has negative price {}",
            input.booking_id, input.price
        )));
    }
    check_fraction("commission_pct", input.commission_pct)?;
    check_fraction("provider_desired_pct", input.provider_desired_pct)?;
    for (role, share) in [
        ("seller", input.shares.seller),
        ("referrer", input.shares.referrer),
        ("manager", input.shares.manager),
    ] {
        if share < Decimal::ZERO {
            return Err(CommissionError::Configuration(format!(
                "{role} share is negative: {share}"
            )));
        }
    }
    Ok(())
}

/// Split one booking's commission.
pub fn compute(input: &CalculationInput) -> Result<CommissionSplit, CommissionError> {
    validate(input)?;

    let mut anomalies = Vec::new();
    let base_commission = input.price * input.commission_pct;
    let pool = round_amount(base_commission);

    let requested_provider = round_amount(input.price * input.provider_desired_pct);
    let provider_amount = if requested_provider > pool {
        if !pool.is_zero() {
            log::warn!(
                "booking {}: provider cut {} exceeds commission pool {}, capping",
                input.booking_id,
                requested_provider,
                pool
            );
            anomalies.push(Anomaly::ProviderExceedsPool {
                requested: requested_provider,
                pool,
            });
        }
        pool
    } else {
        requested_provider
    };
    let remaining = pool - provider_amount;

    // Roles missing from the booking get nothing; their share falls to the system.
    let claimed = Shares {
        seller: input.shares.seller,
        referrer: input
            .referrer_user_id
            .map_or(Decimal::ZERO, |_| input.shares.referrer),
        manager: input
            .manager_user_id
            .map_or(Decimal::ZERO, |_| input.shares.manager),
    };
    let shares = if claimed.sum() > Decimal::ONE {
        log::info!(
            "booking {}: shares sum to {}, normalizing",
            input.booking_id,
            claimed.sum()
        );
        claimed.normalized()
    } else {
        claimed
    };

    let payout = |user_id: i64, share: Decimal| Payout {
        user_id,
        amount: round_amount(remaining * share),
        pct: share,
    };
    let seller = payout(input.seller_user_id, shares.seller);
    let referrer = input.referrer_user_id.map(|id| payout(id, shares.referrer));
    let manager = input.manager_user_id.map(|id| payout(id, shares.manager));

    let participants = seller.amount
        + referrer.as_ref().map_or(Decimal::ZERO, |p| p.amount)
        + manager.as_ref().map_or(Decimal::ZERO, |p| p.amount);
    let mut system_residual = remaining - participants;
    if system_residual < Decimal::ZERO {
        log::warn!(
            "booking {}: participant payouts {} exceed remaining commission {}, residual {} clamped to 0",
            input.booking_id,
            participants,
            remaining,
            system_residual
        );
        anomalies.push(Anomaly::NegativeResidual {
            residual: system_residual,
        });
        system_residual = Decimal::ZERO;
    }

    Ok(CommissionSplit {
        booking_id: input.booking_id,
        price: input.price,
        base_commission,
        pool,
        provider: Payout {
            user_id: input.provider_user_id,
            amount: provider_amount,
            pct: input.provider_desired_pct,
        },
        seller,
        referrer,
        manager,
        shares,
        system_residual,
        anomalies,
    })
}
