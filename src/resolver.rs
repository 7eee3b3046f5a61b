//! Temporal rank lookup.
//!
//! A user may carry several overlapping `UserRank` rows because the schema does not enforce
//! "one effective rank per user". The most recent `effective_from` wins, ties broken by the
//! highest id, and overlapping open-ended rows are reported so they can be cleaned up.

use crate::calculator::Shares;
use crate::error::{CommissionError, Entity};
use crate::model::{Rank, ShareRole, UserRank};
use crate::store::{CommissionStore, StoreResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// A user's effective share for one role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub user_id: i64,
    pub rank_id: i64,
    pub role: ShareRole,
    pub pct: Decimal,
}

/// All three shares of a seller's effective rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankShares {
    pub rank: Rank,
    pub shares: Shares,
}

pub struct RankShareResolver<'s> {
    store: &'s dyn CommissionStore,
}

impl<'s> RankShareResolver<'s> {
    pub fn new(store: &'s dyn CommissionStore) -> Self {
        Self { store }
    }

    /// The assignment of `user_id` in force at `as_of`, if any.
    pub fn effective_rank(
        &self,
        user_id: i64,
        as_of: DateTime<Utc>,
    ) -> StoreResult<Option<UserRank>> {
        let mut rows: Vec<UserRank> = self
            .store
            .find_effective_user_ranks(user_id, as_of)?
            .into_iter()
            .filter(|row| row.is_effective_at(as_of))
            .collect();
        rows.sort_by(|a, b| {
            b.effective_from
                .cmp(&a.effective_from)
                .then_with(|| b.id.cmp(&a.id))
        });

        let chosen = rows.into_iter().next();
        if self.has_overlapping_assignments(user_id)? {
            log::warn!(
                "user {} has several open-ended rank assignments; at {} using {:?}",
                user_id,
                as_of,
                chosen.as_ref().map(|row| row.id)
            );
            #[cfg(feature = "metrics")]
            METRICS.record_anomaly("rank_overlap");
        }
        Ok(chosen)
    }

    /// More than one assignment without `effective_to`, counting ones that start later.
    pub fn has_overlapping_assignments(&self, user_id: i64) -> StoreResult<bool> {
        Ok(self.store.count_open_ended_user_ranks(user_id)? > 1)
    }

    /// Share of `user_id`'s effective rank for `role`.
    ///
    /// No effective rank is `NotFound` (or `Configuration` for the seller role). A missing
    /// share row is 0% for referrer and manager.
    pub fn resolve(
        &self,
        user_id: i64,
        as_of: DateTime<Utc>,
        role: ShareRole,
    ) -> StoreResult<Share> {
        let assignment = match self.effective_rank(user_id, as_of)? {
            Some(assignment) => assignment,
            None if role == ShareRole::Seller => return Err(no_seller_rank(user_id, as_of)),
            None => return Err(CommissionError::not_found(Entity::Rank, user_id)),
        };
        let pct = self.share_pct(assignment.rank_id, role)?;
        Ok(Share {
            user_id,
            rank_id: assignment.rank_id,
            role,
            pct,
        })
    }

    /// Seller, referrer and manager shares of the seller's effective rank.
    pub fn resolve_rank_shares(
        &self,
        seller_user_id: i64,
        as_of: DateTime<Utc>,
    ) -> StoreResult<RankShares> {
        let assignment = self
            .effective_rank(seller_user_id, as_of)?
            .ok_or_else(|| no_seller_rank(seller_user_id, as_of))?;
        let rank = self
            .store
            .find_rank(assignment.rank_id)?
            .ok_or_else(|| CommissionError::not_found(Entity::Rank, assignment.rank_id))?;

        let shares = Shares {
            seller: self.share_pct(rank.id, ShareRole::Seller)?,
            referrer: self.share_pct(rank.id, ShareRole::Referrer)?,
            manager: self.share_pct(rank.id, ShareRole::Manager)?,
        };
        log::debug!(
            "seller {} resolved to rank {} ({}) at {}",
            seller_user_id,
            rank.id,
            rank.name,
            as_of
        );
        Ok(RankShares { rank, shares })
    }

    fn share_pct(&self, rank_id: i64, role: ShareRole) -> StoreResult<Decimal> {
        match self.store.find_rank_share(rank_id, role)? {
            Some(share) => Ok(share.pct),
            None if role == ShareRole::Seller => Err(CommissionError::Configuration(format!(
                "rank {rank_id} has no SELLER share"
            ))),
            None => Ok(Decimal::ZERO),
        }
    }
}

fn no_seller_rank(user_id: i64, as_of: DateTime<Utc>) -> CommissionError {
    CommissionError::Configuration(format!(
        "seller {user_id} has no effective rank at {as_of}"
    ))
}
