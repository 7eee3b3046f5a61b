//! Shared marketplace fixture for the engine tests.
//!
//! Users: 1 provider (owns product 100), 2 seller (Hạng 3: 0.85/0.10/0.05), 3 referrer,
//! 4 manager, 5 seller (Hạng 5: 0.80/0.15/0.10, over-allocated), 6 seller without a rank.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use commission_ledger::{
    AppUser, Booking, BookingStatus, CommissionEngine, MemoryStore, Product, Rank, RankShare,
    ShareRole, UserRank,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const PROVIDER: i64 = 1;
pub const SELLER: i64 = 2;
pub const REFERRER: i64 = 3;
pub const MANAGER: i64 = 4;
pub const SENIOR_SELLER: i64 = 5;
pub const UNRANKED_SELLER: i64 = 6;
pub const PRODUCT: i64 = 100;

pub fn ranks_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

fn share(store: &MemoryStore, rank_id: i64, role: ShareRole, pct: Decimal) {
    store.insert_rank_share(RankShare { rank_id, role, pct });
}

pub fn assign_rank(store: &MemoryStore, id: i64, user_id: i64, rank_id: i64, from: DateTime<Utc>) {
    store.insert_user_rank(UserRank {
        id,
        user_id,
        rank_id,
        effective_from: from,
        effective_to: None,
    });
}

pub fn seed_marketplace(store: &MemoryStore) {
    for (id, name) in [
        (PROVIDER, "Nguyễn Văn An"),
        (SELLER, "Trần Thị Bình"),
        (REFERRER, "Lê Văn Cường"),
        (MANAGER, "Phạm Thị Dung"),
        (SENIOR_SELLER, "Hoàng Văn Em"),
        (UNRANKED_SELLER, "Võ Thị Phương"),
    ] {
        store.insert_user(AppUser {
            id,
            full_name: name.to_string(),
        });
    }

    for level in 1..=5 {
        store.insert_rank(Rank {
            id: i64::from(level),
            name: format!("Hạng {level}"),
            level,
        });
    }
    share(store, 3, ShareRole::Seller, dec!(0.85));
    share(store, 3, ShareRole::Referrer, dec!(0.10));
    share(store, 3, ShareRole::Manager, dec!(0.05));
    share(store, 4, ShareRole::Seller, dec!(0.90));
    share(store, 4, ShareRole::Referrer, dec!(0.05));
    share(store, 4, ShareRole::Manager, dec!(0.05));
    share(store, 5, ShareRole::Seller, dec!(0.80));
    share(store, 5, ShareRole::Referrer, dec!(0.15));
    share(store, 5, ShareRole::Manager, dec!(0.10));

    assign_rank(store, 1, SELLER, 3, ranks_start());
    assign_rank(store, 2, SENIOR_SELLER, 5, ranks_start());

    store.insert_product(Product {
        id: PRODUCT,
        owner_user_id: PROVIDER,
        price: dec!(5500000000),
        commission_pct: dec!(0.05),
        provider_desired_pct: dec!(0.01),
    });
}

pub fn add_booking(
    store: &MemoryStore,
    id: i64,
    seller: i64,
    referrer: Option<i64>,
    manager: Option<i64>,
    status: BookingStatus,
) {
    let created = at(2024, 6, 1);
    store.insert_booking(Booking {
        id,
        product_id: PRODUCT,
        price: dec!(5500000000),
        status,
        seller_user_id: seller,
        referrer_user_id: referrer,
        manager_user_id: manager,
        created_at: created,
        updated_at: created,
    });
}

/// Seeded store with one confirmed booking (id 1) carrying referrer and manager.
pub fn engine() -> CommissionEngine<MemoryStore> {
    let store = MemoryStore::new();
    seed_marketplace(&store);
    add_booking(
        &store,
        1,
        SELLER,
        Some(REFERRER),
        Some(MANAGER),
        BookingStatus::Confirmed,
    );
    CommissionEngine::new(store)
}

pub fn balance(engine: &CommissionEngine<MemoryStore>, user_id: i64) -> Decimal {
    engine.wallet_balance(user_id).unwrap()
}
