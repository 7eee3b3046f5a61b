//! Settlement over `PgStoreProvider` against a real PostgreSQL.

mod support;

use commission_ledger::{
    BookingStatus, CommissionEngine, ConnectionPool, DatabaseConfig, Executor, LedgerRole,
    PgStoreProvider,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use support::{add_booking, seed_marketplace, TestDatabase};
use testcontainers::clients::Cli;

fn engine(db: &TestDatabase<'_>, connections: usize) -> CommissionEngine<PgStoreProvider> {
    let pool = ConnectionPool::connect(&DatabaseConfig {
        url: db.url.clone(),
        max_connections: connections,
        pool_timeout_seconds: 10,
    })
    .expect("pool");
    CommissionEngine::new(PgStoreProvider::new(pool))
}

#[test]
#[ignore = "needs Docker or TEST_DATABASE_URL"]
fn test_completion_is_persisted() {
    let docker = Cli::default();
    let db = TestDatabase::start(&docker);
    let executor = db.fresh_schema();
    seed_marketplace(&executor);
    let engine = engine(&db, 2);

    let split = engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap()
        .unwrap();
    assert_eq!(split.seller.amount, dec!(187000000));

    let ledger = engine.ledger_for_booking(1).unwrap();
    assert_eq!(ledger.len(), 4);
    assert_eq!(ledger[0].role, LedgerRole::Provider);
    assert_eq!(ledger.iter().map(|r| r.amount).sum::<Decimal>(), dec!(275000000));
    assert_eq!(engine.wallet_balance(2).unwrap(), dec!(187000000));
    assert_eq!(engine.verify_ledger(1).unwrap(), dec!(275000000));

    // Replay is skipped by default.
    assert!(engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap()
        .is_none());
    assert_eq!(engine.wallet_balance(2).unwrap(), dec!(187000000));
}

#[test]
#[ignore = "needs Docker or TEST_DATABASE_URL"]
fn test_cancel_and_complete_again_keeps_single_credit() {
    let docker = Cli::default();
    let db = TestDatabase::start(&docker);
    let executor = db.fresh_schema();
    seed_marketplace(&executor);
    let engine = engine(&db, 2);

    engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap();
    engine
        .on_booking_status_changed(1, BookingStatus::Cancelled)
        .unwrap();
    assert!(engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap()
        .is_none());

    assert_eq!(engine.wallet_balance(2).unwrap(), dec!(187000000));
    assert_eq!(engine.wallet_transactions_for_booking(1).unwrap().len(), 4);
}

#[test]
#[ignore = "needs Docker or TEST_DATABASE_URL"]
fn test_failed_settlement_leaves_no_trace() {
    let docker = Cli::default();
    let db = TestDatabase::start(&docker);
    let executor = db.fresh_schema();
    seed_marketplace(&executor);
    // Remove the seller's rank so completion fails after the status write.
    executor.execute("DELETE FROM user_ranks", &[]).unwrap();
    let engine = engine(&db, 1);

    assert!(engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .is_err());

    let row = executor
        .query_one("SELECT status FROM bookings WHERE id = 1", &[])
        .unwrap();
    assert_eq!(row.get::<_, String>("status"), "CONFIRMED");
    assert!(engine.ledger_for_booking(1).unwrap().is_empty());
}

#[test]
#[ignore = "needs Docker or TEST_DATABASE_URL"]
fn test_concurrent_completions_share_manager_wallet() {
    let docker = Cli::default();
    let db = TestDatabase::start(&docker);
    let executor = db.fresh_schema();
    seed_marketplace(&executor);
    for id in 2..=8 {
        add_booking(&executor, id);
    }
    let engine = Arc::new(engine(&db, 4));

    let handles: Vec<_> = (1..=8)
        .map(|id| {
            let engine = Arc::clone(&engine);
            may::go!(move || engine.on_booking_status_changed(id, BookingStatus::Completed))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().unwrap().is_some());
    }

    assert_eq!(engine.wallet_balance(4).unwrap(), dec!(88000000));
    assert_eq!(engine.wallet_balance(2).unwrap(), dec!(1496000000));
}
