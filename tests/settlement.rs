//! Settlement through `CommissionEngine` over the in-memory store.

mod common;

use common::*;
use commission_ledger::{
    BookingStatus, CommissionEngine, CommissionError, CommissionSettings, Entity, LedgerRole,
    MemoryStore, PreviewRequest, ReplayPolicy, StoreProvider, WalletTransactionKind,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

fn status_of(engine: &CommissionEngine<MemoryStore>, booking_id: i64) -> BookingStatus {
    engine
        .provider()
        .read(|s| s.find_booking(booking_id))
        .unwrap()
        .unwrap()
        .status
}

#[test]
fn test_completion_with_full_chain() {
    let engine = engine();
    let split = engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap()
        .expect("completion settles");

    assert_eq!(split.pool, dec!(275000000));
    assert_eq!(split.provider.amount, dec!(55000000));
    assert_eq!(split.seller.amount, dec!(187000000));
    assert_eq!(split.referrer.as_ref().unwrap().amount, dec!(22000000));
    assert_eq!(split.manager.as_ref().unwrap().amount, dec!(11000000));
    assert_eq!(split.system_residual, Decimal::ZERO);

    let ledger = engine.ledger_for_booking(1).unwrap();
    let roles: Vec<_> = ledger.iter().map(|r| r.role).collect();
    assert_eq!(
        roles,
        vec![
            LedgerRole::Provider,
            LedgerRole::Seller,
            LedgerRole::Referrer,
            LedgerRole::Manager
        ]
    );
    assert!(ledger.iter().all(|r| r.settlement_id == ledger[0].settlement_id));
    assert_eq!(ledger.iter().map(|r| r.amount).sum::<Decimal>(), split.pool);

    assert_eq!(balance(&engine, PROVIDER), dec!(55000000));
    assert_eq!(balance(&engine, SELLER), dec!(187000000));
    assert_eq!(balance(&engine, REFERRER), dec!(22000000));
    assert_eq!(balance(&engine, MANAGER), dec!(11000000));
    assert_eq!(status_of(&engine, 1), BookingStatus::Completed);
    assert_eq!(engine.verify_ledger(1).unwrap(), dec!(275000000));
}

#[test]
fn test_completion_without_referrer_or_manager() {
    let engine = engine();
    add_booking(
        engine.provider(),
        2,
        SELLER,
        None,
        None,
        BookingStatus::Confirmed,
    );

    let split = engine
        .on_booking_status_changed(2, BookingStatus::Completed)
        .unwrap()
        .unwrap();
    assert_eq!(split.seller.amount, dec!(187000000));
    assert_eq!(split.system_residual, dec!(33000000));

    let ledger = engine.ledger_for_booking(2).unwrap();
    let system = ledger
        .iter()
        .find(|r| r.role == LedgerRole::System)
        .expect("system row");
    assert_eq!(system.beneficiary_user_id, None);
    assert_eq!(system.amount, dec!(33000000));
    assert_eq!(balance(&engine, REFERRER), Decimal::ZERO);
}

#[test]
fn test_over_allocated_rank_is_normalized() {
    let engine = engine();
    add_booking(
        engine.provider(),
        3,
        SENIOR_SELLER,
        Some(REFERRER),
        Some(MANAGER),
        BookingStatus::Confirmed,
    );

    let split = engine
        .on_booking_status_changed(3, BookingStatus::Completed)
        .unwrap()
        .unwrap();
    assert_eq!(split.shares.sum(), Decimal::ONE);
    assert_eq!(split.seller.amount, dec!(167619048));
    assert_eq!(split.referrer.unwrap().amount, dec!(31428571));
    assert_eq!(split.manager.unwrap().amount, dec!(20952381));
    assert_eq!(split.system_residual, Decimal::ZERO);

    let stored_pct = engine
        .ledger_for_booking(3)
        .unwrap()
        .into_iter()
        .find(|r| r.role == LedgerRole::Seller)
        .unwrap()
        .pct;
    assert_eq!(stored_pct, dec!(0.761905));
}

#[test]
fn test_non_completed_status_writes_no_ledger() {
    let engine = engine();
    assert!(engine
        .on_booking_status_changed(1, BookingStatus::Cancelled)
        .unwrap()
        .is_none());
    assert_eq!(status_of(&engine, 1), BookingStatus::Cancelled);
    assert!(engine.ledger_for_booking(1).unwrap().is_empty());
    assert_eq!(balance(&engine, SELLER), Decimal::ZERO);
}

#[test]
fn test_unknown_booking_is_not_found() {
    let engine = engine();
    let err = engine
        .on_booking_status_changed(999, BookingStatus::Completed)
        .unwrap_err();
    assert!(matches!(
        err,
        CommissionError::NotFound {
            entity: Entity::Booking,
            id: 999
        }
    ));
    assert!(!err.is_retryable());
}

#[test]
fn test_missing_seller_rank_blocks_completion() {
    let engine = engine();
    add_booking(
        engine.provider(),
        4,
        UNRANKED_SELLER,
        None,
        None,
        BookingStatus::Confirmed,
    );

    let err = engine
        .on_booking_status_changed(4, BookingStatus::Completed)
        .unwrap_err();
    assert!(matches!(err, CommissionError::Configuration(_)));
    // The status write rolled back with everything else.
    assert_eq!(status_of(&engine, 4), BookingStatus::Confirmed);
    assert!(engine.ledger_for_booking(4).unwrap().is_empty());
}

#[test]
fn test_failing_wallet_write_rolls_back_everything() {
    let engine = engine();
    engine.provider().fail_wallet_updates_for(MANAGER);

    let err = engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(status_of(&engine, 1), BookingStatus::Confirmed);
    assert!(engine.ledger_for_booking(1).unwrap().is_empty());
    assert!(engine.wallet_transactions_for_booking(1).unwrap().is_empty());
    for user in [PROVIDER, SELLER, REFERRER, MANAGER] {
        assert_eq!(balance(&engine, user), Decimal::ZERO);
    }

    // Once the fault clears, a retry settles normally.
    engine.provider().clear_wallet_failures();
    assert!(engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap()
        .is_some());
    assert_eq!(balance(&engine, MANAGER), dec!(11000000));
}

#[test]
fn test_replayed_completion_does_not_double_credit() {
    let engine = engine();
    engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap();
    let replay = engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap();

    assert!(replay.is_none());
    assert_eq!(balance(&engine, SELLER), dec!(187000000));
    assert_eq!(engine.ledger_for_booking(1).unwrap().len(), 4);
    assert_eq!(engine.wallet_transactions_for_booking(1).unwrap().len(), 4);
}

#[test]
fn test_replay_with_recalculate_policy_keeps_net_effect() {
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
    let engine = CommissionEngine::with_settings(
        store,
        CommissionSettings {
            replay_policy: ReplayPolicy::Recalculate,
            ..Default::default()
        },
    );

    let first = engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap()
        .unwrap();
    let second = engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap()
        .unwrap();
    assert_eq!(first, second);

    assert_eq!(balance(&engine, SELLER), dec!(187000000));
    let ledger = engine.ledger_for_booking(1).unwrap();
    assert_eq!(ledger.len(), 4);
    assert_eq!(engine.verify_ledger(1).unwrap(), dec!(275000000));

    let reversals = engine
        .wallet_transactions_for_booking(1)
        .unwrap()
        .into_iter()
        .filter(|t| t.kind == WalletTransactionKind::CommissionReversal)
        .count();
    assert_eq!(reversals, 4);
}

#[test]
fn test_leaving_completed_keeps_settlement() {
    let engine = engine();
    engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap();
    assert!(engine
        .on_booking_status_changed(1, BookingStatus::Cancelled)
        .unwrap()
        .is_none());

    assert_eq!(status_of(&engine, 1), BookingStatus::Cancelled);
    assert_eq!(engine.ledger_for_booking(1).unwrap().len(), 4);
    assert_eq!(balance(&engine, SELLER), dec!(187000000));
}

/// Every beneficiary's wallet holds exactly what the ledger assigns them.
fn assert_wallets_match_ledger(engine: &CommissionEngine<MemoryStore>, booking_id: i64) {
    let mut owed: BTreeMap<i64, Decimal> = BTreeMap::new();
    for row in engine.ledger_for_booking(booking_id).unwrap() {
        if let Some(user_id) = row.beneficiary_user_id {
            *owed.entry(user_id).or_default() += row.amount;
        }
    }
    assert!(!owed.is_empty());
    for (user_id, amount) in owed {
        assert_eq!(balance(engine, user_id), amount, "user {user_id}");
    }
}

#[test]
fn test_returning_to_completed_does_not_credit_again() {
    let engine = engine();
    engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap();
    for status in [BookingStatus::Cancelled, BookingStatus::Confirmed] {
        assert!(engine
            .on_booking_status_changed(1, status)
            .unwrap()
            .is_none());
        assert!(engine
            .on_booking_status_changed(1, BookingStatus::Completed)
            .unwrap()
            .is_none());
    }

    assert_eq!(status_of(&engine, 1), BookingStatus::Completed);
    assert_eq!(balance(&engine, SELLER), dec!(187000000));
    assert_eq!(engine.wallet_transactions_for_booking(1).unwrap().len(), 4);
    assert_wallets_match_ledger(&engine, 1);
}

#[test]
fn test_returning_to_completed_with_recalculate_policy_reverses_first() {
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
    let engine = CommissionEngine::with_settings(
        store,
        CommissionSettings {
            replay_policy: ReplayPolicy::Recalculate,
            ..Default::default()
        },
    );

    engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap();
    engine
        .on_booking_status_changed(1, BookingStatus::Cancelled)
        .unwrap();
    let resettled = engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap();

    assert!(resettled.is_some());
    assert_eq!(balance(&engine, SELLER), dec!(187000000));
    assert_eq!(balance(&engine, MANAGER), dec!(11000000));
    assert_wallets_match_ledger(&engine, 1);
}

#[test]
fn test_wallet_audit_carries_running_balance() {
    let engine = engine();
    add_booking(
        engine.provider(),
        2,
        SELLER,
        None,
        None,
        BookingStatus::Confirmed,
    );
    engine
        .on_booking_status_changed(1, BookingStatus::Completed)
        .unwrap();
    engine
        .on_booking_status_changed(2, BookingStatus::Completed)
        .unwrap();

    let seller_row = engine
        .wallet_transactions_for_booking(2)
        .unwrap()
        .into_iter()
        .find(|t| t.user_id == SELLER)
        .unwrap();
    assert_eq!(seller_row.kind, WalletTransactionKind::CommissionSeller);
    assert_eq!(seller_row.amount, dec!(187000000));
    assert_eq!(seller_row.balance_after, dec!(374000000));
}

#[test]
fn test_preview_writes_nothing() {
    let engine = engine();
    let split = engine
        .get_commission_preview(&PreviewRequest {
            product_id: PRODUCT,
            price: dec!(5500000000),
            seller_user_id: SELLER,
            referrer_user_id: Some(REFERRER),
            manager_user_id: None,
        })
        .unwrap();

    assert_eq!(split.booking_id, 0);
    assert_eq!(split.referrer.as_ref().unwrap().amount, dec!(22000000));
    assert!(split.manager.is_none());
    assert_eq!(split.system_residual, dec!(11000000));
    assert_eq!(balance(&engine, SELLER), Decimal::ZERO);
    assert!(engine.ledger_for_booking(0).unwrap().is_empty());
}

#[test]
fn test_preview_rejects_unknown_participants() {
    let engine = engine();
    let err = engine
        .get_commission_preview(&PreviewRequest {
            product_id: PRODUCT,
            price: dec!(1000000),
            seller_user_id: SELLER,
            referrer_user_id: Some(77),
            manager_user_id: None,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        CommissionError::NotFound {
            entity: Entity::User,
            id: 77
        }
    ));

    let err = engine
        .get_commission_preview(&PreviewRequest {
            product_id: 404,
            price: dec!(1000000),
            seller_user_id: SELLER,
            referrer_user_id: None,
            manager_user_id: None,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        CommissionError::NotFound {
            entity: Entity::Product,
            ..
        }
    ));
}

#[test]
fn test_receipt_json_is_byte_identical() {
    let engine = engine();
    let request = PreviewRequest {
        product_id: PRODUCT,
        price: dec!(5500000000),
        seller_user_id: SENIOR_SELLER,
        referrer_user_id: Some(REFERRER),
        manager_user_id: Some(MANAGER),
    };
    let quoted_at = at(2024, 6, 1);
    let first = engine.get_commission_preview_at(&request, quoted_at).unwrap();
    let second = engine.get_commission_preview_at(&request, quoted_at).unwrap();
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());

    let value: serde_json::Value = serde_json::from_str(&first.to_json().unwrap()).unwrap();
    assert_eq!(value["seller"]["amount"], "167619048");
}
