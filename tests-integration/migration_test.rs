//! Migration runner against a real PostgreSQL.

mod support;

use commission_ledger::migration::{revert_latest, run_migrations, SchemaManager};
use support::TestDatabase;
use testcontainers::clients::Cli;

#[test]
#[ignore = "needs Docker or TEST_DATABASE_URL"]
fn test_migrations_apply_once() {
    let docker = Cli::default();
    let db = TestDatabase::start(&docker);
    let executor = db.executor();

    run_migrations(&executor).unwrap();
    assert_eq!(run_migrations(&executor).unwrap(), 0);

    let schema = SchemaManager::new(&executor);
    for table in ["bookings", "revenue_ledger", "wallets", "wallet_transactions"] {
        assert!(schema.has_table(table).unwrap(), "{table}");
    }
}

#[test]
#[ignore = "needs Docker or TEST_DATABASE_URL"]
fn test_revert_latest_drops_ledger_tables() {
    let docker = Cli::default();
    let db = TestDatabase::start(&docker);
    let executor = db.executor();
    run_migrations(&executor).unwrap();

    let reverted = revert_latest(&executor).unwrap();
    assert_eq!(reverted, Some(20240301000100));
    let schema = SchemaManager::new(&executor);
    assert!(!schema.has_table("revenue_ledger").unwrap());
    assert!(schema.has_table("bookings").unwrap());

    // Re-applying brings the ledger schema back.
    assert_eq!(run_migrations(&executor).unwrap(), 1);
    assert!(schema.has_table("revenue_ledger").unwrap());
}
