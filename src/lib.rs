//! # commission-ledger
//!
//! Commission distribution and ledger engine for a real-estate referral marketplace, running
//! on the `may` coroutine runtime over `may_postgres`.
//!
//! When a booking completes, [`CommissionEngine`] splits the product's commission pool between
//! the provider, the seller, the referrer, the manager and the system, records the split as
//! immutable [`RevenueLedger`] rows and credits participant wallets, all in one transaction.
//!
//! ```rust,no_run
//! use commission_ledger::{BookingStatus, CommissionEngine, ConnectionPool, PgStoreProvider, Settings};
//!
//! let settings = Settings::load()?;
//! let pool = ConnectionPool::connect(&settings.database)?;
//! let engine = CommissionEngine::with_settings(
//!     PgStoreProvider::with_isolation(pool, settings.commission.isolation_level),
//!     settings.commission.clone(),
//! );
//! if let Some(split) = engine.on_booking_status_changed(42, BookingStatus::Completed)? {
//!     println!("{}", split.to_json()?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod calculator;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod pool;
pub mod resolver;
pub mod store;
pub mod transaction;
pub mod wallet;

pub use calculator::{compute, Anomaly, CalculationInput, CommissionSplit, Payout, Shares};
pub use config::{CommissionSettings, DatabaseConfig, ReplayPolicy, Settings};
pub use connection::{connect, ConnectionError};
pub use engine::{CommissionEngine, PreviewRequest, RecalculationReport};
pub use error::{CommissionError, Entity};
pub use executor::{DbError, Executor, MayPostgresExecutor};
pub use ledger::LedgerWriter;
pub use model::{
    AppUser, Booking, BookingStatus, LedgerRole, Product, Rank, RankShare, RevenueLedger,
    ShareRole, UserRank, Wallet, WalletTransaction, WalletTransactionKind,
};
pub use pool::{ConnectionPool, PoolError};
pub use resolver::{RankShareResolver, RankShares, Share};
pub use store::{CommissionStore, MemoryStore, PgStore, PgStoreProvider, StoreProvider};
pub use transaction::{IsolationLevel, Transaction, TransactionError};
pub use wallet::{WalletCredit, WalletCreditor};
