//! Built-in migrations.
//!
//! The marketplace tables are owned by upstream CRUD flows; they are created here with
//! `IF NOT EXISTS` so a fresh database (tests, local development) has everything settlement
//! reads. The ledger tables are owned by this crate.

use super::migration::Migration;

pub struct CreateMarketplaceSchema;

impl Migration for CreateMarketplaceSchema {
    fn name(&self) -> &str {
        "create_marketplace_schema"
    }

    fn version(&self) -> i64 {
        20240301000000
    }

    fn up_statements(&self) -> &[&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS app_users (
                id BIGSERIAL PRIMARY KEY,
                full_name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            "CREATE TABLE IF NOT EXISTS products (
                id BIGSERIAL PRIMARY KEY,
                owner_user_id BIGINT NOT NULL REFERENCES app_users(id),
                price NUMERIC(20, 2) NOT NULL CHECK (price >= 0),
                commission_pct NUMERIC(9, 6) NOT NULL CHECK (commission_pct BETWEEN 0 AND 1),
                provider_desired_pct NUMERIC(9, 6) NOT NULL DEFAULT 0
                    CHECK (provider_desired_pct BETWEEN 0 AND 1)
            )",
            "CREATE TABLE IF NOT EXISTS ranks (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                level INTEGER NOT NULL UNIQUE
            )",
            "CREATE TABLE IF NOT EXISTS rank_shares (
                rank_id BIGINT NOT NULL REFERENCES ranks(id),
                role TEXT NOT NULL CHECK (role IN ('SELLER', 'REFERRER', 'MANAGER')),
                pct NUMERIC(9, 6) NOT NULL CHECK (pct >= 0),
                PRIMARY KEY (rank_id, role)
            )",
            "CREATE TABLE IF NOT EXISTS user_ranks (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES app_users(id),
                rank_id BIGINT NOT NULL REFERENCES ranks(id),
                effective_from TIMESTAMPTZ NOT NULL,
                effective_to TIMESTAMPTZ
            )",
            "CREATE INDEX IF NOT EXISTS idx_user_ranks_user_effective \
             ON user_ranks(user_id, effective_from DESC)",
            "CREATE TABLE IF NOT EXISTS bookings (
                id BIGSERIAL PRIMARY KEY,
                product_id BIGINT NOT NULL REFERENCES products(id),
                price NUMERIC(20, 2) NOT NULL CHECK (price >= 0),
                status TEXT NOT NULL DEFAULT 'PENDING'
                    CHECK (status IN ('PENDING', 'CONFIRMED', 'COMPLETED', 'CANCELLED')),
                seller_user_id BIGINT NOT NULL REFERENCES app_users(id),
                referrer_user_id BIGINT REFERENCES app_users(id),
                manager_user_id BIGINT REFERENCES app_users(id),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        ]
    }

    fn down_statements(&self) -> &[&'static str] {
        &[
            "DROP TABLE IF EXISTS bookings",
            "DROP TABLE IF EXISTS user_ranks",
            "DROP TABLE IF EXISTS rank_shares",
            "DROP TABLE IF EXISTS ranks",
            "DROP TABLE IF EXISTS products",
            "DROP TABLE IF EXISTS app_users",
        ]
    }
}

pub struct CreateLedgerSchema;

impl Migration for CreateLedgerSchema {
    fn name(&self) -> &str {
        "create_ledger_schema"
    }

    fn version(&self) -> i64 {
        20240301000100
    }

    fn up_statements(&self) -> &[&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS revenue_ledger (
                id BIGSERIAL PRIMARY KEY,
                booking_id BIGINT NOT NULL REFERENCES bookings(id),
                settlement_id UUID NOT NULL,
                role TEXT NOT NULL
                    CHECK (role IN ('PROVIDER', 'SELLER', 'REFERRER', 'MANAGER', 'SYSTEM')),
                beneficiary_user_id BIGINT REFERENCES app_users(id),
                amount NUMERIC(20, 2) NOT NULL CHECK (amount >= 0),
                pct NUMERIC(9, 6) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CHECK ((role = 'SYSTEM') = (beneficiary_user_id IS NULL))
            )",
            "CREATE INDEX IF NOT EXISTS idx_revenue_ledger_booking ON revenue_ledger(booking_id)",
            "CREATE TABLE IF NOT EXISTS wallets (
                user_id BIGINT PRIMARY KEY REFERENCES app_users(id),
                balance NUMERIC(20, 2) NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            "CREATE TABLE IF NOT EXISTS wallet_transactions (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES wallets(user_id),
                booking_id BIGINT NOT NULL REFERENCES bookings(id),
                settlement_id UUID NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('COMMISSION_PROVIDER', 'COMMISSION_SELLER',
                    'COMMISSION_REFERRER', 'COMMISSION_MANAGER', 'COMMISSION_REVERSAL')),
                amount NUMERIC(20, 2) NOT NULL,
                balance_after NUMERIC(20, 2) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            "CREATE INDEX IF NOT EXISTS idx_wallet_transactions_booking \
             ON wallet_transactions(booking_id)",
        ]
    }

    fn down_statements(&self) -> &[&'static str] {
        &[
            "DROP TABLE IF EXISTS wallet_transactions",
            "DROP TABLE IF EXISTS wallets",
            "DROP TABLE IF EXISTS revenue_ledger",
        ]
    }
}

/// Every migration this crate ships, in version order.
pub fn builtin_migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(CreateMarketplaceSchema), Box::new(CreateLedgerSchema)]
}
