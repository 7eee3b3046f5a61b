//! Connection pooling and settings.

pub mod config;
pub mod manager;

pub use manager::{ConnectionPool, PoolError, PooledConnection};
