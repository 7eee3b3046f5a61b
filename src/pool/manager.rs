//! Bounded set of persistent `may_postgres` connections.
//!
//! Idle connections sit in a `crossbeam-channel`; `acquire` receives one (waiting up to the
//! checkout timeout) and the returned guard sends it back when dropped. A connection is only
//! ever used by one unit of work at a time, so a transaction never shares its session.

use crate::connection::{connect, redact_password, ConnectionError};
use crate::error::CommissionError;
use crate::executor::MayPostgresExecutor;
use crate::pool::config::DatabaseConfig;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

#[derive(Debug)]
pub enum PoolError {
    /// No connection came back within the checkout timeout
    Timeout(Duration),
    /// Opening a connection failed
    Connection(ConnectionError),
    /// Configured with zero connections
    Empty,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Timeout(waited) => {
                write!(f, "No pooled connection available after {:?}", waited)
            }
            PoolError::Connection(e) => write!(f, "Pool connection error: {}", e),
            PoolError::Empty => write!(f, "Pool has no connections"),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<ConnectionError> for PoolError {
    fn from(err: ConnectionError) -> Self {
        PoolError::Connection(err)
    }
}

impl From<PoolError> for CommissionError {
    fn from(err: PoolError) -> Self {
        CommissionError::Transaction(err.to_string())
    }
}

struct PoolSlots {
    idle_tx: Sender<MayPostgresExecutor>,
    idle_rx: Receiver<MayPostgresExecutor>,
    size: usize,
    checkout_timeout: Duration,
}

/// Cloneable handle; clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    slots: Arc<PoolSlots>,
}

impl ConnectionPool {
    /// Open `max_connections` connections to `config.url`.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, PoolError> {
        let mut executors = Vec::with_capacity(config.max_connections);
        for _ in 0..config.max_connections {
            executors.push(MayPostgresExecutor::new(connect(&config.url)?));
        }
        log::info!(
            "connection pool ready with {} connections to {}",
            executors.len(),
            redact_password(&config.url)
        );
        Self::from_executors(
            executors,
            Duration::from_secs(config.pool_timeout_seconds),
        )
    }

    /// Build a pool over connections opened elsewhere.
    pub fn from_executors(
        executors: Vec<MayPostgresExecutor>,
        checkout_timeout: Duration,
    ) -> Result<Self, PoolError> {
        if executors.is_empty() {
            return Err(PoolError::Empty);
        }
        let size = executors.len();
        let (idle_tx, idle_rx) = bounded(size);
        for executor in executors {
            // Capacity equals the number of executors, so this cannot block.
            let _ = idle_tx.send(executor);
        }
        Ok(Self {
            slots: Arc::new(PoolSlots {
                idle_tx,
                idle_rx,
                size,
                checkout_timeout,
            }),
        })
    }

    /// Check out a connection, waiting up to the checkout timeout.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, PoolError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::acquire_connection_span().entered();

        match self.slots.idle_rx.recv_timeout(self.slots.checkout_timeout) {
            Ok(executor) => Ok(PooledConnection {
                executor: Some(executor),
                slots: &self.slots,
            }),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "connection checkout timed out after {:?} ({} connections, all busy)",
                    self.slots.checkout_timeout,
                    self.slots.size
                );
                Err(PoolError::Timeout(self.slots.checkout_timeout))
            }
            // The pool owns a sender, so the channel cannot disconnect while `self` is alive.
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::Empty),
        }
    }

    pub fn size(&self) -> usize {
        self.slots.size
    }

    /// Connections not currently checked out.
    pub fn idle(&self) -> usize {
        self.slots.idle_rx.len()
    }
}

/// A checked-out connection; goes back to the pool on drop.
pub struct PooledConnection<'a> {
    executor: Option<MayPostgresExecutor>,
    slots: &'a PoolSlots,
}

impl Deref for PooledConnection<'_> {
    type Target = MayPostgresExecutor;

    fn deref(&self) -> &MayPostgresExecutor {
        // Only `drop` takes the executor out.
        match &self.executor {
            Some(executor) => executor,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(executor) = self.executor.take() {
            if self.slots.idle_tx.send(executor).is_err() {
                log::error!("failed to return connection to pool");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_is_rejected() {
        let result = ConnectionPool::from_executors(Vec::new(), Duration::from_millis(10));
        assert!(matches!(result, Err(PoolError::Empty)));
    }

    #[test]
    fn test_pool_error_is_retryable_commission_error() {
        let err: CommissionError = PoolError::Timeout(Duration::from_secs(1)).into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("No pooled connection"));
    }
}
