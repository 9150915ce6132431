//! The pooled-funds collaborator.
//!
//! The ledger never generates yield itself. Channel contributions are
//! deposited into an external pool, and the pool reports how much yield
//! each channel's group has accrued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use herald_core::{Address, Amount};
use thiserror::Error;

/// Errors reported by a pooled-funds service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Withdrawal exceeds the pool balance.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Amount, available: Amount },

    /// Arithmetic overflow in pool bookkeeping.
    #[error("pool balance overflow")]
    Overflow,

    /// The service could not complete the request.
    #[error("pool unavailable: {0}")]
    Unavailable(String),
}

/// An external pooled-funds service.
///
/// The ledger commits its own accounting before moving funds. An
/// implementation may query the ledger from inside any of these calls and
/// sees that committed state. Submitting a ledger operation from inside a
/// call fails with [`LedgerError::Reentrant`](crate::LedgerError::Reentrant).
#[async_trait]
pub trait PooledFunds: Send + Sync {
    /// Move `amount` from `from` into the pool.
    async fn deposit(&self, from: &Address, amount: Amount) -> Result<(), PoolError>;

    /// Pay `amount` out of the pool to `to`.
    async fn withdraw(&self, to: &Address, amount: Amount) -> Result<(), PoolError>;

    /// Cumulative yield accrued to `channel`'s group.
    async fn creator_withdrawable(&self, channel: &Address) -> Result<Amount, PoolError>;
}

/// In-memory pooled funds, for tests and local simulation.
///
/// Yield is injected with [`MemoryPool::accrue_yield`]. Failures can be
/// forced with [`MemoryPool::set_failing`].
#[derive(Default)]
pub struct MemoryPool {
    inner: Mutex<MemoryPoolInner>,
    failing: AtomicBool,
}

#[derive(Default)]
struct MemoryPoolInner {
    balance: Amount,
    accrued: HashMap<Address, Amount>,
    deposits: Vec<(Address, Amount)>,
    withdrawals: Vec<(Address, Amount)>,
}

impl MemoryPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of yield to `channel`'s group.
    pub fn accrue_yield(&self, channel: &Address, amount: Amount) -> Result<(), PoolError> {
        let mut inner = self.lock()?;
        inner.balance = inner.balance.checked_add(amount).ok_or(PoolError::Overflow)?;
        let accrued = inner.accrued.entry(*channel).or_default();
        *accrued = accrued.checked_add(amount).ok_or(PoolError::Overflow)?;
        Ok(())
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Current pool balance.
    pub fn balance(&self) -> Result<Amount, PoolError> {
        Ok(self.lock()?.balance)
    }

    /// Every deposit so far, in order.
    pub fn deposits(&self) -> Result<Vec<(Address, Amount)>, PoolError> {
        Ok(self.lock()?.deposits.clone())
    }

    /// Every withdrawal so far, in order.
    pub fn withdrawals(&self) -> Result<Vec<(Address, Amount)>, PoolError> {
        Ok(self.lock()?.withdrawals.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryPoolInner>, PoolError> {
        self.inner
            .lock()
            .map_err(|e| PoolError::Unavailable(format!("pool mutex poisoned: {}", e)))
    }

    fn check_available(&self) -> Result<(), PoolError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PoolError::Unavailable("forced failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PooledFunds for MemoryPool {
    async fn deposit(&self, from: &Address, amount: Amount) -> Result<(), PoolError> {
        self.check_available()?;
        let mut inner = self.lock()?;
        inner.balance = inner.balance.checked_add(amount).ok_or(PoolError::Overflow)?;
        inner.deposits.push((*from, amount));
        Ok(())
    }

    async fn withdraw(&self, to: &Address, amount: Amount) -> Result<(), PoolError> {
        self.check_available()?;
        let mut inner = self.lock()?;
        if amount > inner.balance {
            return Err(PoolError::InsufficientFunds {
                requested: amount,
                available: inner.balance,
            });
        }
        inner.balance -= amount;
        inner.withdrawals.push((*to, amount));
        Ok(())
    }

    async fn creator_withdrawable(&self, channel: &Address) -> Result<Amount, PoolError> {
        self.check_available()?;
        Ok(self.lock()?.accrued.get(channel).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[tokio::test]
    async fn test_deposit_and_withdraw() {
        let pool = MemoryPool::new();
        pool.deposit(&addr(1), 100).await.unwrap();
        pool.withdraw(&addr(2), 40).await.unwrap();

        assert_eq!(pool.balance().unwrap(), 60);
        assert_eq!(pool.withdrawals().unwrap(), vec![(addr(2), 40)]);
        assert_eq!(
            pool.withdraw(&addr(2), 61).await,
            Err(PoolError::InsufficientFunds {
                requested: 61,
                available: 60
            })
        );
    }

    #[tokio::test]
    async fn test_yield_is_per_channel() {
        let pool = MemoryPool::new();
        pool.accrue_yield(&addr(1), 30).unwrap();
        pool.accrue_yield(&addr(1), 12).unwrap();

        assert_eq!(pool.creator_withdrawable(&addr(1)).await.unwrap(), 42);
        assert_eq!(pool.creator_withdrawable(&addr(2)).await.unwrap(), 0);
        assert_eq!(pool.balance().unwrap(), 42);
    }

    #[tokio::test]
    async fn test_forced_failure() {
        let pool = MemoryPool::new();
        pool.set_failing(true);
        assert!(matches!(
            pool.deposit(&addr(1), 1).await,
            Err(PoolError::Unavailable(_))
        ));
        pool.set_failing(false);
        assert!(pool.deposit(&addr(1), 1).await.is_ok());
    }
}
