//! # Herald Ledger
//!
//! The unified API for the Herald notification core: channels with pooled
//! deposits, time-weighted memberships, delegated notifications, and
//! relayer-submitted meta-transactions.
//!
//! ## Overview
//!
//! - **Channels** are keyed by their owner, funded at creation, and can be
//!   deactivated once. The owner is always the first member.
//! - **Memberships** toggle on subscribe/unsubscribe. Each channel carries a
//!   fair-share accumulator so leaving members are paid their time-weighted
//!   share of the channel's yield in O(1).
//! - **Notifications** may be sent by the owner, a registered delegate, or
//!   anyone to themselves.
//! - **Meta-transactions** let a relayer submit subscribe, unsubscribe and
//!   notify requests signed by someone else, guarded by nonce and expiry.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use herald_ledger::{Ledger, LedgerConfig, MemoryPool};
//! use herald_ledger::core::{Address, ChannelType};
//! use herald_ledger::store::SqliteStore;
//!
//! async fn example() -> herald_ledger::Result<()> {
//!     let store = SqliteStore::open("herald.db")?;
//!     let config = LedgerConfig::default();
//!     let min = config.min_pool_contribution;
//!     let ledger = Ledger::new(store, MemoryPool::new(), config)?;
//!
//!     let owner = Address::from_bytes([1; 20]);
//!     let alice = Address::from_bytes([2; 20]);
//!     ledger
//!         .create_channel(owner, ChannelType::InterestBearingOpen, Bytes::from_static(b"news"), min, 100)
//!         .await?;
//!     ledger.subscribe(owner, alice, 150).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `herald_ledger::core` - Core primitives (Address, Channel, FairShare, etc.)
//! - `herald_ledger::store` - Storage abstraction and SQLite
//! - `herald_ledger::auth` - Delegation and meta-transaction verification

pub mod config;
pub mod error;
pub mod ledger;
pub mod pool;
mod txn;

// Re-export component crates
pub use herald_auth as auth;
pub use herald_core as core;
pub use herald_store as store;

// Re-export main types for convenience
pub use config::{ConfigError, DomainConfig, LedgerConfig, ResubscribePolicy};
pub use error::{ErrorKind, LedgerError, Result};
pub use ledger::{Ledger, Unsubscribed};
pub use pool::{MemoryPool, PoolError, PooledFunds};

pub use herald_auth::{
    Authorization, Expiry, SendNotificationMessage, SignedMessage, SubscribeMessage,
    UnsubscribeMessage,
};
pub use herald_core::{Address, Amount, Channel, ChannelType, Event, Tick, User};
