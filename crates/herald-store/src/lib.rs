//! # Herald Store
//!
//! Storage abstraction for the Herald ledger. Provides a trait-based
//! interface for record persistence with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`WriteBatch`] - An ordered set of record writes committed atomically
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use herald_core::{Address, Channel, ChannelType};
//! use herald_store::{SqliteStore, Store, Write, WriteBatch};
//!
//! async fn example() -> herald_store::Result<()> {
//!     let store = SqliteStore::open("herald.db")?;
//!
//!     let owner = Address::from_bytes([1; 20]);
//!     let mut batch = WriteBatch::new();
//!     batch.push(Write::PutChannel(Channel::new(
//!         owner,
//!         ChannelType::InterestBearingOpen,
//!         50,
//!         0,
//!     )));
//!     store.commit(&batch).await?;
//!
//!     assert!(store.get_channel(&owner).await?.is_some());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use batch::{Write, WriteBatch};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{JournalEntry, Store, StoreExt};
