//! Store trait: the abstract interface for ledger persistence.
//!
//! The ledger is storage-agnostic. Implementations include SQLite
//! (primary) and in-memory (for tests).

use async_trait::async_trait;
use herald_core::{Address, Channel, Event, Membership, User};

use crate::batch::WriteBatch;
use crate::error::Result;

/// A journaled event with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,
    /// The event.
    pub event: Event,
}

/// The Store trait: async interface for ledger persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` is used internally.
///
/// # Design Notes
///
/// - **Atomic commits**: [`Store::commit`] applies a whole [`WriteBatch`] or
///   nothing. Readers never observe a half-applied batch.
/// - **Journal in the batch**: events are appended by the same batch as the
///   records they describe, with contiguous sequence numbers. Only the head
///   can be retracted, which is how a compensating batch takes back the
///   events of an operation it reverts.
/// - **Absent means default**: a missing user or membership is equivalent
///   to the default record. The store never invents records.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Record Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a channel by its owner.
    async fn get_channel(&self, owner: &Address) -> Result<Option<Channel>>;

    /// Get a user record.
    async fn get_user(&self, address: &Address) -> Result<Option<User>>;

    /// Get the membership entry for (channel, user).
    async fn get_membership(&self, channel: &Address, user: &Address)
        -> Result<Option<Membership>>;

    /// Whether `delegate` may notify on behalf of `channel`.
    async fn is_delegate(&self, channel: &Address, delegate: &Address) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Listing and Counts
    // ─────────────────────────────────────────────────────────────────────────

    /// List all channel owners, ordered by address.
    async fn list_channels(&self) -> Result<Vec<Address>>;

    /// List the current members of a channel, ordered by address.
    async fn list_members(&self, channel: &Address) -> Result<Vec<Address>>;

    /// Number of activated users.
    async fn users_count(&self) -> Result<u64>;

    /// Number of channel records.
    async fn channels_count(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply every write in the batch atomically, in order.
    ///
    /// Journal writes that do not extend or retract the current head fail
    /// with [`StoreError::InvalidData`](crate::StoreError::InvalidData) and
    /// leave the store untouched.
    async fn commit(&self, batch: &WriteBatch) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Event Journal
    // ─────────────────────────────────────────────────────────────────────────

    /// Sequence number of the newest journal entry, or 0 if empty.
    async fn journal_head(&self) -> Result<u64>;

    /// Get journal entries with `seq > after_seq`, ordered by seq.
    async fn events_since(&self, after_seq: u64) -> Result<Vec<JournalEntry>>;
}

/// Extension trait with convenience lookups built on [`Store`].
pub trait StoreExt: Store {
    /// The user record, or the default record if none is stored.
    fn user_or_default(
        &self,
        address: &Address,
    ) -> impl std::future::Future<Output = Result<User>> + Send;

    /// Whether `user` is currently a member of `channel`.
    fn member_exists(
        &self,
        channel: &Address,
        user: &Address,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn user_or_default(&self, address: &Address) -> Result<User> {
        Ok(self.get_user(address).await?.unwrap_or_default())
    }

    async fn member_exists(&self, channel: &Address, user: &Address) -> Result<bool> {
        Ok(self
            .get_membership(channel, user)
            .await?
            .map(|m| m.exists)
            .unwrap_or(false))
    }
}
