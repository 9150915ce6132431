//! Atomic write batches.
//!
//! Every ledger operation stages its record mutations and journal entries
//! into one [`WriteBatch`] and commits it in a single call. A store applies
//! a batch entirely or not at all.

use herald_core::{Address, Channel, Event, Membership, User};

/// A single record mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Insert or replace a channel (keyed by owner).
    PutChannel(Channel),
    /// Remove a channel record.
    DeleteChannel(Address),
    /// Insert or replace a user record.
    PutUser { address: Address, user: User },
    /// Remove a user record.
    DeleteUser(Address),
    /// Insert or replace a membership entry.
    PutMembership {
        channel: Address,
        user: Address,
        membership: Membership,
    },
    /// Remove a membership entry.
    DeleteMembership { channel: Address, user: Address },
    /// Set or clear a (channel, delegate) authorization.
    SetDelegate {
        channel: Address,
        delegate: Address,
        allowed: bool,
    },
    /// Append an event to the journal. `seq` must be one past the head.
    AppendEvent { seq: u64, event: Event },
    /// Remove the journal head. `seq` must be the current head.
    RetractEvent(u64),
}

/// An ordered list of writes applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a write.
    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    /// The writes, in application order.
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Number of writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

impl FromIterator<Write> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = Write>>(iter: I) -> Self {
        Self {
            writes: iter.into_iter().collect(),
        }
    }
}

impl Extend<Write> for WriteBatch {
    fn extend<I: IntoIterator<Item = Write>>(&mut self, iter: I) {
        self.writes.extend(iter);
    }
}

impl IntoIterator for WriteBatch {
    type Item = Write;
    type IntoIter = std::vec::IntoIter<Write>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}
