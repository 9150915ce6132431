//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use herald_core::{Address, Channel, Event, Membership, User};

use crate::batch::{Write, WriteBatch};
use crate::error::{Result, StoreError};
use crate::traits::{JournalEntry, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Channels indexed by owner.
    channels: BTreeMap<Address, Channel>,

    /// User records.
    users: BTreeMap<Address, User>,

    /// Membership index: (channel, user) -> entry.
    memberships: BTreeMap<(Address, Address), Membership>,

    /// Authorized (channel, delegate) pairs.
    delegates: BTreeSet<(Address, Address)>,

    /// Event journal, keyed by seq.
    journal: BTreeMap<u64, Event>,
}

impl MemoryStoreInner {
    fn head(&self) -> u64 {
        self.journal.keys().next_back().copied().unwrap_or(0)
    }

    /// Reject a batch whose journal writes do not chain from the head.
    fn check_journal(&self, batch: &WriteBatch) -> Result<()> {
        let mut head = self.head();
        for write in batch.writes() {
            match write {
                Write::AppendEvent { seq, .. } if *seq == head + 1 => head = *seq,
                Write::RetractEvent(seq) if *seq == head && head > 0 => head -= 1,
                Write::AppendEvent { seq, .. } | Write::RetractEvent(seq) => {
                    return Err(StoreError::InvalidData(format!(
                        "journal write at seq {seq} does not match head {head}"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, write: &Write) {
        match write {
            Write::PutChannel(channel) => {
                self.channels.insert(channel.owner, channel.clone());
            }
            Write::DeleteChannel(owner) => {
                self.channels.remove(owner);
            }
            Write::PutUser { address, user } => {
                self.users.insert(*address, user.clone());
            }
            Write::DeleteUser(address) => {
                self.users.remove(address);
            }
            Write::PutMembership {
                channel,
                user,
                membership,
            } => {
                self.memberships.insert((*channel, *user), *membership);
            }
            Write::DeleteMembership { channel, user } => {
                self.memberships.remove(&(*channel, *user));
            }
            Write::SetDelegate {
                channel,
                delegate,
                allowed,
            } => {
                if *allowed {
                    self.delegates.insert((*channel, *delegate));
                } else {
                    self.delegates.remove(&(*channel, *delegate));
                }
            }
            Write::AppendEvent { seq, event } => {
                self.journal.insert(*seq, event.clone());
            }
            Write::RetractEvent(seq) => {
                self.journal.remove(seq);
            }
        }
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_channel(&self, owner: &Address) -> Result<Option<Channel>> {
        Ok(self.read()?.channels.get(owner).cloned())
    }

    async fn get_user(&self, address: &Address) -> Result<Option<User>> {
        Ok(self.read()?.users.get(address).cloned())
    }

    async fn get_membership(
        &self,
        channel: &Address,
        user: &Address,
    ) -> Result<Option<Membership>> {
        Ok(self.read()?.memberships.get(&(*channel, *user)).copied())
    }

    async fn is_delegate(&self, channel: &Address, delegate: &Address) -> Result<bool> {
        Ok(self.read()?.delegates.contains(&(*channel, *delegate)))
    }

    async fn list_channels(&self) -> Result<Vec<Address>> {
        Ok(self.read()?.channels.keys().copied().collect())
    }

    async fn list_members(&self, channel: &Address) -> Result<Vec<Address>> {
        let inner = self.read()?;
        Ok(inner
            .memberships
            .range((*channel, Address::ZERO)..=(*channel, Address::from_bytes([0xff; 20])))
            .filter(|(_, m)| m.exists)
            .map(|((_, user), _)| *user)
            .collect())
    }

    async fn users_count(&self) -> Result<u64> {
        Ok(self.read()?.users.values().filter(|u| u.activated).count() as u64)
    }

    async fn channels_count(&self) -> Result<u64> {
        Ok(self.read()?.channels.len() as u64)
    }

    async fn commit(&self, batch: &WriteBatch) -> Result<()> {
        let mut inner = self.write()?;
        inner.check_journal(batch)?;
        for write in batch.writes() {
            inner.apply(write);
        }
        Ok(())
    }

    async fn journal_head(&self) -> Result<u64> {
        Ok(self.read()?.head())
    }

    async fn events_since(&self, after_seq: u64) -> Result<Vec<JournalEntry>> {
        let inner = self.read()?;
        Ok(inner
            .journal
            .range(after_seq.saturating_add(1)..)
            .map(|(seq, event)| JournalEntry {
                seq: *seq,
                event: event.clone(),
            })
            .collect())
    }
}
