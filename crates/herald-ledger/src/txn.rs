//! Unit of work for a single ledger operation.
//!
//! A [`Txn`] reads records through the store on first touch, keeps working
//! copies, and on completion produces two batches: the forward writes,
//! journal appends included, and the pre-images and retractions that undo
//! them. Nothing reaches the store until the ledger commits the forward
//! batch.

use std::collections::BTreeMap;

use herald_core::{Address, Channel, Event, Membership, User};
use herald_store::{Store, Write, WriteBatch};

use crate::error::Result;

/// A record as first read and as last staged.
struct Slot<T> {
    before: Option<T>,
    after: Option<T>,
    dirty: bool,
}

impl<T: Clone> Slot<T> {
    fn loaded(before: Option<T>) -> Self {
        Self {
            after: before.clone(),
            before,
            dirty: false,
        }
    }

    fn stage(&mut self, value: T) {
        self.after = Some(value);
        self.dirty = true;
    }
}

/// Staged state for one operation.
pub(crate) struct Txn<'a, S: Store + ?Sized> {
    store: &'a S,
    channels: BTreeMap<Address, Slot<Channel>>,
    users: BTreeMap<Address, Slot<User>>,
    memberships: BTreeMap<(Address, Address), Slot<Membership>>,
    delegates: BTreeMap<(Address, Address), Slot<bool>>,
    events: Vec<Event>,
}

/// The output of a finished [`Txn`].
pub(crate) struct Staged {
    pub forward: WriteBatch,
    pub undo: WriteBatch,
    /// Journal head once `forward` is committed.
    pub head: u64,
}

impl<'a, S: Store + ?Sized> Txn<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            channels: BTreeMap::new(),
            users: BTreeMap::new(),
            memberships: BTreeMap::new(),
            delegates: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub async fn channel(&mut self, owner: &Address) -> Result<Option<Channel>> {
        if !self.channels.contains_key(owner) {
            let loaded = self.store.get_channel(owner).await?;
            self.channels.insert(*owner, Slot::loaded(loaded));
        }
        Ok(self.channels.get(owner).and_then(|s| s.after.clone()))
    }

    pub async fn put_channel(&mut self, channel: Channel) -> Result<()> {
        self.channel(&channel.owner).await?;
        if let Some(slot) = self.channels.get_mut(&channel.owner) {
            slot.stage(channel);
        }
        Ok(())
    }

    /// The user record, defaulted when absent.
    pub async fn user(&mut self, address: &Address) -> Result<User> {
        if !self.users.contains_key(address) {
            let loaded = self.store.get_user(address).await?;
            self.users.insert(*address, Slot::loaded(loaded));
        }
        Ok(self
            .users
            .get(address)
            .and_then(|s| s.after.clone())
            .unwrap_or_default())
    }

    pub async fn put_user(&mut self, address: &Address, user: User) -> Result<()> {
        self.user(address).await?;
        if let Some(slot) = self.users.get_mut(address) {
            slot.stage(user);
        }
        Ok(())
    }

    pub async fn membership(
        &mut self,
        channel: &Address,
        user: &Address,
    ) -> Result<Option<Membership>> {
        let key = (*channel, *user);
        if !self.memberships.contains_key(&key) {
            let loaded = self.store.get_membership(channel, user).await?;
            self.memberships.insert(key, Slot::loaded(loaded));
        }
        Ok(self.memberships.get(&key).and_then(|s| s.after))
    }

    pub async fn put_membership(
        &mut self,
        channel: &Address,
        user: &Address,
        membership: Membership,
    ) -> Result<()> {
        self.membership(channel, user).await?;
        if let Some(slot) = self.memberships.get_mut(&(*channel, *user)) {
            slot.stage(membership);
        }
        Ok(())
    }

    pub async fn is_delegate(&mut self, channel: &Address, delegate: &Address) -> Result<bool> {
        let key = (*channel, *delegate);
        if !self.delegates.contains_key(&key) {
            let loaded = self.store.is_delegate(channel, delegate).await?;
            self.delegates.insert(key, Slot::loaded(Some(loaded)));
        }
        Ok(self
            .delegates
            .get(&key)
            .and_then(|s| s.after)
            .unwrap_or(false))
    }

    pub async fn set_delegate(
        &mut self,
        channel: &Address,
        delegate: &Address,
        allowed: bool,
    ) -> Result<()> {
        self.is_delegate(channel, delegate).await?;
        if let Some(slot) = self.delegates.get_mut(&(*channel, *delegate)) {
            slot.stage(allowed);
        }
        Ok(())
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Whether anything has been staged.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.channels.values().all(|s| !s.dirty)
            && self.users.values().all(|s| !s.dirty)
            && self.memberships.values().all(|s| !s.dirty)
            && self.delegates.values().all(|s| !s.dirty)
    }

    /// Build both batches, numbering events from `head + 1`.
    pub fn finish(self, head: u64) -> Staged {
        let mut forward = WriteBatch::new();
        let mut undo = WriteBatch::new();

        let mut seq = head;
        for event in self.events {
            seq += 1;
            forward.push(Write::AppendEvent { seq, event });
        }
        undo.extend((head + 1..=seq).rev().map(Write::RetractEvent));

        for (owner, slot) in self.channels.into_iter().filter(|(_, s)| s.dirty) {
            if let Some(after) = slot.after {
                forward.push(Write::PutChannel(after));
            }
            undo.push(match slot.before {
                Some(before) => Write::PutChannel(before),
                None => Write::DeleteChannel(owner),
            });
        }

        for (address, slot) in self.users.into_iter().filter(|(_, s)| s.dirty) {
            if let Some(user) = slot.after {
                forward.push(Write::PutUser { address, user });
            }
            undo.push(match slot.before {
                Some(user) => Write::PutUser { address, user },
                None => Write::DeleteUser(address),
            });
        }

        for ((channel, user), slot) in self.memberships.into_iter().filter(|(_, s)| s.dirty) {
            if let Some(membership) = slot.after {
                forward.push(Write::PutMembership {
                    channel,
                    user,
                    membership,
                });
            }
            undo.push(match slot.before {
                Some(membership) => Write::PutMembership {
                    channel,
                    user,
                    membership,
                },
                None => Write::DeleteMembership { channel, user },
            });
        }

        for ((channel, delegate), slot) in self.delegates.into_iter().filter(|(_, s)| s.dirty) {
            forward.push(Write::SetDelegate {
                channel,
                delegate,
                allowed: slot.after.unwrap_or(false),
            });
            undo.push(Write::SetDelegate {
                channel,
                delegate,
                allowed: slot.before.unwrap_or(false),
            });
        }

        Staged {
            forward,
            undo,
            head: seq,
        }
    }
}
