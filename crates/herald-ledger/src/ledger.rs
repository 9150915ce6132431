//! The Ledger: unified API for the Herald notification core.
//!
//! The Ledger brings together the channel registry, memberships,
//! delegation, and meta-transactions over one store and one pooled-funds
//! collaborator.
//!
//! Every mutating operation runs under a single sequencer lock and goes
//! through the same pipeline: stage records and events in a [`Txn`],
//! commit them as one batch, then call the pool if the operation moves
//! funds. A pool failure commits the undo batch, which restores the
//! records and retracts the events.
//!
//! Queries read committed state and never wait on the sequencer. While a
//! pool call is in flight that state already includes the operation's
//! accounting. Submitting an operation from inside a pool call fails with
//! [`LedgerError::Reentrant`].

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use herald_auth::{
    authorize_notification, check_public_key, Authorization, MetaMessage, NotificationRequest,
    SendNotificationMessage, SignedMessage, SubscribeMessage, UnsubscribeMessage,
};
use herald_core::{
    AccountingError, Address, Amount, Channel, ChannelType, Domain, Event, Keccak256Hash,
    MemberAction, Membership, PublicKey, Tick, User,
};
use herald_store::{JournalEntry, Store, StoreExt};

use crate::config::{LedgerConfig, ResubscribePolicy};
use crate::error::{LedgerError, Result};
use crate::pool::PooledFunds;
use crate::txn::Txn;

/// Outcome of leaving a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsubscribed {
    /// Who left.
    pub subscriber: Address,
    /// Yield paid out to the subscriber.
    pub payout: Amount,
}

/// A funds movement to perform after accounting is committed.
#[derive(Debug, Clone, Copy)]
enum PoolCall {
    Deposit { from: Address, amount: Amount },
    Withdraw { to: Address, amount: Amount },
}

tokio::task_local! {
    /// Set on a task while it is inside a pooled-funds call.
    static IN_POOL_CALL: ();
}

/// The main Ledger struct.
///
/// Provides a unified API for:
/// - Creating and deactivating channels
/// - Subscribing and unsubscribing, directly or by signature
/// - Registering broadcast public keys
/// - Managing delegates and dispatching notifications
pub struct Ledger<S: Store, P: PooledFunds> {
    store: Arc<S>,
    pool: Arc<P>,
    config: LedgerConfig,
    domain: Domain,
    sequencer: Mutex<()>,
}

impl<S: Store, P: PooledFunds> Ledger<S, P> {
    /// Create a new ledger over `store` and `pool`.
    pub fn new(store: S, pool: P, config: LedgerConfig) -> Result<Self> {
        Self::with_shared(Arc::new(store), Arc::new(pool), config)
    }

    /// Create a ledger over shared handles.
    pub fn with_shared(store: Arc<S>, pool: Arc<P>, config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let domain = config.domain.to_domain();
        Ok(Self {
            store,
            pool,
            config,
            domain,
            sequencer: Mutex::new(()),
        })
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the pooled-funds reference.
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Get the configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The typed-data domain meta-transactions must be signed under.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channel Registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a channel owned by `owner`, funded with `amount`.
    ///
    /// The owner becomes the channel's first member.
    #[tracing::instrument(skip(self, identity))]
    pub async fn create_channel(
        &self,
        owner: Address,
        channel_type: ChannelType,
        identity: Bytes,
        amount: Amount,
        tick: Tick,
    ) -> Result<()> {
        let _seq = self.sequence().await?;

        if !channel_type.is_user_creatable() {
            return Err(LedgerError::ChannelTypeNotAllowed(channel_type));
        }
        let (min, max) = (
            self.config.min_pool_contribution,
            self.config.max_pool_contribution,
        );
        if amount < min || amount > max {
            return Err(LedgerError::ContributionOutOfBounds { amount, min, max });
        }

        let mut txn = Txn::new(&*self.store);
        if txn.channel(&owner).await?.is_some() {
            return Err(LedgerError::ChannelExists(owner));
        }

        let mut user = txn.user(&owner).await?;
        activate(&mut user, tick);
        user.channellized = true;
        user.subscribed_count = increment(user.subscribed_count, "subscribed count")?;
        txn.put_user(&owner, user).await?;

        txn.put_membership(&owner, &owner, Membership::joined(tick))
            .await?;
        txn.put_channel(Channel::new(owner, channel_type, amount, tick))
            .await?;

        txn.emit(Event::ChannelCreated {
            owner,
            channel_type,
            identity,
        });
        txn.emit(Event::Subscribe {
            channel: owner,
            subscriber: owner,
        });

        self.complete(txn, Some(PoolCall::Deposit { from: owner, amount }))
            .await?;
        info!(%owner, ?channel_type, amount, "channel created");
        Ok(())
    }

    /// Deactivate `owner`'s channel and refund everything above the
    /// minimum contribution. Returns the refund.
    ///
    /// Deactivation is terminal. Existing members may still leave.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_channel(&self, owner: Address) -> Result<Amount> {
        let _seq = self.sequence().await?;

        let mut txn = Txn::new(&*self.store);
        let mut channel = self.live_channel(&mut txn, &owner).await?;

        let retained = self.config.min_pool_contribution.min(channel.pool_contribution);
        let refund = channel.pool_contribution - retained;
        channel.pool_contribution = retained;
        channel.activated = false;
        txn.put_channel(channel).await?;
        txn.emit(Event::ChannelDeactivated { owner });

        let call = (refund > 0).then_some(PoolCall::Withdraw {
            to: owner,
            amount: refund,
        });
        self.complete(txn, call).await?;
        info!(%owner, refund, "channel deactivated");
        Ok(refund)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Membership
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe `subscriber` to `channel`.
    #[tracing::instrument(skip(self))]
    pub async fn subscribe(&self, channel: Address, subscriber: Address, tick: Tick) -> Result<()> {
        let _seq = self.sequence().await?;

        let mut txn = Txn::new(&*self.store);
        self.stage_subscribe(&mut txn, channel, subscriber, tick)
            .await?;
        self.complete(txn, None).await
    }

    /// Subscribe and, on first use, register the subscriber's broadcast key.
    ///
    /// The key must derive to `subscriber` whether or not one is already
    /// registered.
    #[tracing::instrument(skip(self, public_key))]
    pub async fn subscribe_with_public_key(
        &self,
        channel: Address,
        subscriber: Address,
        public_key: PublicKey,
        tick: Tick,
    ) -> Result<()> {
        let _seq = self.sequence().await?;

        let mut txn = Txn::new(&*self.store);
        self.stage_public_key(&mut txn, subscriber, public_key)
            .await?;
        self.stage_subscribe(&mut txn, channel, subscriber, tick)
            .await?;
        self.complete(txn, None).await
    }

    /// Leave `channel`, settling the subscriber's fair share of the
    /// channel's unpaid yield.
    ///
    /// The share applies to yield not yet paid out, so the split depends
    /// on departure order. Of three equal members leaving at the same tick
    /// from yield `Y`, the first receives `Y/3` and the second `2Y/9`.
    #[tracing::instrument(skip(self))]
    pub async fn unsubscribe(
        &self,
        channel: Address,
        subscriber: Address,
        tick: Tick,
    ) -> Result<Unsubscribed> {
        let _seq = self.sequence().await?;

        let mut txn = Txn::new(&*self.store);
        let payout = self
            .stage_unsubscribe(&mut txn, channel, subscriber, tick)
            .await?;
        self.complete(txn, withdrawal(subscriber, payout)).await?;
        Ok(Unsubscribed { subscriber, payout })
    }

    /// Register `user`'s broadcast public key.
    ///
    /// Returns `false` without emitting anything if a key is already
    /// registered.
    #[tracing::instrument(skip(self, public_key))]
    pub async fn broadcast_public_key(&self, user: Address, public_key: PublicKey) -> Result<bool> {
        let _seq = self.sequence().await?;

        let mut txn = Txn::new(&*self.store);
        let registered = self.stage_public_key(&mut txn, user, public_key).await?;
        self.complete(txn, None).await?;
        Ok(registered)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delegation and Notifications
    // ─────────────────────────────────────────────────────────────────────────

    /// Allow `delegate` to send notifications on behalf of `owner`'s channel.
    #[tracing::instrument(skip(self))]
    pub async fn add_delegate(&self, owner: Address, delegate: Address) -> Result<()> {
        self.set_delegate(owner, delegate, true).await
    }

    /// Withdraw `delegate`'s permission to notify for `owner`'s channel.
    #[tracing::instrument(skip(self))]
    pub async fn remove_delegate(&self, owner: Address, delegate: Address) -> Result<()> {
        self.set_delegate(owner, delegate, false).await
    }

    /// Dispatch a notification from `channel` to `recipient`.
    ///
    /// Allowed for the channel owner, a registered delegate calling as
    /// itself, or anyone notifying themselves.
    #[tracing::instrument(skip(self, identity))]
    pub async fn send_notification(
        &self,
        caller: Address,
        channel: Address,
        delegate: Address,
        recipient: Address,
        identity: Bytes,
    ) -> Result<Authorization> {
        let _seq = self.sequence().await?;

        let mut txn = Txn::new(&*self.store);
        let request = NotificationRequest {
            channel,
            delegate,
            recipient,
            caller,
        };
        let granted = self.stage_notification(&mut txn, &request, identity).await?;
        self.complete(txn, None).await?;
        Ok(granted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Meta-transactions
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe the signer of `signed` to the signed channel.
    ///
    /// Returns the signer.
    #[tracing::instrument(skip_all, fields(channel = %signed.message.channel))]
    pub async fn subscribe_by_sig(
        &self,
        signed: &SignedMessage<SubscribeMessage>,
        tick: Tick,
    ) -> Result<Address> {
        let _seq = self.sequence().await?;

        let signer = signed.signer(&self.domain, None)?;
        let mut txn = Txn::new(&*self.store);
        self.consume_nonce(&mut txn, signed, signer, tick).await?;
        self.stage_subscribe(&mut txn, signed.message.channel, signer, tick)
            .await?;
        self.complete(txn, None).await?;
        Ok(signer)
    }

    /// Unsubscribe the signer of `signed` from the signed channel.
    #[tracing::instrument(skip_all, fields(channel = %signed.message.channel))]
    pub async fn unsubscribe_by_sig(
        &self,
        signed: &SignedMessage<UnsubscribeMessage>,
        tick: Tick,
    ) -> Result<Unsubscribed> {
        let _seq = self.sequence().await?;

        let signer = signed.signer(&self.domain, None)?;
        let mut txn = Txn::new(&*self.store);
        self.consume_nonce(&mut txn, signed, signer, tick).await?;
        let payout = self
            .stage_unsubscribe(&mut txn, signed.message.channel, signer, tick)
            .await?;
        self.complete(txn, withdrawal(signer, payout)).await?;
        Ok(Unsubscribed {
            subscriber: signer,
            payout,
        })
    }

    /// Dispatch a notification signed by the channel.
    ///
    /// The signer must be `channel`; the notification is then authorized
    /// as if the channel had called directly.
    #[tracing::instrument(skip_all, fields(channel = %signed.message.channel))]
    pub async fn send_notification_by_sig(
        &self,
        signed: &SignedMessage<SendNotificationMessage>,
        tick: Tick,
    ) -> Result<Authorization> {
        let _seq = self.sequence().await?;

        let message = &signed.message;
        let signer = signed.signer(&self.domain, Some(&message.channel))?;
        let mut txn = Txn::new(&*self.store);
        self.consume_nonce(&mut txn, signed, signer, tick).await?;

        let request = NotificationRequest {
            channel: message.channel,
            delegate: message.delegate,
            recipient: message.recipient,
            caller: signer,
        };
        let granted = self
            .stage_notification(&mut txn, &request, message.identity.clone())
            .await?;
        self.complete(txn, None).await?;
        Ok(granted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a channel by owner.
    pub async fn channel(&self, owner: &Address) -> Result<Option<Channel>> {
        Ok(self.store.get_channel(owner).await?)
    }

    /// Get a user record (the default record if never touched).
    pub async fn user(&self, address: &Address) -> Result<User> {
        Ok(self.store.user_or_default(address).await?)
    }

    /// Whether `subscriber` is currently a member of `channel`.
    pub async fn member_exists(&self, channel: &Address, subscriber: &Address) -> Result<bool> {
        Ok(self.store.member_exists(channel, subscriber).await?)
    }

    /// Current members of `channel`, ordered by address.
    pub async fn members(&self, channel: &Address) -> Result<Vec<Address>> {
        Ok(self.store.list_members(channel).await?)
    }

    /// Owners of every channel ever created, ordered by address.
    pub async fn channels(&self) -> Result<Vec<Address>> {
        Ok(self.store.list_channels().await?)
    }

    /// The nonce the next meta-transaction from `user` must carry.
    pub async fn nonce(&self, user: &Address) -> Result<u64> {
        Ok(self.store.user_or_default(user).await?.nonce)
    }

    /// Whether `delegate` may notify on behalf of `channel`.
    pub async fn is_delegate(&self, channel: &Address, delegate: &Address) -> Result<bool> {
        Ok(self.store.is_delegate(channel, delegate).await?)
    }

    /// Number of activated users.
    pub async fn users_count(&self) -> Result<u64> {
        Ok(self.store.users_count().await?)
    }

    /// Number of channels ever created.
    pub async fn channels_count(&self) -> Result<u64> {
        Ok(self.store.channels_count().await?)
    }

    /// Journaled events with sequence number greater than `after_seq`.
    pub async fn events_since(&self, after_seq: u64) -> Result<Vec<JournalEntry>> {
        Ok(self.store.events_since(after_seq).await?)
    }

    /// The domain separator meta-transaction digests are bound to.
    pub fn domain_separator(&self) -> Keccak256Hash {
        self.domain.separator()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Staging
    // ─────────────────────────────────────────────────────────────────────────

    /// Take the sequencer, refusing calls made from inside the pool.
    async fn sequence(&self) -> Result<MutexGuard<'_, ()>> {
        if IN_POOL_CALL.try_with(|_| ()).is_ok() {
            return Err(LedgerError::Reentrant);
        }
        Ok(self.sequencer.lock().await)
    }

    /// Load `owner`'s channel, requiring it to exist and be active.
    async fn live_channel(&self, txn: &mut Txn<'_, S>, owner: &Address) -> Result<Channel> {
        let channel = txn
            .channel(owner)
            .await?
            .ok_or(LedgerError::ChannelNotFound(*owner))?;
        if !channel.activated {
            return Err(LedgerError::ChannelDeactivated(*owner));
        }
        Ok(channel)
    }

    async fn stage_subscribe(
        &self,
        txn: &mut Txn<'_, S>,
        channel_addr: Address,
        subscriber: Address,
        tick: Tick,
    ) -> Result<()> {
        let mut channel = self.live_channel(txn, &channel_addr).await?;

        match txn.membership(&channel_addr, &subscriber).await? {
            Some(m) if m.exists => {
                return Err(LedgerError::AlreadySubscribed {
                    channel: channel_addr,
                    subscriber,
                })
            }
            Some(_) if self.config.resubscribe == ResubscribePolicy::Deny => {
                return Err(LedgerError::ResubscribeDenied {
                    channel: channel_addr,
                    subscriber,
                })
            }
            _ => {}
        }

        let mut user = txn.user(&subscriber).await?;
        let first_activation = activate(&mut user, tick);
        user.subscribed_count = increment(user.subscribed_count, "subscribed count")?;

        channel.fair_share = channel.fair_share.rebase(MemberAction::Added, tick)?;
        channel.member_count = increment(channel.member_count, "member count")?;

        txn.put_user(&subscriber, user).await?;
        txn.put_membership(&channel_addr, &subscriber, Membership::joined(tick))
            .await?;
        txn.put_channel(channel).await?;
        txn.emit(Event::Subscribe {
            channel: channel_addr,
            subscriber,
        });

        debug!(channel = %channel_addr, %subscriber, tick, first_activation, "subscribe staged");
        Ok(())
    }

    /// Stage a departure and return the subscriber's payout.
    async fn stage_unsubscribe(
        &self,
        txn: &mut Txn<'_, S>,
        channel_addr: Address,
        subscriber: Address,
        tick: Tick,
    ) -> Result<Amount> {
        let mut channel = txn
            .channel(&channel_addr)
            .await?
            .ok_or(LedgerError::ChannelNotFound(channel_addr))?;

        let membership = txn
            .membership(&channel_addr, &subscriber)
            .await?
            .filter(|m| m.exists && subscriber != channel.owner)
            .ok_or(LedgerError::NotSubscribedOrIsOwner {
                channel: channel_addr,
                subscriber,
            })?;

        let ratio = channel.fair_share.member_ratio(membership.since, tick)?;
        let withdrawable = IN_POOL_CALL
            .scope((), self.pool.creator_withdrawable(&channel_addr))
            .await?;
        let unpaid = withdrawable.saturating_sub(channel.yield_paid);
        let payout = ratio.apply_to(unpaid, "member payout")?;

        channel.yield_paid = channel
            .yield_paid
            .checked_add(payout)
            .ok_or(AccountingError::Overflow("yield paid"))?;
        channel.fair_share = channel.fair_share.rebase(MemberAction::Removed, tick)?;
        channel.member_count = decrement(channel.member_count)?;

        let mut user = txn.user(&subscriber).await?;
        user.subscribed_count = decrement(user.subscribed_count)?;

        txn.put_user(&subscriber, user).await?;
        txn.put_membership(
            &channel_addr,
            &subscriber,
            Membership {
                exists: false,
                since: membership.since,
            },
        )
        .await?;
        txn.put_channel(channel).await?;
        txn.emit(Event::Unsubscribe {
            channel: channel_addr,
            subscriber,
        });

        debug!(channel = %channel_addr, %subscriber, tick, %ratio, payout, "unsubscribe staged");
        Ok(payout)
    }

    /// Stage a broadcast key registration. Returns whether a key was
    /// newly registered.
    async fn stage_public_key(
        &self,
        txn: &mut Txn<'_, S>,
        user_addr: Address,
        public_key: PublicKey,
    ) -> Result<bool> {
        check_public_key(&user_addr, &public_key)?;

        let mut user = txn.user(&user_addr).await?;
        if user.public_key_registered() {
            return Ok(false);
        }
        user.public_key = Some(public_key);
        txn.put_user(&user_addr, user).await?;
        txn.emit(Event::PublicKeyRegistered {
            user: user_addr,
            public_key,
        });
        Ok(true)
    }

    async fn stage_notification(
        &self,
        txn: &mut Txn<'_, S>,
        request: &NotificationRequest,
        identity: Bytes,
    ) -> Result<Authorization> {
        let channel = txn.channel(&request.channel).await?;
        let registered = txn.is_delegate(&request.channel, &request.delegate).await?;
        let granted = authorize_notification(request, channel.as_ref(), registered)?;

        txn.emit(Event::SendNotification {
            channel: request.channel,
            recipient: request.recipient,
            identity,
        });
        debug!(channel = %request.channel, recipient = %request.recipient, ?granted, "notification authorized");
        Ok(granted)
    }

    /// Check replay fields against the signer's nonce and stage the
    /// increment.
    async fn consume_nonce<M: MetaMessage>(
        &self,
        txn: &mut Txn<'_, S>,
        signed: &SignedMessage<M>,
        signer: Address,
        tick: Tick,
    ) -> Result<()> {
        let mut user = txn.user(&signer).await?;
        signed.check_replay(user.nonce, tick)?;
        user.nonce = increment(user.nonce, "nonce")?;
        txn.put_user(&signer, user).await?;
        Ok(())
    }

    async fn set_delegate(&self, owner: Address, delegate: Address, allowed: bool) -> Result<()> {
        let _seq = self.sequence().await?;

        let mut txn = Txn::new(&*self.store);
        self.live_channel(&mut txn, &owner).await?;
        txn.set_delegate(&owner, &delegate, allowed).await?;
        txn.emit(if allowed {
            Event::AddDelegate {
                channel: owner,
                delegate,
            }
        } else {
            Event::RemoveDelegate {
                channel: owner,
                delegate,
            }
        });
        self.complete(txn, None).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commit pipeline
    // ─────────────────────────────────────────────────────────────────────────

    /// Commit staged records and events, then perform the funds movement.
    ///
    /// Nothing is written after a successful pool call, so the operation
    /// either lands whole or is reverted by the undo batch.
    async fn complete(&self, txn: Txn<'_, S>, call: Option<PoolCall>) -> Result<()> {
        let head = self.store.journal_head().await?;
        let staged = txn.finish(head);
        self.store.commit(&staged.forward).await?;

        if let Some(call) = call {
            if let Err(err) = self.invoke_pool(call).await {
                warn!(error = %err, ?call, "pooled funds call failed, reverting");
                if let Err(undo_err) = self.store.commit(&staged.undo).await {
                    error!(error = %undo_err, "failed to revert after pooled funds failure");
                    return Err(undo_err.into());
                }
                return Err(err);
            }
        }

        debug!(head = staged.head, writes = staged.forward.len(), "operation committed");
        Ok(())
    }

    async fn invoke_pool(&self, call: PoolCall) -> Result<()> {
        match call {
            PoolCall::Deposit { from, amount } => {
                IN_POOL_CALL
                    .scope((), self.pool.deposit(&from, amount))
                    .await?
            }
            PoolCall::Withdraw { to, amount } => {
                IN_POOL_CALL
                    .scope((), self.pool.withdraw(&to, amount))
                    .await?
            }
        }
        Ok(())
    }
}

/// Lazily activate a user record. Returns whether this call activated it.
fn activate(user: &mut User, tick: Tick) -> bool {
    if user.activated {
        return false;
    }
    user.activated = true;
    user.start_tick = tick;
    true
}

fn increment(value: u64, ctx: &'static str) -> Result<u64> {
    Ok(value.checked_add(1).ok_or(AccountingError::Overflow(ctx))?)
}

fn decrement(value: u64) -> Result<u64> {
    Ok(value.checked_sub(1).ok_or(AccountingError::RemoveFromEmpty)?)
}

fn withdrawal(to: Address, amount: Amount) -> Option<PoolCall> {
    (amount > 0).then_some(PoolCall::Withdraw { to, amount })
}
