//! Ledger records: channels, users and memberships.
//!
//! Records are plain data. The ledger owns every state transition; the
//! store only persists what it is given.

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::fairshare::FairShare;
use crate::types::{Address, Amount, Tick};

/// Category of a channel, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelType {
    /// Protocol-owned channel that does not earn yield.
    ProtocolNonInterest = 0,
    /// Protocol-owned promotional channel.
    ProtocolPromotion = 1,
    /// Open interest-bearing channel.
    InterestBearingOpen = 2,
    /// Mutual interest-bearing channel.
    InterestBearingMutual = 3,
}

impl ChannelType {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ProtocolNonInterest),
            1 => Some(Self::ProtocolPromotion),
            2 => Some(Self::InterestBearingOpen),
            3 => Some(Self::InterestBearingMutual),
            _ => None,
        }
    }

    /// Whether an ordinary account may create a channel of this type.
    pub fn is_user_creatable(self) -> bool {
        matches!(
            self,
            Self::InterestBearingOpen | Self::InterestBearingMutual
        )
    }
}

/// A channel, keyed by its owner's address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// The owner. Immutable.
    pub owner: Address,

    /// The channel category. Immutable.
    pub channel_type: ChannelType,

    /// Amount deposited into the pool on behalf of this channel.
    pub pool_contribution: Amount,

    /// Number of memberships with `exists == true`, the owner included.
    pub member_count: u64,

    /// Fair-share accumulator state.
    pub fair_share: FairShare,

    /// Whether the channel accepts new subscribers.
    pub activated: bool,

    /// Tick of creation.
    pub created_at: Tick,

    /// Cumulative yield already paid out to leaving subscribers.
    pub yield_paid: Amount,
}

impl Channel {
    /// A freshly created channel. The owner is its first member.
    pub fn new(owner: Address, channel_type: ChannelType, pool_contribution: Amount, at: Tick) -> Self {
        Self {
            owner,
            channel_type,
            pool_contribution,
            member_count: 1,
            fair_share: FairShare::genesis(at),
            activated: true,
            created_at: at,
            yield_paid: 0,
        }
    }
}

/// A user account, created lazily on first touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Set on the first-ever subscription (or channel creation).
    pub activated: bool,

    /// Tick of activation.
    pub start_tick: Tick,

    /// Whether this address owns a channel.
    pub channellized: bool,

    /// Number of channels the user is currently a member of.
    pub subscribed_count: u64,

    /// Broadcast public key. Write-once.
    pub public_key: Option<PublicKey>,

    /// Next expected meta-transaction nonce.
    pub nonce: u64,
}

impl User {
    /// Whether a public key has been registered.
    pub fn public_key_registered(&self) -> bool {
        self.public_key.is_some()
    }
}

/// A (channel, user) membership entry.
///
/// Entries are never deleted, only toggled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Whether the user is currently a member.
    pub exists: bool,

    /// Tick at which the current (or most recent) membership began.
    pub since: Tick,
}

impl Membership {
    /// A membership starting at `at`.
    pub fn joined(at: Tick) -> Self {
        Self {
            exists: true,
            since: at,
        }
    }
}
