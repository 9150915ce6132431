//! Events emitted by ledger operations.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::records::ChannelType;
use crate::types::Address;

/// An event emitted by a committed ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A user joined a channel.
    Subscribe { channel: Address, subscriber: Address },

    /// A user left a channel.
    Unsubscribe { channel: Address, subscriber: Address },

    /// A user's broadcast public key was recorded.
    PublicKeyRegistered { user: Address, public_key: PublicKey },

    /// A channel was created.
    ChannelCreated {
        owner: Address,
        channel_type: ChannelType,
        identity: Bytes,
    },

    /// A channel was deactivated.
    ChannelDeactivated { owner: Address },

    /// A delegate was authorized to notify on a channel's behalf.
    AddDelegate { channel: Address, delegate: Address },

    /// A delegate's authorization was withdrawn.
    RemoveDelegate { channel: Address, delegate: Address },

    /// A notification was dispatched.
    SendNotification {
        channel: Address,
        recipient: Address,
        identity: Bytes,
    },
}

impl Event {
    /// The event name.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Subscribe { .. } => "Subscribe",
            Event::Unsubscribe { .. } => "Unsubscribe",
            Event::PublicKeyRegistered { .. } => "PublicKeyRegistered",
            Event::ChannelCreated { .. } => "ChannelCreated",
            Event::ChannelDeactivated { .. } => "ChannelDeactivated",
            Event::AddDelegate { .. } => "AddDelegate",
            Event::RemoveDelegate { .. } => "RemoveDelegate",
            Event::SendNotification { .. } => "SendNotification",
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::from_reader(bytes)
    }
}
