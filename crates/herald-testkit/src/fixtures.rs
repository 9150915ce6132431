//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use bytes::Bytes;
use herald_auth::{
    Expiry, MetaMessage, SendNotificationMessage, SignedMessage, SubscribeMessage,
    UnsubscribeMessage,
};
use herald_core::{Address, ChannelType, Domain, Keypair, PublicKey, Tick};
use herald_ledger::{DomainConfig, Ledger, LedgerConfig, MemoryPool};
use herald_store::{MemoryStore, SqliteStore, Store};

/// A ledger over the in-memory store.
pub type MemoryLedger = Ledger<MemoryStore, MemoryPool>;

/// A ledger over an in-memory SQLite database.
pub type SqliteLedger = Ledger<SqliteStore, MemoryPool>;

/// A participant with a deterministic secp256k1 keypair.
#[derive(Debug, Clone)]
pub struct Actor {
    pub keypair: Keypair,
}

impl Actor {
    /// Create the actor with the given index.
    ///
    /// The secret scalar is `index + 1` as a big-endian integer, so distinct
    /// indices give distinct keys and the scalar is never zero.
    pub fn from_index(index: u16) -> Self {
        let mut seed = [0u8; 32];
        seed[28..].copy_from_slice(&(u32::from(index) + 1).to_be_bytes());
        let keypair = Keypair::from_seed(&seed).expect("small nonzero scalar");
        Self { keypair }
    }

    /// The actor's address.
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// The actor's uncompressed public key.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Sign `message` under `domain`.
    pub fn sign<M: MetaMessage>(&self, domain: &Domain, message: M) -> SignedMessage<M> {
        let signature = self
            .keypair
            .sign_digest(&domain.digest(&message))
            .expect("signing a prehashed digest");
        SignedMessage::new(message, signature)
    }

    /// Sign a subscription to `channel`.
    pub fn sign_subscribe(
        &self,
        domain: &Domain,
        channel: Address,
        nonce: u64,
        expiry: Tick,
    ) -> SignedMessage<SubscribeMessage> {
        self.sign(
            domain,
            SubscribeMessage {
                channel,
                nonce,
                expiry: Expiry::at(expiry),
            },
        )
    }

    /// Sign an unsubscription from `channel`.
    pub fn sign_unsubscribe(
        &self,
        domain: &Domain,
        channel: Address,
        nonce: u64,
        expiry: Tick,
    ) -> SignedMessage<UnsubscribeMessage> {
        self.sign(
            domain,
            UnsubscribeMessage {
                channel,
                nonce,
                expiry: Expiry::at(expiry),
            },
        )
    }

    /// Sign a notification sent as this actor's channel.
    pub fn sign_notification(
        &self,
        domain: &Domain,
        recipient: Address,
        identity: &'static [u8],
        nonce: u64,
        expiry: Tick,
    ) -> SignedMessage<SendNotificationMessage> {
        self.sign(
            domain,
            SendNotificationMessage {
                channel: self.address(),
                delegate: self.address(),
                recipient,
                identity: Bytes::from_static(identity),
                nonce,
                expiry: Expiry::at(expiry),
            },
        )
    }
}

/// Create `count` distinct actors for multi-party tests.
///
/// # Panics
///
/// If `count` exceeds the number of distinct actor indices.
pub fn actors(count: usize) -> Vec<Actor> {
    let count = u16::try_from(count).expect("at most 65535 actors");
    (0..count).map(Actor::from_index).collect()
}

/// The configuration used across the test suites.
pub fn test_config() -> LedgerConfig {
    LedgerConfig {
        domain: DomainConfig {
            name: "EPNS CORE V4".to_string(),
            chain_id: 31337,
            verifying_contract: Address::from_bytes([0xcc; 20]),
        },
        ..LedgerConfig::default()
    }
}

/// A fresh ledger over the in-memory store.
pub fn memory_ledger(config: LedgerConfig) -> MemoryLedger {
    Ledger::new(MemoryStore::new(), MemoryPool::new(), config).expect("valid test config")
}

/// A fresh ledger over an in-memory SQLite database.
pub fn sqlite_ledger(config: LedgerConfig) -> SqliteLedger {
    let store = SqliteStore::open_memory().expect("open in-memory sqlite");
    Ledger::new(store, MemoryPool::new(), config).expect("valid test config")
}

/// Create an open channel for `owner` funded with the minimum contribution.
pub async fn open_channel<S: Store>(
    ledger: &Ledger<S, MemoryPool>,
    owner: Address,
    tick: Tick,
) -> herald_ledger::Result<()> {
    let amount = ledger.config().min_pool_contribution;
    ledger
        .create_channel(
            owner,
            ChannelType::InterestBearingOpen,
            Bytes::from_static(b"1+QmTestChannel"),
            amount,
            tick,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actors_are_distinct_and_stable() {
        let parties = actors(3);
        assert_ne!(parties[0].address(), parties[1].address());
        assert_ne!(parties[1].address(), parties[2].address());
        assert_eq!(parties[0].address(), Actor::from_index(0).address());
    }

    #[test]
    fn test_large_actor_sets_stay_distinct() {
        let parties = actors(300);
        let unique: std::collections::BTreeSet<_> = parties.iter().map(Actor::address).collect();
        assert_eq!(unique.len(), 300);
        assert_eq!(parties[299].address(), Actor::from_index(299).address());
    }

    #[test]
    fn test_public_key_derives_address() {
        let actor = Actor::from_index(7);
        assert_eq!(actor.public_key().to_address(), actor.address());
    }

    #[test]
    fn test_signed_message_recovers_actor() {
        let actor = Actor::from_index(2);
        let domain = test_config().domain.to_domain();
        let signed = actor.sign_subscribe(&domain, Address::from_bytes([9; 20]), 0, 100);
        assert_eq!(signed.signer(&domain, None).unwrap(), actor.address());
    }

    #[tokio::test]
    async fn test_open_channel_on_both_stores() {
        let owner = Actor::from_index(0).address();

        let memory = memory_ledger(test_config());
        open_channel(&memory, owner, 100).await.unwrap();
        assert!(memory.member_exists(&owner, &owner).await.unwrap());

        let sqlite = sqlite_ledger(test_config());
        open_channel(&sqlite, owner, 100).await.unwrap();
        assert!(sqlite.member_exists(&owner, &owner).await.unwrap());
    }
}
