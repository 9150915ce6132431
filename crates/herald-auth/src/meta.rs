//! Meta-transaction messages and their verification.
//!
//! A relayer submits a [`SignedMessage`] on behalf of a signer. Verification
//! runs in a fixed order:
//!
//! 1. recover the signer from the typed-data digest
//! 2. compare it with the expected signer, when one is implied
//! 3. compare the message nonce with the signer's stored nonce
//! 4. reject when `expiry < now`, unless the expiry lies past every tick
//!
//! Steps 1 and 2 are [`SignedMessage::signer`]; steps 3 and 4 are
//! [`SignedMessage::check_replay`]. The caller looks up the stored nonce in
//! between, since it belongs to the recovered signer.

use bytes::Bytes;
use herald_core::{Address, Domain, SplitSignature, StructEncoder, Tick, TypedStruct};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Typed-data schema for a meta-subscribe.
pub const SUBSCRIBE_TYPE: &str = "Subscribe(address channel,uint256 nonce,uint256 expiry)";

/// Typed-data schema for a meta-unsubscribe.
pub const UNSUBSCRIBE_TYPE: &str = "Unsubscribe(address channel,uint256 nonce,uint256 expiry)";

/// Typed-data schema for a meta-notification.
pub const SEND_NOTIFICATION_TYPE: &str = "SendNotification(address channel,address delegate,address recipient,bytes identity,uint256 nonce,uint256 expiry)";

/// A typed struct that carries replay protection fields.
pub trait MetaMessage: TypedStruct {
    /// The nonce the signer committed to.
    fn nonce(&self) -> u64;

    /// Last tick at which the signature is usable.
    fn expiry(&self) -> Expiry;
}

/// The signed `uint256 expiry` field.
///
/// Kept as the full big-endian word so that signatures over deadlines wider
/// than a tick, such as the all-ones "never" value, still verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expiry([u8; 32]);

impl Expiry {
    /// The largest uint256. Never expires.
    pub const NEVER: Self = Self([0xff; 32]);

    /// Expire after `tick`.
    pub fn at(tick: Tick) -> Self {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&tick.to_be_bytes());
        Self(word)
    }

    /// Wrap a raw uint256 word.
    pub fn from_word(word: [u8; 32]) -> Self {
        Self(word)
    }

    /// The raw uint256 word.
    pub fn word(&self) -> [u8; 32] {
        self.0
    }

    /// The deadline as a tick, or `None` if it is beyond every tick.
    pub fn as_tick(&self) -> Option<Tick> {
        if self.0[..24].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[24..]);
        Some(Tick::from_be_bytes(low))
    }
}

impl From<Tick> for Expiry {
    fn from(tick: Tick) -> Self {
        Self::at(tick)
    }
}

/// Subscribe the signer to `channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeMessage {
    pub channel: Address,
    pub nonce: u64,
    pub expiry: Expiry,
}

/// Unsubscribe the signer from `channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeMessage {
    pub channel: Address,
    pub nonce: u64,
    pub expiry: Expiry,
}

/// Send a notification from `channel` to `recipient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendNotificationMessage {
    pub channel: Address,
    pub delegate: Address,
    pub recipient: Address,
    pub identity: Bytes,
    pub nonce: u64,
    pub expiry: Expiry,
}

impl TypedStruct for SubscribeMessage {
    fn type_string(&self) -> &'static str {
        SUBSCRIBE_TYPE
    }

    fn encode_fields(&self, encoder: StructEncoder) -> StructEncoder {
        encoder
            .address(&self.channel)
            .uint(self.nonce.into())
            .word(self.expiry.word())
    }
}

impl TypedStruct for UnsubscribeMessage {
    fn type_string(&self) -> &'static str {
        UNSUBSCRIBE_TYPE
    }

    fn encode_fields(&self, encoder: StructEncoder) -> StructEncoder {
        encoder
            .address(&self.channel)
            .uint(self.nonce.into())
            .word(self.expiry.word())
    }
}

impl TypedStruct for SendNotificationMessage {
    fn type_string(&self) -> &'static str {
        SEND_NOTIFICATION_TYPE
    }

    fn encode_fields(&self, encoder: StructEncoder) -> StructEncoder {
        encoder
            .address(&self.channel)
            .address(&self.delegate)
            .address(&self.recipient)
            .bytes(&self.identity)
            .uint(self.nonce.into())
            .word(self.expiry.word())
    }
}

macro_rules! impl_meta_message {
    ($($ty:ty),*) => {
        $(
            impl MetaMessage for $ty {
                fn nonce(&self) -> u64 {
                    self.nonce
                }

                fn expiry(&self) -> Expiry {
                    self.expiry
                }
            }
        )*
    };
}

impl_meta_message!(SubscribeMessage, UnsubscribeMessage, SendNotificationMessage);

/// A message together with its `(v, r, s)` signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage<M> {
    pub message: M,
    pub signature: SplitSignature,
}

impl<M: MetaMessage> SignedMessage<M> {
    /// Pair a message with its signature.
    pub fn new(message: M, signature: SplitSignature) -> Self {
        Self { message, signature }
    }

    /// Recover the signer and check it against `expected`.
    ///
    /// Only the legacy `v` values 27 and 28 are accepted.
    pub fn signer(&self, domain: &Domain, expected: Option<&Address>) -> Result<Address> {
        if !matches!(self.signature.v, 27 | 28) {
            return Err(AuthError::InvalidSignature);
        }

        let digest = domain.digest(&self.message);
        let signer = self
            .signature
            .recover(&digest)
            .map_err(|_| AuthError::InvalidSignature)?;

        if signer.is_zero() {
            return Err(AuthError::InvalidSignature);
        }
        if let Some(expected) = expected {
            if *expected != signer {
                tracing::debug!(%signer, %expected, "meta signer mismatch");
                return Err(AuthError::InvalidSignature);
            }
        }
        Ok(signer)
    }

    /// Check the nonce against the signer's stored nonce, then the expiry.
    pub fn check_replay(&self, stored_nonce: u64, now: Tick) -> Result<()> {
        let nonce = self.message.nonce();
        if nonce != stored_nonce {
            return Err(AuthError::InvalidNonce {
                expected: stored_nonce,
                got: nonce,
            });
        }

        match self.message.expiry().as_tick() {
            Some(expiry) if expiry < now => Err(AuthError::SignatureExpired { expiry, now }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{Keccak256Hash, Keypair};

    fn domain() -> Domain {
        Domain::new("EPNS CORE V4", 1, Address::from_bytes([0xcc; 20]))
    }

    fn sign<M: MetaMessage>(kp: &Keypair, domain: &Domain, message: M) -> SignedMessage<M> {
        let sig = kp.sign_digest(&domain.digest(&message)).unwrap();
        SignedMessage::new(message, sig)
    }

    fn subscribe(nonce: u64, expiry: Tick) -> SubscribeMessage {
        SubscribeMessage {
            channel: Address::from_bytes([1; 20]),
            nonce,
            expiry: Expiry::at(expiry),
        }
    }

    #[test]
    fn test_schemas_differ_for_same_fields() {
        let sub = subscribe(0, 10);
        let unsub = UnsubscribeMessage {
            channel: sub.channel,
            nonce: 0,
            expiry: Expiry::at(10),
        };
        assert_ne!(sub.struct_hash(), unsub.struct_hash());
    }

    #[test]
    fn test_recovers_signer() {
        let kp = Keypair::generate();
        let signed = sign(&kp, &domain(), subscribe(0, 10));
        assert_eq!(signed.signer(&domain(), None).unwrap(), kp.address());
        assert_eq!(signed.signer(&domain(), Some(&kp.address())).unwrap(), kp.address());
    }

    #[test]
    fn test_expected_signer_mismatch() {
        let kp = Keypair::generate();
        let signed = sign(&kp, &domain(), subscribe(0, 10));
        let other = Address::from_bytes([9; 20]);
        assert_eq!(
            signed.signer(&domain(), Some(&other)),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_other_domain_recovers_someone_else() {
        let kp = Keypair::generate();
        let signed = sign(&kp, &domain(), subscribe(0, 10));
        let forked = Domain::new("EPNS CORE V4", 5, Address::from_bytes([0xcc; 20]));
        assert_eq!(
            signed.signer(&forked, Some(&kp.address())),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let mut bad = [0u8; 32];
        bad[..31].copy_from_slice(&[0xba, 0xdb, 0xad].repeat(11)[..31]);
        let signed = SignedMessage::new(subscribe(0, 10), SplitSignature::new(0, bad, bad));
        assert_eq!(signed.signer(&domain(), None), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_tampered_message_rejected() {
        let kp = Keypair::generate();
        let mut signed = sign(&kp, &domain(), subscribe(0, 10));
        signed.message.expiry = Expiry::at(11);
        assert_eq!(
            signed.signer(&domain(), Some(&kp.address())),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_replay_checks_nonce_before_expiry() {
        let kp = Keypair::generate();
        let signed = sign(&kp, &domain(), subscribe(3, 10));

        assert_eq!(
            signed.check_replay(2, 50),
            Err(AuthError::InvalidNonce { expected: 2, got: 3 })
        );
        assert_eq!(
            signed.check_replay(3, 50),
            Err(AuthError::SignatureExpired { expiry: 10, now: 50 })
        );
        // Usable through the expiry tick itself.
        assert!(signed.check_replay(3, 10).is_ok());
    }

    #[test]
    fn test_notification_identity_is_signed() {
        let kp = Keypair::generate();
        let message = SendNotificationMessage {
            channel: kp.address(),
            delegate: Address::from_bytes([2; 20]),
            recipient: Address::from_bytes([3; 20]),
            identity: Bytes::from_static(b"abcd"),
            nonce: 0,
            expiry: Expiry::NEVER,
        };
        let mut signed = sign(&kp, &domain(), message);
        assert!(signed.signer(&domain(), Some(&kp.address())).is_ok());

        signed.message.identity = Bytes::from_static(b"abce");
        assert!(signed.signer(&domain(), Some(&kp.address())).is_err());
    }

    #[test]
    fn test_tick_expiry_encodes_as_uint() {
        let via_uint = StructEncoder::new(Keccak256Hash::hash(b"t")).uint(1_234).finish();
        let via_expiry = StructEncoder::new(Keccak256Hash::hash(b"t"))
            .word(Expiry::at(1_234).word())
            .finish();
        assert_eq!(via_uint, via_expiry);
        assert_eq!(Expiry::at(1_234).as_tick(), Some(1_234));
    }

    #[test]
    fn test_wide_expiry_never_lapses() {
        let kp = Keypair::generate();
        let mut message = subscribe(0, 0);
        message.expiry = Expiry::NEVER;
        let signed = sign(&kp, &domain(), message);
        assert!(signed.check_replay(0, Tick::MAX).is_ok());

        let mut just_past_ticks = [0u8; 32];
        just_past_ticks[23] = 1;
        assert_eq!(Expiry::from_word(just_past_ticks).as_tick(), None);
    }
}
