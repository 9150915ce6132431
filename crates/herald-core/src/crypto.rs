//! Cryptographic primitives for Herald.
//!
//! Wraps secp256k1 ECDSA (recoverable, split `v/r/s` form) and Keccak-256
//! with strong types. Addresses are derived from public keys the usual way:
//! the last 20 bytes of the Keccak-256 hash of the 64-byte uncompressed key.

use bytes::Bytes;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::error::CoreError;
use crate::types::Address;

/// A 32-byte Keccak-256 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keccak256Hash(pub [u8; 32]);

impl Keccak256Hash {
    /// Compute the Keccak-256 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        let digest = Keccak256::digest(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Hash the concatenation of several byte slices.
    pub fn hash_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = Keccak256::new();
        for part in parts {
            hasher.update(part);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The zero hash (sentinel value).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Keccak256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keccak256({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Keccak256Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Keccak256Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A 64-byte uncompressed secp256k1 public key (without the `0x04` prefix).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 64]);

impl PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice that must be exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| CoreError::InvalidPublicKey)?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Derive the account address controlled by this key.
    pub fn to_address(&self) -> Address {
        let hash = Keccak256Hash::hash(&self.0);
        let mut out = [0u8; 20];
        out.copy_from_slice(&hash.0[12..]);
        Address(out)
    }

    /// Check that the bytes encode a point on the curve.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut sec1 = [0u8; 65];
        sec1[0] = 0x04;
        sec1[1..].copy_from_slice(&self.0);
        VerifyingKey::from_sec1_bytes(&sec1)
            .map(|_| ())
            .map_err(|_| CoreError::InvalidPublicKey)
    }

    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let mut out = [0u8; 64];
        out.copy_from_slice(&point.as_bytes()[1..]);
        Self(out)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Bytes::deserialize(deserializer)?;
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// An ECDSA signature in split `(v, r, s)` form.
///
/// `v` is accepted either as a raw recovery id (0/1) or with the legacy
/// offset of 27 (27/28).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitSignature {
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl SplitSignature {
    /// Create from parts.
    pub const fn new(v: u8, r: [u8; 32], s: [u8; 32]) -> Self {
        Self { v, r, s }
    }

    fn recovery_id(&self) -> Result<RecoveryId, CoreError> {
        let normalized = match self.v {
            0 | 1 => self.v,
            27 | 28 => self.v - 27,
            other => return Err(CoreError::InvalidRecoveryId(other)),
        };
        RecoveryId::from_byte(normalized).ok_or(CoreError::InvalidRecoveryId(self.v))
    }

    /// Recover the address that produced this signature over `digest`.
    pub fn recover(&self, digest: &Keccak256Hash) -> Result<Address, CoreError> {
        let recovery_id = self.recovery_id()?;

        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);
        let signature = Signature::from_slice(&rs).map_err(|_| CoreError::InvalidSignature)?;

        let key = VerifyingKey::recover_from_prehash(&digest.0, &signature, recovery_id)
            .map_err(|_| CoreError::InvalidSignature)?;

        Ok(PublicKey::from_verifying_key(&key).to_address())
    }
}

impl fmt::Debug for SplitSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SplitSignature(v={}, r={}...)",
            self.v,
            &hex::encode(self.r)[..16]
        )
    }
}

/// A secp256k1 keypair for signing typed-data digests.
///
/// This wraps k256's SigningKey.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        Self { signing_key }
    }

    /// Create from a 32-byte secret scalar.
    ///
    /// Fails if the scalar is zero or not below the curve order.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CoreError> {
        let signing_key = SigningKey::from_slice(seed).map_err(|_| CoreError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Get the uncompressed public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Get the address controlled by this keypair.
    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    /// Sign a 32-byte digest, producing a recoverable split signature
    /// with `v` in legacy form (27/28).
    pub fn sign_digest(&self, digest: &Keccak256Hash) -> Result<SplitSignature, CoreError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest.0)
            .map_err(|e| CoreError::SigningFailed(e.to_string()))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(SplitSignature {
            v: 27 + recovery_id.to_byte(),
            r,
            s,
        })
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_vector() {
        assert_eq!(
            Keccak256Hash::hash(b"").to_hex(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_hash_parts_matches_concatenation() {
        let joined = Keccak256Hash::hash(b"helloworld");
        let parts = Keccak256Hash::hash_parts(&[b"hello", b"world"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn test_address_of_secret_one() {
        let mut seed = [0u8; 32];
        seed[31] = 1;
        let keypair = Keypair::from_seed(&seed).unwrap();
        assert_eq!(
            keypair.address().to_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_zero_seed_rejected() {
        assert!(Keypair::from_seed(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_sign_and_recover() {
        let keypair = Keypair::generate();
        let digest = Keccak256Hash::hash(b"subscribe");
        let sig = keypair.sign_digest(&digest).unwrap();

        assert!(sig.v == 27 || sig.v == 28);
        assert_eq!(sig.recover(&digest).unwrap(), keypair.address());

        // Raw recovery id form recovers the same address
        let raw = SplitSignature::new(sig.v - 27, sig.r, sig.s);
        assert_eq!(raw.recover(&digest).unwrap(), keypair.address());

        // A different digest recovers someone else (or fails)
        let other = Keccak256Hash::hash(b"unsubscribe");
        if let Ok(addr) = sig.recover(&other) {
            assert_ne!(addr, keypair.address());
        }
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let digest = Keccak256Hash::hash(b"x");
        let sig = SplitSignature::new(0, [0u8; 32], [0u8; 32]);
        assert!(sig.recover(&digest).is_err());

        let bad_v = SplitSignature::new(5, [1u8; 32], [1u8; 32]);
        assert!(matches!(
            bad_v.recover(&digest),
            Err(CoreError::InvalidRecoveryId(5))
        ));
    }

    #[test]
    fn test_public_key_validation() {
        let keypair = Keypair::generate();
        let pk = keypair.public_key();
        assert!(pk.validate().is_ok());
        assert_eq!(pk.to_address(), keypair.address());

        assert!(PublicKey::from_bytes([7u8; 64]).validate().is_err());
        assert!(PublicKey::from_slice(&[1u8; 63]).is_err());
    }

    #[test]
    fn test_public_key_serde() {
        let pk = Keypair::generate().public_key();
        let json = serde_json::to_string(&pk).unwrap();
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(pk, back);
    }
}
