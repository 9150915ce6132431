//! Typed structured-data hashing (EIP-712 style).
//!
//! A signed message is bound to a domain (contract name, chain id and
//! verifying contract address) so a signature produced for one deployment
//! can never be replayed against another. The digest that gets signed is:
//!
//! ```text
//! keccak256(0x19 || 0x01 || domain_separator || struct_hash)
//! ```
//!
//! where `struct_hash = keccak256(type_hash || enc(field_1) || ... )` and
//! every field is encoded as one 32-byte word. Dynamic `bytes` and `string`
//! fields are replaced by their Keccak-256 hash.

use serde::{Deserialize, Serialize};

use crate::crypto::Keccak256Hash;
use crate::types::Address;

/// The type string of the domain struct.
pub const DOMAIN_TYPE: &str = "EIP712Domain(string name,uint256 chainId,address verifyingContract)";

/// Compute the type hash of a struct type string.
pub fn type_hash(type_string: &str) -> Keccak256Hash {
    Keccak256Hash::hash(type_string.as_bytes())
}

/// The signing domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// The contract name.
    pub name: String,
    /// The chain id.
    pub chain_id: u64,
    /// The address of the verifying contract.
    pub verifying_contract: Address,
}

impl Domain {
    /// Create a new domain.
    pub fn new(name: impl Into<String>, chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: name.into(),
            chain_id,
            verifying_contract,
        }
    }

    /// Compute the domain separator.
    pub fn separator(&self) -> Keccak256Hash {
        StructEncoder::new(type_hash(DOMAIN_TYPE))
            .string(&self.name)
            .uint(u128::from(self.chain_id))
            .address(&self.verifying_contract)
            .finish()
    }

    /// Compute the digest to sign for a typed struct under this domain.
    pub fn digest<T: TypedStruct + ?Sized>(&self, message: &T) -> Keccak256Hash {
        signing_digest(&self.separator(), &message.struct_hash())
    }
}

/// Combine a domain separator and a struct hash into the final digest.
pub fn signing_digest(separator: &Keccak256Hash, struct_hash: &Keccak256Hash) -> Keccak256Hash {
    Keccak256Hash::hash_parts(&[&[0x19, 0x01], separator.as_bytes(), struct_hash.as_bytes()])
}

/// A struct with a typed-data schema.
pub trait TypedStruct {
    /// The canonical type string, e.g. `Subscribe(address channel,uint256 nonce,uint256 expiry)`.
    fn type_string(&self) -> &'static str;

    /// Encode the fields, in schema order, after the type hash.
    fn encode_fields(&self, encoder: StructEncoder) -> StructEncoder;

    /// Compute the struct hash.
    fn struct_hash(&self) -> Keccak256Hash {
        self.encode_fields(StructEncoder::new(type_hash(self.type_string())))
            .finish()
    }
}

/// Builder for the word-aligned encoding of a struct.
#[derive(Debug, Clone)]
pub struct StructEncoder {
    buf: Vec<u8>,
}

impl StructEncoder {
    /// Start encoding a struct with the given type hash.
    pub fn new(type_hash: Keccak256Hash) -> Self {
        let mut buf = Vec::with_capacity(32 * 8);
        buf.extend_from_slice(type_hash.as_bytes());
        Self { buf }
    }

    /// Append a raw 32-byte word.
    pub fn word(mut self, word: [u8; 32]) -> Self {
        self.buf.extend_from_slice(&word);
        self
    }

    /// Append an address, left-padded to 32 bytes.
    pub fn address(self, address: &Address) -> Self {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(address.as_bytes());
        self.word(word)
    }

    /// Append an unsigned integer as a big-endian uint256.
    pub fn uint(self, value: u128) -> Self {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&value.to_be_bytes());
        self.word(word)
    }

    /// Append a dynamic `bytes` field (hashed).
    pub fn bytes(self, data: &[u8]) -> Self {
        self.word(Keccak256Hash::hash(data).0)
    }

    /// Append a dynamic `string` field (hashed).
    pub fn string(self, value: &str) -> Self {
        self.bytes(value.as_bytes())
    }

    /// Append a nested struct by its struct hash.
    pub fn nested(self, struct_hash: Keccak256Hash) -> Self {
        self.word(struct_hash.0)
    }

    /// Hash the encoded struct.
    pub fn finish(self) -> Keccak256Hash {
        Keccak256Hash::hash(&self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::from_hex(s).unwrap()
    }

    #[test]
    fn test_standard_domain_type_hash() {
        let th = type_hash(
            "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        assert_eq!(
            th.to_hex(),
            "8b73c3c69bb8fe3d512ecc4cf759cc79239f7b179b0ffacaa9a75d522b39400f"
        );
    }

    /// The reference "Ether Mail" example.
    #[test]
    fn test_mail_reference_vector() {
        const PERSON: &str = "Person(string name,address wallet)";
        const MAIL: &str =
            "Mail(Person from,Person to,string contents)Person(string name,address wallet)";

        let separator = StructEncoder::new(type_hash(
            "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        ))
        .string("Ether Mail")
        .string("1")
        .uint(1)
        .address(&addr("0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"))
        .finish();
        assert_eq!(
            separator.to_hex(),
            "f2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
        );

        let from = StructEncoder::new(type_hash(PERSON))
            .string("Cow")
            .address(&addr("0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"))
            .finish();
        let to = StructEncoder::new(type_hash(PERSON))
            .string("Bob")
            .address(&addr("0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"))
            .finish();
        let mail = StructEncoder::new(type_hash(MAIL))
            .nested(from)
            .nested(to)
            .string("Hello, Bob!")
            .finish();
        assert_eq!(
            mail.to_hex(),
            "c52c0ee5d84264471806290a3f2c4cecfc5490626bf912d01f240d7a274b371e"
        );

        assert_eq!(
            signing_digest(&separator, &mail).to_hex(),
            "be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
        );
    }

    #[test]
    fn test_domain_separator_binds_every_field() {
        let base = Domain::new("Herald", 1, Address::from_bytes([1; 20]));
        let sep = base.separator();

        let mut other = base.clone();
        other.name = "Other".into();
        assert_ne!(other.separator(), sep);

        let mut other = base.clone();
        other.chain_id = 5;
        assert_ne!(other.separator(), sep);

        let mut other = base;
        other.verifying_contract = Address::from_bytes([2; 20]);
        assert_ne!(other.separator(), sep);
    }

    #[test]
    fn test_uint_encoding_is_big_endian_right_aligned() {
        let a = StructEncoder::new(Keccak256Hash::ZERO).uint(1).buf;
        assert_eq!(a.len(), 64);
        assert_eq!(a[63], 1);
        assert!(a[32..63].iter().all(|b| *b == 0));
    }
}
