//! # Herald Core
//!
//! Pure primitives for the Herald notification ledger: addresses, the
//! fair-share accumulator, records, events, and typed-data signatures.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over accounting state and cryptographic data.
//!
//! ## Key Types
//!
//! - [`FairShare`] - O(1) share-time accumulator carried by every channel
//! - [`ShareUnits`] - Fixed-point (scale 10^7) share quantities
//! - [`Channel`], [`User`], [`Membership`] - Ledger records
//! - [`Event`] - What a committed operation emits
//! - [`Keypair`], [`SplitSignature`] - secp256k1 signing and recovery
//!
//! ## Typed data
//!
//! Meta-transactions are signed over domain-separated typed data. See the
//! [`typed_data`] module.

pub mod crypto;
pub mod error;
pub mod event;
pub mod fairshare;
pub mod fixed;
pub mod records;
pub mod typed_data;
pub mod types;

pub use crypto::{Keccak256Hash, Keypair, PublicKey, SplitSignature};
pub use error::{AccountingError, CoreError};
pub use event::Event;
pub use fairshare::{FairShare, MemberAction};
pub use fixed::{ShareUnits, SCALE};
pub use records::{Channel, ChannelType, Membership, User};
pub use typed_data::{Domain, StructEncoder, TypedStruct};
pub use types::{Address, Amount, Tick};
