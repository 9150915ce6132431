//! Error types for the auth module.

use herald_core::{Address, Tick};
use thiserror::Error;

/// Errors that can occur while authorizing a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The caller is neither the channel owner, a registered delegate, nor
    /// the recipient.
    #[error("unauthorized notification: {caller} may not notify on behalf of {channel}")]
    UnauthorizedNotification { channel: Address, caller: Address },

    /// The signature could not be recovered, or recovered to the wrong signer.
    #[error("invalid signature")]
    InvalidSignature,

    /// The supplied nonce does not match the signer's stored nonce.
    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    /// The signature's expiry is before the current tick.
    #[error("signature expired at {expiry} (now {now})")]
    SignatureExpired { expiry: Tick, now: Tick },

    /// A supplied public key does not derive to the expected address.
    #[error("public key does not belong to {expected}")]
    PublicKeyMismatch { expected: Address },
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
