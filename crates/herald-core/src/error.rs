//! Error types for Herald Core.

use thiserror::Error;

use crate::types::Tick;

/// Core errors that can occur in key handling and signature recovery.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("unsupported recovery id: {0}")]
    InvalidRecoveryId(u8),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// Accounting invariant violations.
///
/// These indicate a caller or accounting bug. They are always fatal to the
/// triggering operation and must never be silently recovered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountingError {
    #[error("tick went backwards: last update at {last_update}, event at {at}")]
    NegativeElapsed { last_update: Tick, at: Tick },

    #[error("cannot remove a member from an empty fair-share group")]
    RemoveFromEmpty,

    #[error("fixed-point overflow in {0}")]
    Overflow(&'static str),
}
