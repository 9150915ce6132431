//! Error types for the ledger.

use herald_auth::AuthError;
use herald_core::{AccountingError, Address, Amount, ChannelType};
use herald_store::StoreError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::pool::PoolError;

/// Broad classification of a ledger failure.
///
/// Every failure aborts the operation without a partial effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input or out-of-bounds values.
    Validation,
    /// The request conflicts with current channel or membership state.
    StateConflict,
    /// Unauthorized caller or bad signature.
    Authorization,
    /// Wrong nonce or expired signature. The stored nonce is untouched.
    Replay,
    /// Accounting bug. Never recovered silently.
    InvariantViolation,
    /// Store or pooled-funds failure.
    Infrastructure,
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Pool contribution outside the configured bounds.
    #[error("pool contribution {amount} outside [{min}, {max}]")]
    ContributionOutOfBounds {
        amount: Amount,
        min: Amount,
        max: Amount,
    },

    /// The channel type is reserved for the protocol.
    #[error("channel type {0:?} cannot be created by users")]
    ChannelTypeNotAllowed(ChannelType),

    /// The address already owns a channel.
    #[error("channel already exists: {0}")]
    ChannelExists(Address),

    /// No channel is owned by this address.
    #[error("channel not found: {0}")]
    ChannelNotFound(Address),

    /// The channel has been deactivated.
    #[error("channel deactivated: {0}")]
    ChannelDeactivated(Address),

    /// The subscriber is already a member.
    #[error("{subscriber} is already subscribed to {channel}")]
    AlreadySubscribed {
        channel: Address,
        subscriber: Address,
    },

    /// The subscriber is not a member, or is the channel owner.
    #[error("{subscriber} is either the owner of or not subscribed to {channel}")]
    NotSubscribedOrIsOwner {
        channel: Address,
        subscriber: Address,
    },

    /// Re-subscription is disabled and the subscriber left earlier.
    #[error("{subscriber} may not re-subscribe to {channel}")]
    ResubscribeDenied {
        channel: Address,
        subscriber: Address,
    },

    /// An operation was submitted from inside a pooled-funds call.
    #[error("ledger operation submitted from inside a pooled-funds call")]
    Reentrant,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Authorization error.
    #[error("authorization error: {0}")]
    Auth(#[from] AuthError),

    /// Accounting invariant violated.
    #[error("accounting error: {0}")]
    Accounting(#[from] AccountingError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Pooled-funds collaborator error.
    #[error("pooled funds error: {0}")]
    Pool(#[from] PoolError),
}

impl LedgerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::ContributionOutOfBounds { .. }
            | LedgerError::ChannelTypeNotAllowed(_)
            | LedgerError::Config(_) => ErrorKind::Validation,

            LedgerError::ChannelExists(_)
            | LedgerError::ChannelNotFound(_)
            | LedgerError::ChannelDeactivated(_)
            | LedgerError::AlreadySubscribed { .. }
            | LedgerError::NotSubscribedOrIsOwner { .. }
            | LedgerError::ResubscribeDenied { .. }
            | LedgerError::Reentrant => ErrorKind::StateConflict,

            LedgerError::Auth(auth) => match auth {
                AuthError::UnauthorizedNotification { .. } | AuthError::InvalidSignature => {
                    ErrorKind::Authorization
                }
                AuthError::InvalidNonce { .. } | AuthError::SignatureExpired { .. } => {
                    ErrorKind::Replay
                }
                AuthError::PublicKeyMismatch { .. } => ErrorKind::Validation,
            },

            LedgerError::Accounting(_) => ErrorKind::InvariantViolation,

            LedgerError::Store(_) | LedgerError::Pool(_) => ErrorKind::Infrastructure,
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let a = Address::from_bytes([1; 20]);
        assert_eq!(
            LedgerError::AlreadySubscribed {
                channel: a,
                subscriber: a
            }
            .kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            LedgerError::from(AuthError::InvalidNonce {
                expected: 0,
                got: 1
            })
            .kind(),
            ErrorKind::Replay
        );
        assert_eq!(
            LedgerError::from(AuthError::InvalidSignature).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            LedgerError::from(AccountingError::RemoveFromEmpty).kind(),
            ErrorKind::InvariantViolation
        );
        assert_eq!(
            LedgerError::from(PoolError::Unavailable("down".into())).kind(),
            ErrorKind::Infrastructure
        );
    }
}
