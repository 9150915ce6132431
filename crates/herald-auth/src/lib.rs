//! # Herald Auth
//!
//! Authorization rules for the Herald ledger.
//!
//! - [`authorize_notification`] - the owner / delegate / self rule for
//!   dispatching notifications
//! - [`SignedMessage`] - meta-transaction verification: signer recovery,
//!   nonce sequencing and expiry
//! - [`check_public_key`] - broadcast key ownership
//!
//! Everything here is pure: callers read the state a rule needs from the
//! store and pass it in.

pub mod delegation;
pub mod error;
pub mod keys;
pub mod meta;

pub use delegation::{authorize_notification, Authorization, NotificationRequest};
pub use error::{AuthError, Result};
pub use keys::check_public_key;
pub use meta::{
    Expiry, MetaMessage, SendNotificationMessage, SignedMessage, SubscribeMessage, UnsubscribeMessage,
    SEND_NOTIFICATION_TYPE, SUBSCRIBE_TYPE, UNSUBSCRIBE_TYPE,
};
