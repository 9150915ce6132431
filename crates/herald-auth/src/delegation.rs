//! Notification authorization.
//!
//! A notification on behalf of a channel is allowed when the caller is the
//! channel's owner, a registered delegate of the channel, or the recipient
//! itself. The last path ignores channel and delegate state entirely.

use herald_core::{Address, Channel};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// A request to dispatch a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// The channel the notification is sent from.
    pub channel: Address,
    /// The delegate the caller claims to be.
    pub delegate: Address,
    /// Who receives the notification.
    pub recipient: Address,
    /// Who is submitting the request.
    pub caller: Address,
}

/// Which rule granted a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authorization {
    /// The caller owns the (active) channel.
    Owner,
    /// The caller is a registered delegate of the (active) channel.
    Delegate,
    /// The caller notifies themselves.
    SelfNotification,
}

/// Decide whether `request` may be dispatched.
///
/// `channel` is the stored record for `request.channel`, if any.
/// `delegate_registered` reports whether `(request.channel,
/// request.delegate)` is a registered delegation.
pub fn authorize_notification(
    request: &NotificationRequest,
    channel: Option<&Channel>,
    delegate_registered: bool,
) -> Result<Authorization> {
    let channel_live = channel
        .map(|c| c.activated && c.owner == request.channel)
        .unwrap_or(false);

    if channel_live && request.caller == request.channel {
        return Ok(Authorization::Owner);
    }

    if channel_live && delegate_registered && request.delegate == request.caller {
        return Ok(Authorization::Delegate);
    }

    if request.recipient == request.caller {
        return Ok(Authorization::SelfNotification);
    }

    Err(AuthError::UnauthorizedNotification {
        channel: request.channel,
        caller: request.caller,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::ChannelType;
    use proptest::prelude::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn live_channel(owner: Address) -> Channel {
        Channel::new(owner, ChannelType::InterestBearingOpen, 50, 0)
    }

    fn request(caller: u8, delegate: u8, recipient: u8) -> NotificationRequest {
        NotificationRequest {
            channel: addr(1),
            delegate: addr(delegate),
            recipient: addr(recipient),
            caller: addr(caller),
        }
    }

    #[test]
    fn test_owner_may_notify_anyone() {
        let ch = live_channel(addr(1));
        assert_eq!(
            authorize_notification(&request(1, 0, 7), Some(&ch), false),
            Ok(Authorization::Owner)
        );
    }

    #[test]
    fn test_owner_of_deactivated_channel_denied() {
        let mut ch = live_channel(addr(1));
        ch.activated = false;
        assert!(matches!(
            authorize_notification(&request(1, 0, 7), Some(&ch), false),
            Err(AuthError::UnauthorizedNotification { .. })
        ));
    }

    #[test]
    fn test_delegate_must_be_caller_and_registered() {
        let ch = live_channel(addr(1));

        assert_eq!(
            authorize_notification(&request(2, 2, 7), Some(&ch), true),
            Ok(Authorization::Delegate)
        );
        // Registered delegate, but someone else is calling.
        assert!(authorize_notification(&request(3, 2, 7), Some(&ch), true).is_err());
        // Caller claims to be a delegate that is not registered.
        assert!(authorize_notification(&request(2, 2, 7), Some(&ch), false).is_err());
    }

    #[test]
    fn test_delegate_needs_existing_channel() {
        assert!(authorize_notification(&request(2, 2, 7), None, true).is_err());
    }

    #[test]
    fn test_stranger_denied() {
        let ch = live_channel(addr(1));
        let err = authorize_notification(&request(5, 0, 7), Some(&ch), false).unwrap_err();
        assert_eq!(
            err,
            AuthError::UnauthorizedNotification {
                channel: addr(1),
                caller: addr(5),
            }
        );
    }

    proptest! {
        #[test]
        fn prop_self_notification_always_allowed(
            caller in any::<[u8; 20]>(),
            delegate in any::<[u8; 20]>(),
            channel in any::<[u8; 20]>(),
            has_channel in any::<bool>(),
            activated in any::<bool>(),
            registered in any::<bool>(),
        ) {
            let caller = Address::from_bytes(caller);
            let channel = Address::from_bytes(channel);
            let mut record = live_channel(channel);
            record.activated = activated;

            let req = NotificationRequest {
                channel,
                delegate: Address::from_bytes(delegate),
                recipient: caller,
                caller,
            };
            let stored = if has_channel { Some(&record) } else { None };
            prop_assert!(authorize_notification(&req, stored, registered).is_ok());
        }
    }
}
