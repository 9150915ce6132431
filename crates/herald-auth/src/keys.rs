//! Broadcast public key checks.

use herald_core::{Address, PublicKey};

use crate::error::{AuthError, Result};

/// Accept `key` as `owner`'s broadcast key only if it is a valid curve
/// point that derives to `owner`.
pub fn check_public_key(owner: &Address, key: &PublicKey) -> Result<()> {
    let mismatch = || AuthError::PublicKeyMismatch { expected: *owner };
    key.validate().map_err(|_| mismatch())?;
    if key.to_address() != *owner {
        return Err(mismatch());
    }
    Ok(())
}
