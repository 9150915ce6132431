//! The fair-share accumulator.
//!
//! Each channel carries a triple `(count, historical_index, last_update)`.
//! On every membership change at tick `t` the triple is rebased:
//!
//! ```text
//! elapsed          = t - last_update            (must be >= 0)
//! historical_index = historical_index + count * elapsed
//! count            = count ± 1
//! last_update      = t
//! ```
//!
//! `historical_index` is the total member-weighted share-time consumed by
//! the group so far. A member's fair share of the group's yield is their own
//! share-time divided by the group's, so settlement never has to iterate
//! over the member set: both rebase and settlement are O(1).
//!
//! Both `count` and `historical_index` are [`ShareUnits`] (fixed-point,
//! scale 10^7) held in checked 128-bit integers. With one unit per member
//! the headroom is roughly `2^128 / 10^7 ≈ 3.4e31` member-ticks, i.e. a
//! billion members for 3.4e22 ticks.

use serde::{Deserialize, Serialize};

use crate::error::AccountingError;
use crate::fixed::ShareUnits;
use crate::types::Tick;

/// A membership change applied to a fair-share group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberAction {
    /// A member joined.
    Added,
    /// A member left.
    Removed,
}

/// The accumulator state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairShare {
    /// Share units currently in the group.
    pub count: ShareUnits,

    /// Cumulative share-time consumed to date (`Z`).
    pub historical_index: ShareUnits,

    /// Tick at which `historical_index` was last rebased.
    pub last_update: Tick,
}

impl FairShare {
    /// The state of a freshly created channel: the owner is the single
    /// implicit member and no share-time has accrued yet.
    pub fn genesis(created_at: Tick) -> Self {
        Self {
            count: ShareUnits::ONE,
            historical_index: ShareUnits::ZERO,
            last_update: created_at,
        }
    }

    /// Ticks elapsed since the last rebase.
    fn elapsed(&self, at: Tick) -> Result<u64, AccountingError> {
        at.checked_sub(self.last_update)
            .ok_or(AccountingError::NegativeElapsed {
                last_update: self.last_update,
                at,
            })
    }

    /// The historical index projected forward to `at` without changing the
    /// member count.
    pub fn index_at(&self, at: Tick) -> Result<ShareUnits, AccountingError> {
        let elapsed = self.elapsed(at)?;
        let accrued = self.count.checked_mul_int(elapsed, "count * elapsed")?;
        self.historical_index
            .checked_add(accrued, "historical index")
    }

    /// Rebase the triple for a membership change at `at`.
    ///
    /// Returns the new triple; the caller persists it atomically with the
    /// membership mutation. Fails if `at` precedes `last_update` or if a
    /// member is removed from an empty group.
    pub fn rebase(&self, action: MemberAction, at: Tick) -> Result<Self, AccountingError> {
        let historical_index = self.index_at(at)?;

        let count = match action {
            MemberAction::Added => self.count.checked_add(ShareUnits::ONE, "member count")?,
            MemberAction::Removed => {
                if self.count < ShareUnits::ONE {
                    return Err(AccountingError::RemoveFromEmpty);
                }
                self.count.checked_sub(ShareUnits::ONE, "member count")?
            }
        };

        Ok(Self {
            count,
            historical_index,
            last_update: at,
        })
    }

    /// The fraction of the group's share-time held by a single member who
    /// joined at `member_since`, evaluated at `at`.
    ///
    /// The result is a fixed-point ratio in `[0, 1]`. An empty history
    /// yields zero.
    pub fn member_ratio(&self, member_since: Tick, at: Tick) -> Result<ShareUnits, AccountingError> {
        let total = self.index_at(at)?;
        let span = at
            .checked_sub(member_since)
            .ok_or(AccountingError::NegativeElapsed {
                last_update: member_since,
                at,
            })?;
        let own = ShareUnits::ONE.checked_mul_int(span, "member share-time")?;

        let ratio = own
            .checked_ratio(total, "member ratio")?
            .unwrap_or(ShareUnits::ZERO);
        Ok(ratio.min(ShareUnits::ONE))
    }
}
