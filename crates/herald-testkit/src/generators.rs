//! Proptest generators for property-based testing.

use proptest::prelude::*;

use herald_core::{Address, Keypair, Tick};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_filter_map("secret must be a valid scalar", |seed| {
        Keypair::from_seed(&seed).ok()
    })
}

/// Generate a random address.
pub fn address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from_bytes)
}

/// Generate a starting tick.
pub fn tick() -> impl Strategy<Value = Tick> {
    0u64..=1_000_000_000
}

/// One step of a membership history against a single channel.
///
/// Member indices refer to fixture actors; index 0 is the channel owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Let time pass.
    Advance(u32),
    /// The member subscribes.
    Subscribe(u8),
    /// The member unsubscribes.
    Unsubscribe(u8),
    /// The pool credits yield to the channel.
    Accrue(u32),
}

/// Generate a single step over `members` possible members.
pub fn step(members: u8) -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0u32..10_000).prop_map(Step::Advance),
        3 => (0..members).prop_map(Step::Subscribe),
        2 => (0..members).prop_map(Step::Unsubscribe),
        1 => (1u32..1_000_000).prop_map(Step::Accrue),
    ]
}

/// Generate a history of up to `max_steps` steps over `members` members.
pub fn membership_history(members: u8, max_steps: usize) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step(members), 1..=max_steps)
}
