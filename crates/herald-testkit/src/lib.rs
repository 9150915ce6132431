//! # Herald Testkit
//!
//! Testing utilities for the Herald ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: deterministic signing actors and ready-made ledgers over
//!   the memory and SQLite stores
//! - **Generators**: Proptest strategies for membership histories
//! - **Tracing**: a test-friendly subscriber, see [`init_tracing`]
//!
//! ## Test Fixtures
//!
//! ```rust
//! use herald_testkit::fixtures::{actors, Actor};
//!
//! let parties = actors(3);
//! assert_ne!(parties[0].address(), parties[1].address());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use herald_testkit::generators::{membership_history, Step};
//!
//! proptest! {
//!     #[test]
//!     fn counts_never_drift(history in membership_history(8, 64)) {
//!         // replay `history` against a ledger
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    actors, memory_ledger, open_channel, sqlite_ledger, test_config, Actor, MemoryLedger,
    SqliteLedger,
};
pub use generators::{membership_history, Step};

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`; defaults to `warn`. Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
