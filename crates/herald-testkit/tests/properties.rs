//! Property tests: random membership histories replayed against a ledger.

use std::collections::BTreeSet;

use herald_ledger::{ErrorKind, LedgerError};
use herald_testkit::fixtures::{actors, memory_ledger, open_channel, test_config};
use herald_testkit::generators::{membership_history, Step};
use proptest::prelude::*;

const MEMBERS: u8 = 6;

/// Outcome of replaying one history.
#[derive(Debug, Default)]
struct Replay {
    violations: Vec<String>,
}

impl Replay {
    fn check(&mut self, ok: bool, what: impl FnOnce() -> String) {
        if !ok {
            self.violations.push(what());
        }
    }
}

async fn replay(history: Vec<Step>) -> Replay {
    let mut report = Replay::default();
    let ledger = memory_ledger(test_config());
    let parties = actors(MEMBERS as usize);
    let channel = parties[0].address();

    let mut tick = 1_000u64;
    open_channel(&ledger, channel, tick).await.unwrap();

    let mut members: BTreeSet<u8> = BTreeSet::from([0]);
    let mut accrued: u128 = 0;
    let mut paid: u128 = 0;
    let mut last_index = ledger
        .channel(&channel)
        .await
        .unwrap()
        .unwrap()
        .fair_share
        .historical_index;

    for step in history {
        let before = ledger.channel(&channel).await.unwrap().unwrap();

        match step {
            Step::Advance(by) => tick += u64::from(by),
            Step::Accrue(amount) => {
                ledger.pool().accrue_yield(&channel, u128::from(amount)).unwrap();
                accrued += u128::from(amount);
            }
            Step::Subscribe(i) => {
                let who = parties[i as usize].address();
                let result = ledger.subscribe(channel, who, tick).await;
                if members.contains(&i) {
                    report.check(
                        matches!(result, Err(LedgerError::AlreadySubscribed { .. })),
                        || format!("double subscribe of {i} at {tick} was not rejected"),
                    );
                    let after = ledger.channel(&channel).await.unwrap().unwrap();
                    report.check(after == before, || {
                        format!("rejected subscribe of {i} changed the channel")
                    });
                } else {
                    report.check(result.is_ok(), || {
                        format!("subscribe of {i} at {tick} failed: {result:?}")
                    });
                    members.insert(i);
                }
            }
            Step::Unsubscribe(i) => {
                let who = parties[i as usize].address();
                let result = ledger.unsubscribe(channel, who, tick).await;
                if i == 0 || !members.contains(&i) {
                    let rejected = matches!(
                        &result,
                        Err(e @ LedgerError::NotSubscribedOrIsOwner { .. })
                            if e.kind() == ErrorKind::StateConflict
                    );
                    report.check(rejected, || {
                        format!("unsubscribe of {i} at {tick} was not rejected")
                    });
                } else {
                    match result {
                        Ok(left) => paid += left.payout,
                        Err(e) => report.violations.push(format!("unsubscribe of {i}: {e}")),
                    }
                    members.remove(&i);
                }
            }
        }

        let after = ledger.channel(&channel).await.unwrap().unwrap();

        // Count conservation, checked against the store itself.
        let mut existing = 0u64;
        for party in &parties {
            if ledger.member_exists(&channel, &party.address()).await.unwrap() {
                existing += 1;
            }
        }
        report.check(after.member_count == existing, || {
            format!("member_count {} but {existing} memberships exist", after.member_count)
        });
        let listed = ledger.members(&channel).await.unwrap();
        report.check(listed.len() as u64 == after.member_count, || {
            format!("member_count {} but {} listed", after.member_count, listed.len())
        });
        report.check(after.member_count == members.len() as u64, || {
            format!("member_count {} but model has {}", after.member_count, members.len())
        });
        report.check(after.fair_share.count.whole() == u128::from(after.member_count), || {
            "fair-share count drifted from member count".to_string()
        });

        // Monotonic accumulator.
        report.check(after.fair_share.historical_index >= last_index, || {
            format!("historical index decreased at {tick}")
        });
        last_index = after.fair_share.historical_index;

        // Never pay out more than the pool has accrued.
        report.check(after.yield_paid == paid && paid <= accrued, || {
            format!("paid {paid} (recorded {}) of {accrued} accrued", after.yield_paid)
        });
    }

    report
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_membership_invariants_hold(history in membership_history(MEMBERS, 48)) {
        let report = runtime().block_on(replay(history));
        prop_assert!(report.violations.is_empty(), "{:#?}", report.violations);
    }

    #[test]
    fn prop_owner_can_never_leave(steps in prop::collection::vec(0u32..1_000, 1..16)) {
        let violations = runtime().block_on(async {
            let ledger = memory_ledger(test_config());
            let owner = actors(1)[0].address();
            open_channel(&ledger, owner, 0).await.unwrap();

            let mut tick = 0u64;
            let mut violations = Vec::new();
            for step in steps {
                tick += u64::from(step);
                if ledger.unsubscribe(owner, owner, tick).await.is_ok() {
                    violations.push(tick);
                }
            }
            violations
        });
        prop_assert!(violations.is_empty(), "owner left at ticks {:?}", violations);
    }
}
