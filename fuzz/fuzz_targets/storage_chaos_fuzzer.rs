//! Fuzz target for sessions under storage failures
//!
//! Runs a small simulated cluster whose key stores fail at random, then
//! checks that faults surface as warnings instead of panics.
//!
//! # Strategy
//!
//! - Variable failure rates (0% to 90%)
//! - Arbitrary interleaving of connects, disconnects, sends and logouts
//!
//! # Invariants
//!
//! - Sessions NEVER panic on storage errors
//! - The relay always settles

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use roomkey_core::storage::{ChaoticKeyStore, MemoryKeyStore};
use roomkey_harness::SimCluster;

const USERS: usize = 3;

#[derive(Debug, Arbitrary)]
struct ChaosScenario {
    seed: u64,
    chaos_seed: u64,
    /// 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<ChaosOperation>,
}

#[derive(Debug, Arbitrary)]
enum ChaosOperation {
    Connect { user: u8 },
    Disconnect { user: u8 },
    Send { user: u8, text: String },
    Logout { user: u8 },
}

fuzz_target!(|scenario: ChaosScenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let stores = (0..USERS as u64).map(|i| {
        ChaoticKeyStore::with_seed(MemoryKeyStore::new(), failure_rate, scenario.chaos_seed ^ i)
    });
    let mut cluster = SimCluster::with_stores(scenario.seed, stores);

    for op in scenario.operations {
        match op {
            ChaosOperation::Connect { user } => cluster.connect(usize::from(user) % USERS),
            ChaosOperation::Disconnect { user } => cluster.disconnect(usize::from(user) % USERS),
            ChaosOperation::Send { user, text } => {
                cluster.send(usize::from(user) % USERS, &text);
            },
            ChaosOperation::Logout { user } => {
                let _ = cluster.session_mut(usize::from(user) % USERS).logout();
            },
        }
        assert!(!cluster.relay().has_pending());
    }
});
