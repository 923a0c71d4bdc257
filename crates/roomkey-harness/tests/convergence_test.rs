//! Multi-client convergence tests against the simulated relay.

use proptest::prelude::*;
use roomkey_client::SessionEvent;
use roomkey_core::storage::{ChaoticKeyStore, MemoryKeyStore, RedbKeyStore};
use roomkey_harness::SimCluster;

#[test]
fn own_message_is_echoed_and_decrypted() {
    let mut cluster = SimCluster::new(1, 1);
    cluster.connect(0);

    assert!(cluster.send(0, "hello"));

    let observer = cluster.session(0).observer();
    assert_eq!(observer.messages(), vec!["hello".to_string()]);
    assert_eq!(observer.key_pending_count(), 0);
    assert!(observer.events().iter().any(|event| matches!(
        event,
        SessionEvent::MessageDecrypted { was_encrypted: true, recovered: false, .. }
    )));
}

#[test]
fn missing_key_is_recovered_by_request() {
    let mut cluster = SimCluster::new(2, 2);
    cluster.connect(0);
    cluster.connect(1);

    assert!(cluster.send(0, "hello"));

    let observer = cluster.session(1).observer();
    assert_eq!(observer.key_pending_count(), 1);
    assert_eq!(observer.recovered_messages(), vec!["hello".to_string()]);
    assert_eq!(cluster.relay().stats().key_requests, 1);
    assert!(cluster.converged());
}

#[test]
fn late_joiner_receives_key_on_join() {
    let mut cluster = SimCluster::new(3, 3);
    cluster.connect(0);
    cluster.connect(1);
    cluster.send(0, "before");

    cluster.connect(2);
    assert!(cluster.converged());

    cluster.send(1, "after");
    let observer = cluster.session(2).observer();
    assert_eq!(observer.messages(), vec!["after".to_string()]);
    assert_eq!(observer.key_pending_count(), 0);
}

#[test]
fn join_without_any_key_shares_nothing() {
    let mut cluster = SimCluster::new(4, 3);
    for i in 0..3 {
        cluster.connect(i);
    }

    assert_eq!(cluster.relay().stats().key_shares, 0);
    assert_eq!(cluster.room_keys(), vec![None, None, None]);
    assert!(!cluster.converged());
}

#[test]
fn logout_then_reconnect_regains_key() {
    let mut cluster = SimCluster::new(5, 2);
    cluster.connect(0);
    cluster.connect(1);
    cluster.send(0, "first");
    let key = cluster.room_keys()[0].clone();

    cluster.session_mut(1).logout().unwrap();
    cluster.disconnect(1);
    assert_eq!(cluster.room_keys()[1], None);

    cluster.connect(1);
    assert_eq!(cluster.room_keys()[1], key);

    cluster.session_mut(1).observer_mut().clear();
    cluster.send(0, "second");
    assert_eq!(cluster.session(1).observer().messages(), vec!["second".to_string()]);
}

#[test]
fn disconnected_user_cannot_send() {
    let mut cluster = SimCluster::new(6, 2);
    cluster.connect(0);

    assert!(!cluster.send(1, "nobody hears this"));
    assert_eq!(cluster.relay().stats().chats, 0);
}

#[test]
fn same_seed_same_keys() {
    let run = |seed| {
        let mut cluster = SimCluster::new(seed, 3);
        for i in 0..3 {
            cluster.connect(i);
        }
        cluster.send(1, "x");
        cluster.room_keys()
    };

    assert_eq!(run(11), run(11));
    assert_ne!(run(11), run(12));
}

#[test]
fn durable_keys_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let open = |i: usize| RedbKeyStore::open(dir.path().join(format!("user-{i}.redb"))).unwrap();

    let before = {
        let mut cluster = SimCluster::with_stores(7, (0..2).map(open));
        cluster.connect(0);
        cluster.connect(1);
        cluster.send(0, "persist me");
        assert!(cluster.converged());
        cluster.room_keys()
    };

    let mut cluster = SimCluster::with_stores(8, (0..2).map(open));
    assert_eq!(cluster.room_keys(), before);

    cluster.connect(0);
    cluster.connect(1);
    cluster.send(1, "still readable");
    assert_eq!(cluster.session(0).observer().messages(), vec!["still readable".to_string()]);
    assert_eq!(cluster.session(0).observer().key_pending_count(), 0);
}

#[test]
fn failing_store_surfaces_warnings() {
    let stores = (0..2).map(|_| ChaoticKeyStore::with_seed(MemoryKeyStore::new(), 1.0, 9));
    let mut cluster = SimCluster::with_stores(9, stores);
    cluster.connect(0);
    cluster.connect(1);

    assert!(!cluster.send(0, "doomed"));
    assert!(!cluster.session(0).observer().warnings().is_empty());
    assert!(cluster.session(0).observer().messages().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every connected user ends up with one shared key and reads every
    /// message, in send order.
    #[test]
    fn prop_cluster_converges(
        seed in any::<u64>(),
        num_clients in 1usize..5,
        num_messages in 1usize..8,
    ) {
        let mut cluster = SimCluster::new(seed, num_clients);
        for i in 0..num_clients {
            cluster.connect(i);
        }

        let mut expected = Vec::new();
        for n in 0..num_messages {
            let text = format!("message {n}");
            prop_assert!(cluster.send(n % num_clients, &text));
            expected.push(text);
        }

        prop_assert!(cluster.converged());
        for i in 0..num_clients {
            prop_assert_eq!(cluster.session(i).observer().messages(), expected.clone());
            prop_assert!(cluster.session(i).observer().warnings().is_empty());
        }
    }

    /// Storage faults are reported, never fatal.
    #[test]
    fn prop_storage_chaos_never_panics(
        seed in any::<u64>(),
        failure_rate in 0.0f64..0.5,
        num_messages in 1usize..6,
    ) {
        let stores = (0..3u64)
            .map(|i| ChaoticKeyStore::with_seed(MemoryKeyStore::new(), failure_rate, seed ^ i));
        let mut cluster = SimCluster::with_stores(seed, stores);
        for i in 0..3 {
            cluster.connect(i);
        }

        for n in 0..num_messages {
            cluster.send(n % 3, "chaos");
        }

        let operations: usize =
            (0..3).map(|i| cluster.session(i).client().keys().store().operation_count()).sum();
        prop_assert!(operations > 0);
    }
}
