//! Multi-client cluster over a [`SimRelay`].
//!
//! Drives real [`Session`]s against the in-process relay in a fixed order so
//! runs are reproducible from a seed. Used for convergence tests and by the
//! `roomkey-sim` binary.

use roomkey_client::{ConnectionStatus, KeyStore, Session, SessionConfig};
use roomkey_core::storage::MemoryKeyStore;

use crate::{RecordingObserver, RelayTransport, SimEnv, SimRelay, sim_relay::RELAY_ROOM};

/// Upper bound on delivery rounds before [`SimCluster::run_until_idle`]
/// gives up. Key exchange settles in a handful of rounds; hitting this means
/// clients are feeding each other forever.
const MAX_ROUNDS: usize = 1_000;

/// Session type driven by the cluster.
pub type SimSession<S> = Session<SimEnv, S, RelayTransport, RecordingObserver>;

/// Simulated users sharing one relay.
pub struct SimCluster<S: KeyStore> {
    env: SimEnv,
    relay: SimRelay,
    sessions: Vec<SimSession<S>>,
}

impl SimCluster<MemoryKeyStore> {
    /// Cluster of `num_clients` users with in-memory key stores.
    pub fn new(seed: u64, num_clients: usize) -> Self {
        Self::with_stores(seed, (0..num_clients).map(|_| MemoryKeyStore::new()))
    }
}

impl<S: KeyStore> SimCluster<S> {
    /// Cluster with one user per store. Users are named `user-0`, `user-1`, ...
    pub fn with_stores(seed: u64, stores: impl IntoIterator<Item = S>) -> Self {
        let env = SimEnv::with_seed(seed);
        let relay = SimRelay::new(env.clone());

        let sessions = stores
            .into_iter()
            .enumerate()
            .map(|(i, store)| {
                let username = format!("user-{i}");
                Session::new(
                    env.clone(),
                    store,
                    relay.transport(username.clone()),
                    RecordingObserver::new(),
                    SessionConfig::new(username),
                )
            })
            .collect();

        Self { env, relay, sessions }
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Shared relay.
    pub fn relay(&self) -> &SimRelay {
        &self.relay
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the cluster has no users.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session of user `index`.
    pub fn session(&self, index: usize) -> &SimSession<S> {
        &self.sessions[index]
    }

    /// Mutable session of user `index`.
    pub fn session_mut(&mut self, index: usize) -> &mut SimSession<S> {
        &mut self.sessions[index]
    }

    /// Username of user `index`.
    pub fn username(&self, index: usize) -> &str {
        &self.sessions[index].config().username
    }

    /// Connect user `index` to the relay and deliver until idle.
    pub fn connect(&mut self, index: usize) {
        let session = &mut self.sessions[index];
        session.set_status(ConnectionStatus::Connecting);
        self.relay.connect(&session.config().username);
        session.set_status(ConnectionStatus::Connected);
        self.run_until_idle();
    }

    /// Disconnect user `index` and deliver until idle.
    pub fn disconnect(&mut self, index: usize) {
        let session = &mut self.sessions[index];
        session.set_status(ConnectionStatus::Disconnected);
        self.relay.disconnect(&session.config().username);
        self.run_until_idle();
    }

    /// Send from user `index` to the relay room and deliver until idle.
    pub fn send(&mut self, index: usize, text: &str) -> bool {
        self.env.advance(1);
        let sent = self.sessions[index].send_message(RELAY_ROOM, text);
        self.run_until_idle();
        sent
    }

    /// Deliver queued envelopes in user order until every inbox is empty.
    ///
    /// Returns the number of envelopes delivered.
    pub fn run_until_idle(&mut self) -> usize {
        let mut delivered = 0;

        for _ in 0..MAX_ROUNDS {
            if !self.relay.has_pending() {
                return delivered;
            }

            for session in &mut self.sessions {
                let inbox = self.relay.take_inbox(&session.config().username);
                for json in inbox {
                    session.receive_json(&json);
                    delivered += 1;
                }
            }
        }

        tracing::warn!(delivered, "cluster did not settle");
        delivered
    }

    /// Encoded `general` key held by each user, `None` where absent.
    pub fn room_keys(&mut self) -> Vec<Option<String>> {
        self.sessions
            .iter_mut()
            .map(|session| {
                session.client_mut().keys_mut().export_key_encoded(RELAY_ROOM).ok().flatten()
            })
            .collect()
    }

    /// Whether every connected user holds the same `general` key.
    pub fn converged(&mut self) -> bool {
        let connected = self.relay.connected_users();
        let keys: Vec<Option<String>> = self
            .sessions
            .iter_mut()
            .filter(|session| connected.contains(&session.config().username))
            .map(|session| {
                session.client_mut().keys_mut().export_key_encoded(RELAY_ROOM).ok().flatten()
            })
            .collect();

        keys.first().is_some_and(|first| first.is_some() && keys.iter().all(|key| key == first))
    }
}
