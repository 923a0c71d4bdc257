//! Deterministic simulation harness for room key exchange testing.
//!
//! Seeded implementations of the Environment and Transport seams, an
//! in-process relay with production routing, and a cluster driver that runs
//! real sessions against it. Every run is reproducible from its seed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod observer;
pub mod sim_env;
pub mod sim_relay;

pub use cluster::{SimCluster, SimSession};
pub use observer::RecordingObserver;
pub use sim_env::SimEnv;
pub use sim_relay::{RelayStats, RelayTransport, SimRelay};
