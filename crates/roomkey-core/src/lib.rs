//! Roomkey core.
//!
//! Building blocks shared by the client and the simulation harness:
//!
//! - [`env::Environment`]: randomness and wall-clock time behind a trait, so
//!   key generation and nonces are reproducible under a seeded RNG
//! - [`env::SystemEnv`]: production environment (OS RNG, system clock)
//! - [`storage::KeyStore`]: per-device persistence of room keys, with
//!   in-memory, redb-backed and fault-injecting implementations

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod storage;
