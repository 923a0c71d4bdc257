//! Chaotic key store wrapper for fault injection testing
//!
//! Wraps another store and randomly fails operations, to check that storage
//! failures surface as errors and never leave the key cache and the store
//! disagreeing.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use roomkey_crypto::SymmetricKey;

use super::{KeyStore, StorageError};

/// Key store wrapper that randomly injects failures.
///
/// Delegates to an underlying store but fails operations with
/// [`StorageError::Injected`] at a configured rate. Deterministic for a given
/// seed.
#[derive(Clone)]
pub struct ChaoticKeyStore<S: KeyStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
}

/// Linear congruential generator; fast and reproducible, not secure.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: KeyStore> ChaoticKeyStore<S> {
    /// Wrap `inner` with the default seed.
    ///
    /// `failure_rate` is clamped to [0.0, 1.0].
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        Self {
            inner,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    fn check(&self, operation: &'static str) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        let roll = self.rng.lock().map_or(0.0, |mut rng| rng.next());
        if roll < self.failure_rate {
            tracing::debug!(operation, "injecting storage failure");
            return Err(StorageError::Injected { operation });
        }
        Ok(())
    }
}

impl<S: KeyStore> KeyStore for ChaoticKeyStore<S> {
    fn put(&self, room_id: &str, key: &SymmetricKey) -> Result<(), StorageError> {
        self.check("put")?;
        self.inner.put(room_id, key)
    }

    fn get(&self, room_id: &str) -> Result<Option<SymmetricKey>, StorageError> {
        self.check("get")?;
        self.inner.get(room_id)
    }

    fn contains(&self, room_id: &str) -> Result<bool, StorageError> {
        self.check("contains")?;
        self.inner.contains(room_id)
    }

    fn remove(&self, room_id: &str) -> Result<(), StorageError> {
        self.check("remove")?;
        self.inner.remove(room_id)
    }

    fn rooms(&self) -> Result<Vec<String>, StorageError> {
        self.check("rooms")?;
        self.inner.rooms()
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.check("clear")?;
        self.inner.clear()
    }
}
