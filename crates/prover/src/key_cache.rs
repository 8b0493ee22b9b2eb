//! Single-flight verification key cache.
//!
//! Deriving a verification key is expensive and the result only depends on the
//! circuit assets and the proof mode, so it is computed at most once per
//! `(circuit, mode)` for the lifetime of the cache. Concurrent first callers
//! wait on the same computation. A failed computation is not cached; the next
//! caller retries.

use geoproof_core::{CircuitRef, ProofMode, ProvingBackend, ZkError, ZkResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info};

type CacheKey = (CircuitRef, ProofMode);
type KeySlot = Arc<OnceCell<Arc<Vec<u8>>>>;

#[derive(Debug, Default)]
pub struct KeyCacheMetrics {
    pub lookups: AtomicU64,
    pub computations: AtomicU64,
    pub failures: AtomicU64,
}

impl KeyCacheMetrics {
    pub fn snapshot(&self) -> KeyCacheSnapshot {
        KeyCacheSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCacheSnapshot {
    pub lookups: u64,
    pub computations: u64,
    pub failures: u64,
}

impl KeyCacheSnapshot {
    /// Lookups served without running the backend
    pub fn hits(&self) -> u64 {
        self.lookups.saturating_sub(self.computations)
    }
}

#[derive(Debug, Default)]
pub struct VerificationKeyCache {
    slots: Mutex<HashMap<CacheKey, KeySlot>>,
    metrics: KeyCacheMetrics,
}

impl VerificationKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached key or compute it on the blocking pool.
    pub async fn get_or_compute(
        &self,
        backend: &Arc<dyn ProvingBackend>,
        circuit: &CircuitRef,
        mode: ProofMode,
    ) -> ZkResult<Arc<Vec<u8>>> {
        self.metrics.lookups.fetch_add(1, Ordering::Relaxed);
        let slot = self.slot(circuit, mode)?;

        let key = slot
            .get_or_try_init(|| async {
                self.metrics.computations.fetch_add(1, Ordering::Relaxed);
                info!(
                    circuit = %circuit.circuit_path.display(),
                    ?mode,
                    "Computing verification key"
                );

                let backend = Arc::clone(backend);
                let task_circuit = circuit.clone();
                let computed = tokio::task::spawn_blocking(move || {
                    backend.verification_key(&task_circuit, mode)
                })
                .await
                .map_err(|e| {
                    ZkError::ProofGenerationFailed(format!("verification key task failed: {e}"))
                })
                .and_then(|result| result);

                match computed {
                    Ok(key) => Ok(Arc::new(key)),
                    Err(e) => {
                        self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                        debug!(error = %e, "Verification key computation failed");
                        Err(e)
                    }
                }
            })
            .await?;

        Ok(Arc::clone(key))
    }

    /// Whether a key for `(circuit, mode)` is already available.
    pub fn contains(&self, circuit: &CircuitRef, mode: ProofMode) -> bool {
        self.slots
            .lock()
            .map(|slots| {
                slots
                    .get(&(circuit.clone(), mode))
                    .is_some_and(|slot| slot.initialized())
            })
            .unwrap_or(false)
    }

    pub fn metrics(&self) -> &KeyCacheMetrics {
        &self.metrics
    }

    fn slot(&self, circuit: &CircuitRef, mode: ProofMode) -> ZkResult<KeySlot> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| ZkError::ProofGenerationFailed("key cache lock poisoned".to_string()))?;
        Ok(Arc::clone(
            slots
                .entry((circuit.clone(), mode))
                .or_insert_with(|| Arc::new(OnceCell::new())),
        ))
    }
}
