//! Proof-of-presence lifecycle.
//!
//! One attempt walks `Idle → Locating → Proving → ProofReady`, short-circuiting
//! into `LocationFailed`, `PreflightFailed`, `ProofFailed` or `Cancelled`. The
//! cheap haversine preflight runs before any proving work, so a fix outside
//! the radius never reaches the backend.
//!
//! The backend call is synchronous and CPU-bound; it runs on the blocking pool
//! under a timeout. Cancellation is cooperative: once `prove` has been
//! dispatched it cannot be interrupted, and its result is discarded.

use geoproof_core::{
    CircuitRef, Config, GeoCell, GeoCoordinate, PrivateWitness, ProofMode, ProvingBackend,
    PublicInputHash, PublicInputs, Radius,
};
use geoproof_location::{LocationAcquirer, LocationPlatform};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::ProofError;
use crate::key_cache::VerificationKeyCache;

/// Observable phase of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofPhase {
    Idle,
    Locating,
    LocationFailed,
    PreflightFailed,
    Proving,
    ProofReady,
    ProofFailed,
    Cancelled,
}

impl ProofPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            ProofPhase::Idle | ProofPhase::Locating | ProofPhase::Proving
        )
    }
}

/// Output of a successful attempt, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofArtifact {
    pub proof_bytes: Vec<u8>,
    pub public_input_bytes: Vec<u8>,
    pub public_inputs: PublicInputs,
    pub public_input_hash: PublicInputHash,
    pub mode: ProofMode,
    /// Cell of the target, not of the device
    pub geo_cell: GeoCell,
}

impl ProofArtifact {
    pub fn proof_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.proof_bytes))
    }

    pub fn public_inputs_hex(&self) -> String {
        self.public_inputs.to_hex()
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub circuit: CircuitRef,
    pub mode: ProofMode,
    pub prove_timeout: Duration,
    pub verify_locally: bool,
    pub geo_cell_precision: usize,
}

impl LifecycleConfig {
    /// Cells are indexed at the ledger's precision so device and relay agree.
    pub fn from_config(config: &Config) -> Self {
        let proof = &config.proof;
        Self {
            circuit: CircuitRef::new(proof.circuit_path.clone(), proof.srs_path.clone()),
            mode: ProofMode::from_on_chain(proof.on_chain),
            prove_timeout: proof.prove_timeout(),
            verify_locally: proof.verify_locally(),
            geo_cell_precision: config.ledger.geo_cell_precision,
        }
    }
}

#[derive(Debug, Default)]
pub struct LifecycleMetrics {
    pub attempts: AtomicU64,
    pub preflight_rejections: AtomicU64,
    pub prove_calls: AtomicU64,
    pub proofs_ready: AtomicU64,
    pub failures: AtomicU64,
    pub cancellations: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub attempts: u64,
    pub preflight_rejections: u64,
    pub prove_calls: u64,
    pub proofs_ready: u64,
    pub failures: u64,
    pub cancellations: u64,
}

impl LifecycleMetrics {
    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            preflight_rejections: self.preflight_rejections.load(Ordering::Relaxed),
            prove_calls: self.prove_calls.load(Ordering::Relaxed),
            proofs_ready: self.proofs_ready.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
        }
    }
}

/// Orchestrates location, preflight, key lookup and proving.
pub struct ProofLifecycle<P: ?Sized> {
    acquirer: Arc<LocationAcquirer<P>>,
    backend: Arc<dyn ProvingBackend>,
    keys: Arc<VerificationKeyCache>,
    config: LifecycleConfig,
    metrics: LifecycleMetrics,
}

impl<P: LocationPlatform + ?Sized> ProofLifecycle<P> {
    pub fn new(
        acquirer: Arc<LocationAcquirer<P>>,
        backend: Arc<dyn ProvingBackend>,
        config: LifecycleConfig,
    ) -> Self {
        Self::with_key_cache(acquirer, backend, Arc::new(VerificationKeyCache::new()), config)
    }

    /// Share a key cache across lifecycles (one per process is typical).
    pub fn with_key_cache(
        acquirer: Arc<LocationAcquirer<P>>,
        backend: Arc<dyn ProvingBackend>,
        keys: Arc<VerificationKeyCache>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            acquirer,
            backend,
            keys,
            config,
            metrics: LifecycleMetrics::default(),
        }
    }

    pub fn key_cache(&self) -> &Arc<VerificationKeyCache> {
        &self.keys
    }

    pub fn metrics(&self) -> &LifecycleMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Start a cancellable attempt.
    pub fn begin(&self) -> ProofAttempt<'_, P> {
        let (phase, _) = watch::channel(ProofPhase::Idle);
        ProofAttempt {
            lifecycle: self,
            cancel: CancellationToken::new(),
            phase,
        }
    }

    /// Run one uncancellable attempt to completion.
    pub async fn run(
        &self,
        target: GeoCoordinate,
        radius_meters: u32,
    ) -> Result<ProofArtifact, ProofError> {
        self.begin().run(target, radius_meters).await
    }
}

/// A single attempt. Observe it with [`phase`](Self::phase), stop it with
/// the token from [`cancel_token`](Self::cancel_token).
pub struct ProofAttempt<'a, P: ?Sized> {
    lifecycle: &'a ProofLifecycle<P>,
    cancel: CancellationToken,
    phase: watch::Sender<ProofPhase>,
}

impl<P: LocationPlatform + ?Sized> ProofAttempt<'_, P> {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> watch::Receiver<ProofPhase> {
        self.phase.subscribe()
    }

    #[instrument(skip(self))]
    pub async fn run(
        self,
        target: GeoCoordinate,
        radius_meters: u32,
    ) -> Result<ProofArtifact, ProofError> {
        let metrics = &self.lifecycle.metrics;
        metrics.attempts.fetch_add(1, Ordering::Relaxed);

        let result = self.execute(target, radius_meters).await;
        let terminal = match &result {
            Ok(_) => {
                metrics.proofs_ready.fetch_add(1, Ordering::Relaxed);
                ProofPhase::ProofReady
            }
            Err(ProofError::Cancelled) => {
                metrics.cancellations.fetch_add(1, Ordering::Relaxed);
                ProofPhase::Cancelled
            }
            Err(ProofError::Location(_)) => ProofPhase::LocationFailed,
            Err(ProofError::OutsideRadius { .. }) => {
                metrics.preflight_rejections.fetch_add(1, Ordering::Relaxed);
                ProofPhase::PreflightFailed
            }
            Err(ProofError::InvalidParameters(_)) => ProofPhase::PreflightFailed,
            Err(_) => {
                metrics.failures.fetch_add(1, Ordering::Relaxed);
                ProofPhase::ProofFailed
            }
        };
        self.phase.send_replace(terminal);

        match &result {
            Ok(artifact) => info!(
                hash = %artifact.public_input_hash,
                cell = %artifact.geo_cell,
                "Proof ready"
            ),
            Err(e) => warn!(error = %e, phase = ?terminal, "Proof attempt ended"),
        }
        result
    }

    async fn execute(
        &self,
        target: GeoCoordinate,
        radius_meters: u32,
    ) -> Result<ProofArtifact, ProofError> {
        let lifecycle = self.lifecycle;
        let config = &lifecycle.config;

        let target = GeoCoordinate::new(target.latitude, target.longitude)?;
        let radius = Radius::new(radius_meters)?;
        let geo_cell = GeoCell::for_target(&target, config.geo_cell_precision)?;

        self.phase.send_replace(ProofPhase::Locating);
        let fix = self
            .cancellable(lifecycle.acquirer.request_one_shot_fix(None))
            .await??;

        let observed_meters = fix.coordinate.haversine_distance(&target);
        if observed_meters.is_nan() || observed_meters > f64::from(radius.meters()) {
            return Err(ProofError::OutsideRadius {
                observed_meters,
                radius_meters: radius.meters(),
            });
        }
        debug!("Preflight passed");

        self.phase.send_replace(ProofPhase::Proving);
        let public_inputs = PublicInputs::from_target_radius(&target, radius);
        let witness = PrivateWitness::from_fix(&fix.coordinate);

        let verification_key = self
            .cancellable(lifecycle.keys.get_or_compute(
                &lifecycle.backend,
                &config.circuit,
                config.mode,
            ))
            .await??;

        if self.cancel.is_cancelled() {
            return Err(ProofError::Cancelled);
        }

        lifecycle.metrics.prove_calls.fetch_add(1, Ordering::Relaxed);
        let backend = Arc::clone(&lifecycle.backend);
        let circuit = config.circuit.clone();
        let mode = config.mode;
        let key = Arc::clone(&verification_key);
        let prove = tokio::task::spawn_blocking(move || {
            backend.prove(&circuit, &witness, &public_inputs, &key, mode)
        });

        let proof_bytes = match self.cancellable(timeout(config.prove_timeout, prove)).await {
            Err(cancelled) => {
                info!("Cancelled during proving; backend result will be discarded");
                return Err(cancelled);
            }
            Ok(Err(_elapsed)) => {
                return Err(ProofError::ProveTimeout {
                    timeout_ms: config.prove_timeout.as_millis() as u64,
                })
            }
            Ok(Ok(Err(join))) => {
                return Err(ProofError::ProofGenerationFailed {
                    cause: format!("prove task failed: {join}"),
                })
            }
            Ok(Ok(Ok(proved))) => proved?,
        };

        let public_input_bytes = public_inputs.encode();
        if config.verify_locally {
            let backend = Arc::clone(&lifecycle.backend);
            let circuit = config.circuit.clone();
            let proof = proof_bytes.clone();
            let inputs = public_input_bytes.clone();
            let valid = tokio::task::spawn_blocking(move || {
                backend.verify(&circuit, &proof, &inputs, &verification_key, mode)
            })
            .await
            .map_err(|e| ProofError::ProofGenerationFailed {
                cause: format!("verify task failed: {e}"),
            })??;
            if !valid {
                return Err(ProofError::VerificationFailed(
                    "proof rejected by local verifier".to_string(),
                ));
            }
        }

        Ok(ProofArtifact {
            public_input_hash: PublicInputHash::of_bytes(&public_input_bytes),
            proof_bytes,
            public_input_bytes,
            public_inputs,
            mode,
            geo_cell,
        })
    }

    async fn cancellable<F: Future>(&self, work: F) -> Result<F::Output, ProofError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProofError::Cancelled),
            output = work => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::DeterministicBackend;
    use geoproof_core::{LocationConfig, ProofVerifier, ZkResult, DEFAULT_PRECISION};
    use geoproof_location::{
        AccuracyTier, AuthSnapshot, AuthorizationTier, Denial, FixBehavior, Location,
        LocationError, ScriptedPlatform,
    };
    use std::sync::atomic::AtomicUsize;

    /// Wraps the reference backend and counts calls.
    struct CountingBackend {
        inner: DeterministicBackend,
        key_calls: AtomicUsize,
        prove_calls: AtomicUsize,
        tamper: bool,
    }

    impl CountingBackend {
        fn new(inner: DeterministicBackend) -> Arc<Self> {
            Arc::new(Self {
                inner,
                key_calls: AtomicUsize::new(0),
                prove_calls: AtomicUsize::new(0),
                tamper: false,
            })
        }
    }

    impl ProofVerifier for CountingBackend {
        fn verify(
            &self,
            circuit: &CircuitRef,
            proof: &[u8],
            public_inputs: &[u8],
            verification_key: &[u8],
            mode: ProofMode,
        ) -> ZkResult<bool> {
            self.inner.verify(circuit, proof, public_inputs, verification_key, mode)
        }
    }

    impl ProvingBackend for CountingBackend {
        fn verification_key(&self, circuit: &CircuitRef, mode: ProofMode) -> ZkResult<Vec<u8>> {
            self.key_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.verification_key(circuit, mode)
        }

        fn prove(
            &self,
            circuit: &CircuitRef,
            witness: &PrivateWitness,
            public_inputs: &PublicInputs,
            verification_key: &[u8],
            mode: ProofMode,
        ) -> ZkResult<Vec<u8>> {
            self.prove_calls.fetch_add(1, Ordering::SeqCst);
            let mut proof =
                self.inner.prove(circuit, witness, public_inputs, verification_key, mode)?;
            if self.tamper {
                proof[4] ^= 0xff;
            }
            Ok(proof)
        }
    }

    fn eiffel() -> GeoCoordinate {
        GeoCoordinate::new(48.8584, 2.2945).unwrap()
    }

    fn config() -> LifecycleConfig {
        LifecycleConfig {
            circuit: CircuitRef::new("circuits/geofence.json", None),
            mode: ProofMode::OnChain,
            prove_timeout: Duration::from_secs(5),
            verify_locally: true,
            geo_cell_precision: DEFAULT_PRECISION,
        }
    }

    fn lifecycle_at(
        fix: GeoCoordinate,
        backend: Arc<CountingBackend>,
        config: LifecycleConfig,
    ) -> ProofLifecycle<ScriptedPlatform> {
        let platform = Arc::new(ScriptedPlatform::granted(Location::new(fix)));
        let acquirer = Arc::new(LocationAcquirer::new(platform, &LocationConfig::default()));
        ProofLifecycle::new(acquirer, backend, config)
    }

    #[tokio::test]
    async fn test_outside_radius_never_proves() {
        let backend = CountingBackend::new(DeterministicBackend::new());
        let lifecycle = lifecycle_at(eiffel().offset(80.0, 0.0), backend.clone(), config());

        let attempt = lifecycle.begin();
        let phase = attempt.phase();
        let err = attempt.run(eiffel(), 50).await.unwrap_err();

        match err {
            ProofError::OutsideRadius {
                observed_meters,
                radius_meters,
            } => {
                assert!((observed_meters - 80.0).abs() < 0.5);
                assert_eq!(radius_meters, 50);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*phase.borrow(), ProofPhase::PreflightFailed);
        assert_eq!(backend.prove_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.key_calls.load(Ordering::SeqCst), 0);
        assert_eq!(lifecycle.metrics().snapshot().preflight_rejections, 1);
    }

    #[tokio::test]
    async fn test_inside_radius_produces_artifact() {
        let backend = CountingBackend::new(DeterministicBackend::new());
        let lifecycle = lifecycle_at(eiffel().offset(10.0, 45.0), backend.clone(), config());

        let artifact = lifecycle.run(eiffel(), 50).await.unwrap();

        assert_eq!(backend.prove_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            artifact.public_inputs,
            PublicInputs::new(48_858_400, 2_294_500, 50)
        );
        assert_eq!(artifact.public_input_bytes, artifact.public_inputs.encode());
        assert_eq!(
            artifact.public_input_hash,
            PublicInputHash::of_bytes(&artifact.public_input_bytes)
        );
        assert_eq!(artifact.geo_cell.as_str(), "u09tunq");
        assert!(artifact.proof_hex().starts_with("0x"));
    }

    #[tokio::test]
    async fn test_config_uses_ledger_precision() {
        let mut base = Config::default_config();
        base.ledger.geo_cell_precision = 6;
        base.proof.prove_timeout_ms = 5_000;
        let config = LifecycleConfig::from_config(&base);
        assert_eq!(config.geo_cell_precision, 6);
        assert_eq!(config.prove_timeout, Duration::from_secs(5));
        assert_eq!(config.mode, ProofMode::OnChain);

        let backend = CountingBackend::new(DeterministicBackend::new());
        let lifecycle = lifecycle_at(eiffel(), backend, config);
        let artifact = lifecycle.run(eiffel(), 50).await.unwrap();
        assert_eq!(artifact.geo_cell.as_str(), "u09tun");
    }

    #[tokio::test]
    async fn test_verification_key_computed_once_across_runs() {
        let backend = CountingBackend::new(DeterministicBackend::new());
        let lifecycle = lifecycle_at(eiffel(), backend.clone(), config());

        lifecycle.run(eiffel(), 50).await.unwrap();
        lifecycle.run(eiffel(), 100).await.unwrap();

        assert_eq!(backend.key_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.prove_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_denied_location_maps_to_location_error() {
        let backend = CountingBackend::new(DeterministicBackend::new());
        let platform = Arc::new(ScriptedPlatform::new(
            AuthSnapshot::new(
                AuthorizationTier::DeniedOrRestricted(Denial::Denied),
                AccuracyTier::Full,
            ),
            FixBehavior::Deliver(Location::new(eiffel())),
        ));
        let acquirer = Arc::new(LocationAcquirer::new(platform, &LocationConfig::default()));
        let lifecycle = ProofLifecycle::new(acquirer, backend.clone(), config());

        let err = lifecycle.run(eiffel(), 50).await.unwrap_err();
        assert_eq!(err, ProofError::Location(LocationError::PermissionDenied));
        assert!(err.is_user_actionable());
        assert_eq!(backend.prove_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unusable_fix_never_proves() {
        let backend = CountingBackend::new(DeterministicBackend::new());
        let nowhere = GeoCoordinate {
            latitude: f64::NAN,
            longitude: f64::NAN,
        };
        let lifecycle = lifecycle_at(nowhere, backend.clone(), config());

        let attempt = lifecycle.begin();
        let phase = attempt.phase();
        let target = GeoCoordinate::new(0.0, 0.0).unwrap();
        let err = attempt.run(target, 50).await.unwrap_err();

        assert_eq!(err, ProofError::Location(LocationError::LocationUnknown));
        assert_eq!(*phase.borrow(), ProofPhase::LocationFailed);
        assert_eq!(backend.prove_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.key_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_radius_rejected_before_location() {
        let backend = CountingBackend::new(DeterministicBackend::new());
        let lifecycle = lifecycle_at(eiffel(), backend, config());

        let err = lifecycle.run(eiffel(), 5).await.unwrap_err();
        assert!(matches!(err, ProofError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_prove_timeout() {
        let backend = CountingBackend::new(
            DeterministicBackend::new().with_prove_latency(Duration::from_millis(500)),
        );
        let mut cfg = config();
        cfg.prove_timeout = Duration::from_millis(50);
        let lifecycle = lifecycle_at(eiffel(), backend, cfg);

        let err = lifecycle.run(eiffel(), 50).await.unwrap_err();
        assert_eq!(err, ProofError::ProveTimeout { timeout_ms: 50 });
        assert_eq!(lifecycle.metrics().snapshot().failures, 1);
    }

    #[tokio::test]
    async fn test_cancel_during_proving_discards_result() {
        let backend = CountingBackend::new(
            DeterministicBackend::new().with_prove_latency(Duration::from_millis(300)),
        );
        let lifecycle = lifecycle_at(eiffel(), backend, config());

        let attempt = lifecycle.begin();
        let token = attempt.cancel_token();
        let mut phase = attempt.phase();

        let run = attempt.run(eiffel(), 50);
        let cancel = async {
            phase
                .wait_for(|p| *p == ProofPhase::Proving)
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        };
        let (result, ()) = tokio::join!(run, cancel);

        assert_eq!(result, Err(ProofError::Cancelled));
        assert_eq!(lifecycle.metrics().snapshot().cancellations, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let backend = CountingBackend::new(DeterministicBackend::new());
        let lifecycle = lifecycle_at(eiffel(), backend.clone(), config());

        let attempt = lifecycle.begin();
        attempt.cancel_token().cancel();
        let phase = attempt.phase();

        assert_eq!(attempt.run(eiffel(), 50).await, Err(ProofError::Cancelled));
        assert_eq!(*phase.borrow(), ProofPhase::Cancelled);
        assert_eq!(backend.prove_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_assets_is_retryable() {
        let backend = CountingBackend::new(DeterministicBackend::new().with_asset_check());
        let lifecycle = lifecycle_at(eiffel(), backend.clone(), config());

        let err = lifecycle.run(eiffel(), 50).await.unwrap_err();
        assert!(matches!(err, ProofError::MissingCircuitAssets(_)));

        lifecycle.run(eiffel(), 50).await.unwrap_err();
        assert_eq!(backend.key_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_local_verification_catches_bad_proof() {
        let backend = Arc::new(CountingBackend {
            inner: DeterministicBackend::new(),
            key_calls: AtomicUsize::new(0),
            prove_calls: AtomicUsize::new(0),
            tamper: true,
        });
        let lifecycle = lifecycle_at(eiffel(), backend, config());

        let err = lifecycle.run(eiffel(), 50).await.unwrap_err();
        assert!(matches!(err, ProofError::VerificationFailed(_)));
    }
}
