//! Fixtures shared by the end-to-end tests

use geoproof_core::{CircuitRef, Config, GeoCoordinate, LocationConfig, ProofMode, ProvingBackend};
use geoproof_ledger::SubmissionLedger;
use geoproof_location::{Location, LocationAcquirer, ScriptedPlatform};
use geoproof_prover::{DeterministicBackend, LifecycleConfig, ProofLifecycle};
use geoproof_registry::{RegistryMirror, VerifierBinding};
use geoproof_relay::{router, AppState, RelayServiceConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Eiffel Tower, the target used throughout
pub fn eiffel() -> GeoCoordinate {
    GeoCoordinate::new(48.8584, 2.2945).unwrap()
}

pub fn circuit() -> CircuitRef {
    CircuitRef::new("circuits/geofence.json", None)
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Install a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn temp_db_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("geoproof-{label}-{}.db", uuid::Uuid::new_v4()))
}

pub fn remove_db(path: &Path) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(path.with_extension("db-wal"));
    let _ = std::fs::remove_file(path.with_extension("db-shm"));
}

/// A device: scripted platform, reference backend, proof lifecycle.
pub struct TestDevice {
    pub prover_id: Vec<u8>,
    pub platform: Arc<ScriptedPlatform>,
    pub lifecycle: ProofLifecycle<ScriptedPlatform>,
}

impl TestDevice {
    /// Device standing at `position`, proving in `mode`.
    pub fn at(seed: &str, position: GeoCoordinate, mode: ProofMode) -> Self {
        let platform = Arc::new(ScriptedPlatform::granted(Location::new(position)));
        let acquirer = Arc::new(LocationAcquirer::new(
            platform.clone(),
            &LocationConfig::default(),
        ));
        let mut config = Config::default_config();
        config.proof.circuit_path = circuit().circuit_path;
        config.proof.srs_path = None;
        config.proof.on_chain = mode == ProofMode::OnChain;
        config.proof.prove_timeout_ms = 10_000;
        config.proof.verify_locally = Some(true);
        let lifecycle = ProofLifecycle::new(
            acquirer,
            Arc::new(DeterministicBackend::new()),
            LifecycleConfig::from_config(&config),
        );

        Self {
            prover_id: blake3::hash(seed.as_bytes()).as_bytes()[..20].to_vec(),
            platform,
            lifecycle,
        }
    }

    pub fn prover_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.prover_id))
    }
}

/// Registry checking proofs from the reference backend
pub fn registry() -> RegistryMirror {
    let backend = DeterministicBackend::new();
    let verification_key = backend
        .verification_key(&circuit(), ProofMode::OnChain)
        .unwrap();
    RegistryMirror::open_in_memory(VerifierBinding {
        verifier: Arc::new(backend),
        circuit: circuit(),
        verification_key,
    })
    .unwrap()
}

pub fn relay_config() -> RelayServiceConfig {
    let base = Config::default_config();
    RelayServiceConfig {
        bind_addr: base.relay.bind_addr,
        max_body_bytes: base.relay.max_body_bytes,
        prune_interval: Duration::from_secs(base.relay.prune_interval_secs),
        ledger: base.ledger,
    }
}

/// In-memory relay router
pub fn relay() -> axum::Router {
    let config = relay_config();
    let ledger = SubmissionLedger::open_in_memory(&config.ledger).unwrap();
    router(Arc::new(AppState::with_ledger(config, ledger)))
}
