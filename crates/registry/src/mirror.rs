//! Replay-guarded proof registry.
//!
//! Mirrors the on-chain registry contract: a submission is accepted once per
//! distinct public-input byte string, forever. There is no time window; the
//! first-seen timestamp is recorded and never cleared.

use geoproof_core::{CircuitRef, GeoCell, ProofMode, ProofVerifier, PublicInputHash, PublicInputs};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{ChainError, ChainResult};

/// Buffered events per subscriber before lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Guard entry for one public-input set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayGuardEntry {
    pub public_input_hash: PublicInputHash,
    pub first_seen_unix: i64,
}

/// Emitted once per accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionEvent {
    pub prover: Vec<u8>,
    pub geo_cell: GeoCell,
    pub target_lat: i64,
    pub target_lon: i64,
    pub radius_meters: i64,
    pub public_input_hash: PublicInputHash,
    pub timestamp_unix: i64,
}

/// Verifier and the fixed key the registry checks proofs against
#[derive(Clone)]
pub struct VerifierBinding {
    pub verifier: Arc<dyn ProofVerifier>,
    pub circuit: CircuitRef,
    pub verification_key: Vec<u8>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistryMetrics {
    pub submissions_accepted_total: u64,
    pub verification_failures_total: u64,
    pub replays_rejected_total: u64,
}

pub struct RegistryMirror {
    conn: Connection,
    binding: VerifierBinding,
    events_tx: broadcast::Sender<SubmissionEvent>,
    metrics: RegistryMetrics,
}

impl RegistryMirror {
    pub fn open(path: impl AsRef<Path>, binding: VerifierBinding) -> ChainResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening registry mirror");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn, binding)
    }

    pub fn open_in_memory(binding: VerifierBinding) -> ChainResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, binding)
    }

    fn with_connection(conn: Connection, binding: VerifierBinding) -> ChainResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS replay_guard (
                public_input_hash BLOB PRIMARY KEY,
                first_seen_unix INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS submission_events (
                seq_no INTEGER PRIMARY KEY AUTOINCREMENT,
                prover BLOB NOT NULL,
                geo_cell TEXT NOT NULL,
                target_lat INTEGER NOT NULL,
                target_lon INTEGER NOT NULL,
                radius_meters INTEGER NOT NULL,
                public_input_hash BLOB NOT NULL REFERENCES replay_guard(public_input_hash),
                timestamp_unix INTEGER NOT NULL
            );
            "#,
        )?;

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            conn,
            binding,
            events_tx,
            metrics: RegistryMetrics::default(),
        })
    }

    /// Verify a proof and record its public inputs.
    ///
    /// Rejections, in order: malformed inputs or cell, failed verification,
    /// previously seen public inputs (regardless of prover or proof bytes).
    pub fn submit(
        &mut self,
        prover: &[u8],
        proof: &[u8],
        public_input_bytes: &[u8],
        geo_cell: &[u8; 32],
        now_unix: i64,
    ) -> ChainResult<SubmissionEvent> {
        let inputs = PublicInputs::decode(public_input_bytes)?;
        let geo_cell = GeoCell::from_bytes32(geo_cell)?;

        let verified = self
            .binding
            .verifier
            .verify(
                &self.binding.circuit,
                proof,
                public_input_bytes,
                &self.binding.verification_key,
                ProofMode::OnChain,
            )
            .map_err(|e| ChainError::VerificationFailed(e.to_string()));
        match verified {
            Ok(true) => {}
            Ok(false) => {
                self.metrics.verification_failures_total += 1;
                return Err(ChainError::VerificationFailed(
                    "proof does not verify against public inputs".to_string(),
                ));
            }
            Err(e) => {
                self.metrics.verification_failures_total += 1;
                return Err(e);
            }
        }

        let hash = PublicInputHash::of_bytes(public_input_bytes);

        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT first_seen_unix FROM replay_guard WHERE public_input_hash = ?1",
                [hash.0.to_vec()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(first_seen_unix) = existing {
            drop(tx);
            self.metrics.replays_rejected_total += 1;
            warn!(hash = %hash, first_seen_unix, "Replay rejected");
            return Err(ChainError::AlreadyUsed {
                hash,
                first_seen_unix,
            });
        }

        tx.execute(
            "INSERT INTO replay_guard (public_input_hash, first_seen_unix) VALUES (?1, ?2)",
            params![hash.0.to_vec(), now_unix],
        )?;
        tx.execute(
            r#"
            INSERT INTO submission_events (
                prover, geo_cell, target_lat, target_lon, radius_meters,
                public_input_hash, timestamp_unix
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                prover,
                geo_cell.as_str(),
                inputs.target_lat,
                inputs.target_lon,
                inputs.radius_meters,
                hash.0.to_vec(),
                now_unix,
            ],
        )?;
        tx.commit()?;

        self.metrics.submissions_accepted_total += 1;

        let event = SubmissionEvent {
            prover: prover.to_vec(),
            geo_cell,
            target_lat: inputs.target_lat,
            target_lon: inputs.target_lon,
            radius_meters: inputs.radius_meters,
            public_input_hash: hash,
            timestamp_unix: now_unix,
        };

        info!(
            hash = %hash,
            geo_cell = %event.geo_cell,
            prover = %hex::encode(prover),
            "Submission recorded"
        );

        // No subscribers is not an error
        if self.events_tx.send(event.clone()).is_err() {
            debug!("No event subscribers");
        }

        Ok(event)
    }

    pub fn first_seen(&self, hash: &PublicInputHash) -> ChainResult<Option<ReplayGuardEntry>> {
        let first_seen = self
            .conn
            .query_row(
                "SELECT first_seen_unix FROM replay_guard WHERE public_input_hash = ?1",
                [hash.0.to_vec()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        Ok(first_seen.map(|first_seen_unix| ReplayGuardEntry {
            public_input_hash: *hash,
            first_seen_unix,
        }))
    }

    /// Event history in emission order.
    pub fn events(&self) -> ChainResult<Vec<SubmissionEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT prover, geo_cell, target_lat, target_lon, radius_meters,
                   public_input_hash, timestamp_unix
            FROM submission_events
            ORDER BY seq_no ASC
            "#,
        )?;

        let rows: Vec<EventRow> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Vec<u8>>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })?
            .collect::<Result<_, _>>()?;

        rows.into_iter().map(event_from_row).collect()
    }

    /// Live feed of accepted submissions.
    pub fn subscribe(&self) -> broadcast::Receiver<SubmissionEvent> {
        self.events_tx.subscribe()
    }

    pub fn metrics(&self) -> &RegistryMetrics {
        &self.metrics
    }
}

type EventRow = (Vec<u8>, String, i64, i64, i64, Vec<u8>, i64);

fn event_from_row(row: EventRow) -> ChainResult<SubmissionEvent> {
    let (prover, cell, target_lat, target_lon, radius_meters, hash, timestamp_unix) = row;
    let geo_cell =
        GeoCell::try_from(cell).map_err(|e| ChainError::Corrupted(format!("geo_cell: {e}")))?;
    let public_input_hash = PublicInputHash::from_slice(&hash)
        .ok_or_else(|| ChainError::Corrupted("public_input_hash length".into()))?;

    Ok(SubmissionEvent {
        prover,
        geo_cell,
        target_lat,
        target_lon,
        radius_meters,
        public_input_hash,
        timestamp_unix,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoproof_core::{GeoCoordinate, PrivateWitness, ProvingBackend, ZkResult};
    use geoproof_prover::DeterministicBackend;
    use std::path::PathBuf;

    struct AcceptAll;

    impl ProofVerifier for AcceptAll {
        fn verify(
            &self,
            _circuit: &CircuitRef,
            _proof: &[u8],
            _public_inputs: &[u8],
            _verification_key: &[u8],
            _mode: ProofMode,
        ) -> ZkResult<bool> {
            Ok(true)
        }
    }

    fn accept_all() -> VerifierBinding {
        VerifierBinding {
            verifier: Arc::new(AcceptAll),
            circuit: CircuitRef::new("circuits/geofence.json", None),
            verification_key: Vec::new(),
        }
    }

    fn eiffel_inputs(radius: i64) -> PublicInputs {
        PublicInputs::from_target(&GeoCoordinate::new(48.8584, 2.2945).unwrap(), radius)
    }

    fn cell() -> [u8; 32] {
        GeoCell::parse("u09tunq", 7).unwrap().to_bytes32()
    }

    #[tokio::test]
    async fn test_first_submission_records_and_emits() {
        let mut registry = RegistryMirror::open_in_memory(accept_all()).unwrap();
        let mut events = registry.subscribe();
        let inputs = eiffel_inputs(50);

        let event = registry
            .submit(&[0xaa; 20], b"proof-1", &inputs.encode(), &cell(), 1_700_000_000)
            .unwrap();

        assert_eq!(event.target_lat, 48_858_400);
        assert_eq!(event.target_lon, 2_294_500);
        assert_eq!(event.radius_meters, 50);
        assert_eq!(event.geo_cell.as_str(), "u09tunq");
        assert_eq!(events.recv().await.unwrap(), event);
        assert_eq!(
            registry.first_seen(&inputs.hash()).unwrap(),
            Some(ReplayGuardEntry {
                public_input_hash: inputs.hash(),
                first_seen_unix: 1_700_000_000,
            })
        );
    }

    #[test]
    fn test_same_public_inputs_rejected_even_with_different_proof() {
        let mut registry = RegistryMirror::open_in_memory(accept_all()).unwrap();
        let encoded = eiffel_inputs(50).encode();

        registry
            .submit(&[0xaa; 20], b"proof-1", &encoded, &cell(), 100)
            .unwrap();
        let err = registry
            .submit(&[0xbb; 20], b"proof-2", &encoded, &cell(), 200)
            .unwrap_err();

        assert_eq!(err.revert_reason(), "AlreadyUsed");
        match err {
            ChainError::AlreadyUsed {
                first_seen_unix, ..
            } => assert_eq!(first_seen_unix, 100),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(registry.events().unwrap().len(), 1);
        assert_eq!(registry.metrics().replays_rejected_total, 1);
    }

    #[test]
    fn test_different_radius_is_a_different_identity() {
        let mut registry = RegistryMirror::open_in_memory(accept_all()).unwrap();
        registry
            .submit(&[1; 20], b"p", &eiffel_inputs(50).encode(), &cell(), 1)
            .unwrap();
        registry
            .submit(&[1; 20], b"p", &eiffel_inputs(51).encode(), &cell(), 2)
            .unwrap();
        assert_eq!(registry.events().unwrap().len(), 2);
    }

    #[test]
    fn test_unverifiable_proof_is_rejected_without_recording() {
        let backend = DeterministicBackend::new();
        let circuit = CircuitRef::new("circuits/geofence.json", None);
        let vk = backend
            .verification_key(&circuit, ProofMode::OnChain)
            .unwrap();
        let binding = VerifierBinding {
            verifier: Arc::new(backend.clone()),
            circuit: circuit.clone(),
            verification_key: vk.clone(),
        };
        let mut registry = RegistryMirror::open_in_memory(binding).unwrap();
        let inputs = eiffel_inputs(50);

        let err = registry
            .submit(&[1; 20], &[0u8; 36], &inputs.encode(), &cell(), 1)
            .unwrap_err();
        assert_eq!(err.revert_reason(), "VerificationFailed");
        assert_eq!(registry.first_seen(&inputs.hash()).unwrap(), None);

        // A genuine proof for the same inputs is still accepted
        let target = GeoCoordinate::new(48.8584, 2.2945).unwrap();
        let witness = PrivateWitness::from_fix(&target.offset(10.0, 0.0));
        let proof = backend
            .prove(&circuit, &witness, &inputs, &vk, ProofMode::OnChain)
            .unwrap();
        registry
            .submit(&[1; 20], &proof, &inputs.encode(), &cell(), 2)
            .unwrap();
    }

    #[test]
    fn test_malformed_inputs() {
        let mut registry = RegistryMirror::open_in_memory(accept_all()).unwrap();
        let err = registry
            .submit(&[1; 20], b"p", &[0u8; 64], &cell(), 1)
            .unwrap_err();
        assert_eq!(err.revert_reason(), "MalformedPublicInputs");

        let err = registry
            .submit(&[1; 20], b"p", &eiffel_inputs(50).encode(), &[b'a'; 32], 1)
            .unwrap_err();
        assert_eq!(err.revert_reason(), "InvalidGeoCell");

        let mut trailing = cell();
        trailing[31] = b'z';
        let err = registry
            .submit(&[1; 20], b"p", &eiffel_inputs(50).encode(), &trailing, 1)
            .unwrap_err();
        assert_eq!(err.revert_reason(), "InvalidGeoCell");
        assert!(registry.events().unwrap().is_empty());
    }

    #[test]
    fn test_guard_persists_across_reopen() {
        let path: PathBuf =
            std::env::temp_dir().join(format!("geoproof-registry-{}.db", uuid::Uuid::new_v4()));
        let encoded = eiffel_inputs(50).encode();
        {
            let mut registry = RegistryMirror::open(&path, accept_all()).unwrap();
            registry.submit(&[1; 20], b"p", &encoded, &cell(), 1).unwrap();
        }

        let mut registry = RegistryMirror::open(&path, accept_all()).unwrap();
        assert!(registry
            .submit(&[2; 20], b"q", &encoded, &cell(), 2)
            .unwrap_err()
            .is_replay());
        assert_eq!(registry.events().unwrap()[0].prover, vec![1; 20]);

        drop(registry);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }
}
