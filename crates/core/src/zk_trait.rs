//! Domain-level interface for the external proving capability.
//!
//! The circuit arithmetic and key generation live outside this workspace.
//! Everything here treats them as three blocking calls with nondeterministic
//! latency (seconds) and deterministic correctness:
//!
//! - `verification_key(circuit, mode)`
//! - `prove(circuit, witness, public_inputs, vk, mode)`
//! - `verify(circuit, proof, public_inputs, vk, mode)`
//!
//! Callers that need a deadline run them on a blocking thread and wrap the
//! join handle in a timeout; the capability itself offers no abort.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::geo::GeoCoordinate;
use crate::public_inputs::PublicInputs;

/// Result type for capability calls
pub type ZkResult<T> = std::result::Result<T, ZkError>;

/// Errors reported by a proving backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZkError {
    /// Circuit or SRS artifacts could not be loaded
    #[error("Circuit assets missing: {0}")]
    AssetsMissing(String),

    /// The witness does not satisfy the circuit
    #[error("Constraint unsatisfied: {0}")]
    ConstraintUnsatisfied(String),

    /// Proof generation failed
    #[error("Proof generation failed: {0}")]
    ProofGenerationFailed(String),

    /// Verification could not be carried out
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Location of a compiled circuit and its structured reference string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitRef {
    pub circuit_path: PathBuf,
    pub srs_path: Option<PathBuf>,
}

impl CircuitRef {
    pub fn new(circuit_path: impl Into<PathBuf>, srs_path: Option<PathBuf>) -> Self {
        Self {
            circuit_path: circuit_path.into(),
            srs_path,
        }
    }
}

/// Proving mode. On-chain proofs use a hash that the registry's verifier
/// contract can recompute; off-chain proofs are checked by the relay or device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofMode {
    OnChain,
    OffChain,
}

impl ProofMode {
    pub fn from_on_chain(on_chain: bool) -> Self {
        if on_chain {
            ProofMode::OnChain
        } else {
            ProofMode::OffChain
        }
    }

    pub fn is_on_chain(self) -> bool {
        matches!(self, ProofMode::OnChain)
    }
}

/// Private witness: the device's own fix in micro-degrees. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateWitness {
    pub lat: i64,
    pub lon: i64,
}

impl PrivateWitness {
    pub fn from_fix(fix: &GeoCoordinate) -> Self {
        Self {
            lat: fix.scaled_latitude().value(),
            lon: fix.scaled_longitude().value(),
        }
    }
}

impl std::fmt::Debug for PrivateWitness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateWitness { .. }")
    }
}

/// Proof verification half of the capability.
pub trait ProofVerifier: Send + Sync {
    fn verify(
        &self,
        circuit: &CircuitRef,
        proof: &[u8],
        public_inputs: &[u8],
        verification_key: &[u8],
        mode: ProofMode,
    ) -> ZkResult<bool>;
}

/// Full proving capability (dependency injection seam).
pub trait ProvingBackend: ProofVerifier {
    fn verification_key(&self, circuit: &CircuitRef, mode: ProofMode) -> ZkResult<Vec<u8>>;

    fn prove(
        &self,
        circuit: &CircuitRef,
        witness: &PrivateWitness,
        public_inputs: &PublicInputs,
        verification_key: &[u8],
        mode: ProofMode,
    ) -> ZkResult<Vec<u8>>;
}
