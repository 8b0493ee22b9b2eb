//! Deterministic reference backend.
//!
//! Stands in for a real SNARK toolchain in simulators and tests. The geofence
//! constraint is evaluated in integer fixed point (equirectangular projection
//! around the target, millimeter units), and the "proof" is a keyed BLAKE3 MAC
//! over the encoded public inputs. It is sound only against parties that do
//! not hold the verification key.

use geoproof_core::{
    CircuitRef, PrivateWitness, ProofMode, ProofVerifier, ProvingBackend, PublicInputs, ZkError,
    ZkResult,
};
use std::time::Duration;
use tracing::debug;

const KEY_CONTEXT: &str = "geoproof reference backend 2024-06 verification key";
const PROOF_TAG: &[u8; 4] = b"GPRF";

/// Millimeters per micro-degree of latitude (mean Earth radius 6_371_000 m)
const MM_PER_MICRODEGREE: i128 = 111_195;
const MM_SCALE: i128 = 1_000;
const COS_SCALE: f64 = 1_000_000.0;

/// Length of a proof produced by this backend
pub const PROOF_LEN: usize = PROOF_TAG.len() + blake3::OUT_LEN;

#[derive(Debug, Clone, Default)]
pub struct DeterministicBackend {
    prove_latency: Duration,
    require_assets: bool,
}

impl DeterministicBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside `prove`, to exercise timeouts.
    pub fn with_prove_latency(mut self, latency: Duration) -> Self {
        self.prove_latency = latency;
        self
    }

    /// Fail with `AssetsMissing` unless the circuit (and SRS, if set) exist on disk.
    pub fn with_asset_check(mut self) -> Self {
        self.require_assets = true;
        self
    }

    fn check_assets(&self, circuit: &CircuitRef) -> ZkResult<()> {
        if !self.require_assets {
            return Ok(());
        }
        if !circuit.circuit_path.exists() {
            return Err(ZkError::AssetsMissing(format!(
                "circuit not found: {}",
                circuit.circuit_path.display()
            )));
        }
        if let Some(srs) = circuit.srs_path.as_ref().filter(|p| !p.exists()) {
            return Err(ZkError::AssetsMissing(format!(
                "SRS not found: {}",
                srs.display()
            )));
        }
        Ok(())
    }

    fn mac(verification_key: &[u8], public_inputs: &[u8]) -> blake3::Hash {
        let key = blake3::hash(verification_key);
        blake3::keyed_hash(key.as_bytes(), public_inputs)
    }
}

/// Whether the witness lies within the radius of the target, in fixed point.
pub fn within_geofence(witness: &PrivateWitness, inputs: &PublicInputs) -> bool {
    let dlat = i128::from(witness.lat) - i128::from(inputs.target_lat);
    let mut dlon = i128::from(witness.lon) - i128::from(inputs.target_lon);
    // Wrap across the antimeridian
    if dlon > 180_000_000 {
        dlon -= 360_000_000;
    } else if dlon < -180_000_000 {
        dlon += 360_000_000;
    }

    let target_lat_rad = (inputs.target_lat as f64 / 1_000_000.0).to_radians();
    let cos_fp = (target_lat_rad.cos() * COS_SCALE).round() as i128;

    let dy = dlat * MM_PER_MICRODEGREE / MM_SCALE;
    let dx = dlon * MM_PER_MICRODEGREE / MM_SCALE * cos_fp / COS_SCALE as i128;
    let radius_mm = i128::from(inputs.radius_meters) * 1_000;

    dx * dx + dy * dy <= radius_mm * radius_mm
}

impl ProofVerifier for DeterministicBackend {
    fn verify(
        &self,
        _circuit: &CircuitRef,
        proof: &[u8],
        public_inputs: &[u8],
        verification_key: &[u8],
        _mode: ProofMode,
    ) -> ZkResult<bool> {
        PublicInputs::decode(public_inputs)
            .map_err(|e| ZkError::InvalidInput(e.to_string()))?;

        if proof.len() != PROOF_LEN || &proof[..PROOF_TAG.len()] != PROOF_TAG {
            return Ok(false);
        }
        let mut mac = [0u8; blake3::OUT_LEN];
        mac.copy_from_slice(&proof[PROOF_TAG.len()..]);

        Ok(blake3::Hash::from(mac) == Self::mac(verification_key, public_inputs))
    }
}

impl ProvingBackend for DeterministicBackend {
    fn verification_key(&self, circuit: &CircuitRef, mode: ProofMode) -> ZkResult<Vec<u8>> {
        self.check_assets(circuit)?;

        let mut material = circuit.circuit_path.to_string_lossy().into_owned().into_bytes();
        if let Some(srs) = &circuit.srs_path {
            material.push(0);
            material.extend_from_slice(srs.to_string_lossy().as_bytes());
        }
        material.push(mode.is_on_chain() as u8);

        Ok(blake3::derive_key(KEY_CONTEXT, &material).to_vec())
    }

    fn prove(
        &self,
        circuit: &CircuitRef,
        witness: &PrivateWitness,
        public_inputs: &PublicInputs,
        verification_key: &[u8],
        _mode: ProofMode,
    ) -> ZkResult<Vec<u8>> {
        self.check_assets(circuit)?;
        if !self.prove_latency.is_zero() {
            std::thread::sleep(self.prove_latency);
        }

        if !within_geofence(witness, public_inputs) {
            return Err(ZkError::ConstraintUnsatisfied(
                "witness outside geofence".to_string(),
            ));
        }

        let encoded = public_inputs.encode();
        let mut proof = Vec::with_capacity(PROOF_LEN);
        proof.extend_from_slice(PROOF_TAG);
        proof.extend_from_slice(Self::mac(verification_key, &encoded).as_bytes());
        debug!(proof_len = proof.len(), "Reference proof generated");
        Ok(proof)
    }
}
