//! Proof generation for geofence presence claims.
//!
//! [`ProofLifecycle`] turns a target and radius into a [`ProofArtifact`]:
//! one-shot fix, haversine preflight, cached verification key, then a
//! bounded call into the injected [`ProvingBackend`](geoproof_core::ProvingBackend).

pub mod error;
pub mod key_cache;
pub mod lifecycle;
pub mod reference;

pub use error::{ProofError, Remediation};
pub use key_cache::{KeyCacheMetrics, KeyCacheSnapshot, VerificationKeyCache};
pub use lifecycle::{
    LifecycleConfig, LifecycleMetrics, LifecycleSnapshot, ProofArtifact, ProofAttempt,
    ProofLifecycle, ProofPhase,
};
pub use reference::{within_geofence, DeterministicBackend, PROOF_LEN};
