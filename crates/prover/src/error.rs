//! Error types for the proof lifecycle.

use geoproof_core::{GeoError, ZkError};
use geoproof_location::LocationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the user can do about a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Remediation {
    /// Grant location access in system settings
    OpenSettings,
    /// Get closer to the target
    MoveCloser,
    /// Transient; wait and retry
    WaitAndRetry,
    /// Start a new attempt from scratch
    RetryFromScratch,
    None,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProofError {
    #[error("Invalid proof parameters: {0}")]
    InvalidParameters(#[from] GeoError),

    #[error("Location unavailable: {0}")]
    Location(#[from] LocationError),

    #[error("Outside geofence: observed {observed_meters:.1}m, radius {radius_meters}m")]
    OutsideRadius {
        observed_meters: f64,
        radius_meters: u32,
    },

    #[error("Circuit assets missing: {0}")]
    MissingCircuitAssets(String),

    #[error("Proof generation failed: {cause}")]
    ProofGenerationFailed { cause: String },

    #[error("Local proof verification failed: {0}")]
    VerificationFailed(String),

    #[error("Proof generation timed out after {timeout_ms}ms")]
    ProveTimeout { timeout_ms: u64 },

    #[error("Proof attempt cancelled")]
    Cancelled,
}

impl ProofError {
    /// Location and geofence failures are corrected by the user, not by a retry.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            ProofError::Location(_) | ProofError::OutsideRadius { .. }
        )
    }

    pub fn remediation(&self) -> Remediation {
        match self {
            ProofError::Location(e) if e.is_permission() => Remediation::OpenSettings,
            ProofError::Location(_) => Remediation::WaitAndRetry,
            ProofError::OutsideRadius { .. } => Remediation::MoveCloser,
            ProofError::ProofGenerationFailed { .. }
            | ProofError::VerificationFailed(_)
            | ProofError::ProveTimeout { .. } => Remediation::RetryFromScratch,
            ProofError::InvalidParameters(_)
            | ProofError::MissingCircuitAssets(_)
            | ProofError::Cancelled => Remediation::None,
        }
    }
}

impl From<ZkError> for ProofError {
    fn from(error: ZkError) -> Self {
        match error {
            ZkError::AssetsMissing(msg) => ProofError::MissingCircuitAssets(msg),
            ZkError::VerificationFailed(msg) => ProofError::VerificationFailed(msg),
            other => ProofError::ProofGenerationFailed {
                cause: other.to_string(),
            },
        }
    }
}
