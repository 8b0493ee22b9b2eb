//! Registry error types

use geoproof_core::{EncodingError, GeoError, PublicInputHash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Malformed public inputs: {0}")]
    MalformedPublicInputs(#[from] EncodingError),

    #[error("Invalid geo cell: {0}")]
    InvalidGeoCell(#[from] GeoError),

    #[error("Proof verification failed: {0}")]
    VerificationFailed(String),

    /// Terminal for this public-input set; resubmitting can never succeed.
    #[error("Public inputs {hash} already used at {first_seen_unix}")]
    AlreadyUsed {
        hash: PublicInputHash,
        first_seen_unix: i64,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored entry is unreadable: {0}")]
    Corrupted(String),
}

impl ChainError {
    /// Stable revert reason, distinguishable by callers.
    pub fn revert_reason(&self) -> &'static str {
        match self {
            ChainError::MalformedPublicInputs(_) => "MalformedPublicInputs",
            ChainError::InvalidGeoCell(_) => "InvalidGeoCell",
            ChainError::VerificationFailed(_) => "VerificationFailed",
            ChainError::AlreadyUsed { .. } => "AlreadyUsed",
            ChainError::Database(_) | ChainError::Io(_) | ChainError::Corrupted(_) => {
                "InternalError"
            }
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, ChainError::AlreadyUsed { .. })
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
