//! Submission records and their validation rules.

use geoproof_core::{GeoCell, PublicInputHash, PublicInputs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Result, SubmitError};

/// Maximum review text length, in characters
pub const MAX_TEXT_CHARS: usize = 280;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A review left at a place, optionally backed by a presence proof.
///
/// Never mutated once stored; a later record from the same prover for the
/// same cell inside the dedup window replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub prover_id: Vec<u8>,
    pub geo_cell: GeoCell,
    pub categories: BTreeSet<String>,
    pub rating: u8,
    pub text: String,
    pub timestamp_unix: i64,
    pub proof_bytes: Option<Vec<u8>>,
    pub public_input_bytes: Option<Vec<u8>>,
    pub expires_at_unix: Option<i64>,
}

impl SubmissionRecord {
    /// Check every field rule; returns the public-input hash when inputs are attached.
    pub fn validate(&self, precision: usize) -> Result<Option<PublicInputHash>> {
        if self.prover_id.is_empty() {
            return Err(SubmitError::invalid("proverId", "must not be empty"));
        }

        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(SubmitError::invalid(
                "rating",
                format!("{} is outside {MIN_RATING}..={MAX_RATING}", self.rating),
            ));
        }

        if self.categories.is_empty() {
            return Err(SubmitError::invalid("categories", "at least one required"));
        }
        if self.categories.iter().any(|c| c.trim().is_empty()) {
            return Err(SubmitError::invalid("categories", "blank category"));
        }

        if self.text.trim().is_empty() {
            return Err(SubmitError::invalid("text", "must not be empty"));
        }
        let chars = self.text.chars().count();
        if chars > MAX_TEXT_CHARS {
            return Err(SubmitError::invalid(
                "text",
                format!("{chars} characters exceeds {MAX_TEXT_CHARS}"),
            ));
        }

        if self.geo_cell.precision() != precision {
            return Err(SubmitError::invalid(
                "geoCell",
                format!(
                    "expected {precision} characters, got {}",
                    self.geo_cell.precision()
                ),
            ));
        }

        match (&self.proof_bytes, &self.public_input_bytes) {
            (Some(_), None) => Err(SubmitError::invalid(
                "publicInputBytes",
                "proof supplied without public inputs",
            )),
            (_, Some(bytes)) => {
                PublicInputs::decode(bytes)
                    .map_err(|e| SubmitError::invalid("publicInputBytes", e.to_string()))?;
                Ok(Some(PublicInputHash::of_bytes(bytes)))
            }
            (None, None) => Ok(None),
        }
    }

    /// Decoded public inputs, if attached and well-formed.
    pub fn public_inputs(&self) -> Option<PublicInputs> {
        self.public_input_bytes
            .as_deref()
            .and_then(|bytes| PublicInputs::decode(bytes).ok())
    }

    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expires_at_unix.is_some_and(|expires| expires <= now_unix)
    }
}
