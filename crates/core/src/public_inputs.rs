//! Canonical public-input encoding.
//!
//! Layout: three 32-byte big-endian words, in order target latitude,
//! target longitude, radius in meters. Each word is the signed 64-bit value
//! sign-extended to 256 bits, matching the EVM word convention. The device,
//! the relay and the registry all go through this module, and the replay
//! guard identity is the BLAKE3 digest of exactly these bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::geo::{GeoCoordinate, Radius};

/// Width of one encoded field
pub const WORD_LEN: usize = 32;

/// Number of encoded fields
pub const FIELD_COUNT: usize = 3;

/// Total encoded length
pub const ENCODED_LEN: usize = WORD_LEN * FIELD_COUNT;

/// Errors decoding public inputs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("Malformed public inputs: expected {expected} bytes, got {actual}")]
    MalformedInput { expected: usize, actual: usize },

    #[error("Malformed public inputs: word {index} is not a sign-extended int64")]
    WordOutOfRange { index: usize },

    #[error("Malformed hex: {0}")]
    InvalidHex(String),
}

/// Public parameters of the geofence circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicInputs {
    /// Target latitude in micro-degrees
    pub target_lat: i64,
    /// Target longitude in micro-degrees
    pub target_lon: i64,
    /// Geofence radius in meters
    pub radius_meters: i64,
}

impl PublicInputs {
    pub fn new(target_lat: i64, target_lon: i64, radius_meters: i64) -> Self {
        Self {
            target_lat,
            target_lon,
            radius_meters,
        }
    }

    /// Build from a target and radius, using the shared micro-degree rounding.
    pub fn from_target(target: &GeoCoordinate, radius_meters: i64) -> Self {
        Self::new(
            target.scaled_latitude().value(),
            target.scaled_longitude().value(),
            radius_meters,
        )
    }

    pub fn from_target_radius(target: &GeoCoordinate, radius: Radius) -> Self {
        Self::from_target(target, radius.meters() as i64)
    }

    pub fn target(&self) -> GeoCoordinate {
        GeoCoordinate {
            latitude: self.target_lat as f64 / crate::geo::MICRO_DEGREES,
            longitude: self.target_lon as f64 / crate::geo::MICRO_DEGREES,
        }
    }

    /// Canonical bytes (always [`ENCODED_LEN`] long).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCODED_LEN);
        for value in [self.target_lat, self.target_lon, self.radius_meters] {
            out.extend_from_slice(&encode_word(value));
        }
        out
    }

    /// Exact left inverse of [`PublicInputs::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.len() != ENCODED_LEN {
            return Err(EncodingError::MalformedInput {
                expected: ENCODED_LEN,
                actual: bytes.len(),
            });
        }

        let mut fields = [0i64; FIELD_COUNT];
        for (index, word) in bytes.chunks_exact(WORD_LEN).enumerate() {
            fields[index] = decode_word(word, index)?;
        }

        Ok(Self::new(fields[0], fields[1], fields[2]))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.encode()))
    }

    pub fn from_hex(text: &str) -> Result<Self, EncodingError> {
        Self::decode(&decode_hex(text)?)
    }

    pub fn hash(&self) -> PublicInputHash {
        PublicInputHash::of_bytes(&self.encode())
    }
}

fn encode_word(value: i64) -> [u8; WORD_LEN] {
    let fill = if value < 0 { 0xFF } else { 0x00 };
    let mut word = [fill; WORD_LEN];
    word[WORD_LEN - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn decode_word(word: &[u8], index: usize) -> Result<i64, EncodingError> {
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[WORD_LEN - 8..]);
    let value = i64::from_be_bytes(low);

    let fill = if value < 0 { 0xFF } else { 0x00 };
    if word[..WORD_LEN - 8].iter().any(|b| *b != fill) {
        return Err(EncodingError::WordOutOfRange { index });
    }
    Ok(value)
}

/// Decode hex with an optional `0x` prefix.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, EncodingError> {
    let trimmed = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    hex::decode(trimmed).map_err(|e| EncodingError::InvalidHex(e.to_string()))
}

/// Replay-guard identity: BLAKE3 of the canonical encoded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicInputHash(pub [u8; 32]);

impl PublicInputHash {
    /// Digest of already-encoded bytes. Callers hash what they received, not
    /// a re-encoding, so identical bytes hash identically everywhere.
    pub fn of_bytes(encoded: &[u8]) -> Self {
        Self(*blake3::hash(encoded).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }
}

impl fmt::Display for PublicInputHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
