//! Geo-cell spatial index (base-32 geohash).
//!
//! A cell id is produced by repeatedly halving the longitude and latitude
//! ranges, alternating longitude first, and packing five bits per character
//! from [`ALPHABET`]. Every character refines the enclosing cell, so a
//! shorter prefix always denotes a strictly larger region. The submission
//! ledger answers neighborhood queries with plain prefix matches on this
//! property.
//!
//! A value exactly on a split line (`value == mid`) always takes the upper
//! half.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::geo::{GeoCoordinate, ScaledCoordinate};
use crate::public_inputs::PublicInputs;

/// Base-32 alphabet (no `a`, `i`, `l`, `o`)
pub const ALPHABET: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Default precision, a cell of roughly 150m
pub const DEFAULT_PRECISION: usize = 7;

/// Maximum supported precision (60 interleaved bits)
pub const MAX_PRECISION: usize = 12;

const BITS_PER_CHAR: u32 = 5;

/// Errors for coordinates and geo-cell identifiers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Latitude must be between -90 and 90, got {0}")]
    InvalidLatitude(f64),

    #[error("Longitude must be between -180 and 180, got {0}")]
    InvalidLongitude(f64),

    #[error("Radius must be between 10 and 500 meters, got {0}")]
    InvalidRadius(i64),

    #[error("Precision must be between 1 and {MAX_PRECISION}, got {0}")]
    InvalidPrecision(usize),

    #[error("Geo-cell length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Invalid geo-cell character {character:?} at position {position}")]
    InvalidCharacter { character: char, position: usize },
}

/// Fixed-precision cell identifier. A bucket key, never an identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeoCell(String);

/// Latitude/longitude bounds of a cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn center(&self) -> GeoCoordinate {
        GeoCoordinate {
            latitude: (self.min_lat + self.max_lat) / 2.0,
            longitude: (self.min_lon + self.max_lon) / 2.0,
        }
    }

    pub fn contains(&self, point: &GeoCoordinate) -> bool {
        (self.min_lat..self.max_lat).contains(&point.latitude)
            && (self.min_lon..self.max_lon).contains(&point.longitude)
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }
}

/// Encode a coordinate pair into a cell id of `precision` characters.
pub fn encode(latitude: f64, longitude: f64, precision: usize) -> Result<GeoCell, GeoError> {
    check_precision(precision)?;
    let point = GeoCoordinate::new(latitude, longitude)?;

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut cell = String::with_capacity(precision);
    let mut index = 0usize;
    let mut bits = 0u32;
    let mut lon_turn = true;

    while cell.len() < precision {
        let (range, value) = if lon_turn {
            (&mut lon_range, point.longitude)
        } else {
            (&mut lat_range, point.latitude)
        };
        let mid = (range.0 + range.1) / 2.0;
        index <<= 1;
        if value >= mid {
            index |= 1;
            range.0 = mid;
        } else {
            range.1 = mid;
        }
        lon_turn = !lon_turn;
        bits += 1;

        if bits == BITS_PER_CHAR {
            cell.push(ALPHABET[index] as char);
            index = 0;
            bits = 0;
        }
    }

    Ok(GeoCell(cell))
}

/// Bounds of the region a cell id denotes.
pub fn decode_bounds(cell: &GeoCell) -> BoundingBox {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut lon_turn = true;

    for byte in cell.0.bytes() {
        // validated on construction
        let value = ALPHABET.iter().position(|c| *c == byte).unwrap_or(0);
        for shift in (0..BITS_PER_CHAR).rev() {
            let bit = (value >> shift) & 1;
            let range = if lon_turn {
                &mut lon_range
            } else {
                &mut lat_range
            };
            let mid = (range.0 + range.1) / 2.0;
            if bit == 1 {
                range.0 = mid;
            } else {
                range.1 = mid;
            }
            lon_turn = !lon_turn;
        }
    }

    BoundingBox {
        min_lat: lat_range.0,
        max_lat: lat_range.1,
        min_lon: lon_range.0,
        max_lon: lon_range.1,
    }
}

/// Validate a query prefix: 1..=12 characters from the alphabet.
pub fn validate_prefix(prefix: &str) -> Result<(), GeoError> {
    let len = prefix.chars().count();
    check_precision(len)?;
    check_alphabet(prefix)
}

fn check_precision(precision: usize) -> Result<(), GeoError> {
    if precision == 0 || precision > MAX_PRECISION {
        return Err(GeoError::InvalidPrecision(precision));
    }
    Ok(())
}

fn check_alphabet(text: &str) -> Result<(), GeoError> {
    for (position, character) in text.chars().enumerate() {
        if !character.is_ascii() || !ALPHABET.contains(&(character as u8)) {
            return Err(GeoError::InvalidCharacter {
                character,
                position,
            });
        }
    }
    Ok(())
}

impl GeoCell {
    /// Parse a cell id that must be exactly `expected_precision` characters.
    pub fn parse(text: &str, expected_precision: usize) -> Result<Self, GeoError> {
        check_precision(expected_precision)?;
        let actual = text.chars().count();
        if actual != expected_precision {
            return Err(GeoError::LengthMismatch {
                expected: expected_precision,
                actual,
            });
        }
        check_alphabet(text)?;
        Ok(Self(text.to_string()))
    }

    /// Cell of a target, indexed through its micro-degree representation so
    /// that it matches the cell derived from the target's public inputs.
    pub fn for_target(target: &GeoCoordinate, precision: usize) -> Result<Self, GeoError> {
        Self::from_scaled(target.scaled_latitude(), target.scaled_longitude(), precision)
    }

    /// Cell of the target asserted by a set of public inputs.
    pub fn from_public_inputs(inputs: &PublicInputs, precision: usize) -> Result<Self, GeoError> {
        Self::from_scaled(
            ScaledCoordinate(inputs.target_lat),
            ScaledCoordinate(inputs.target_lon),
            precision,
        )
    }

    fn from_scaled(
        lat: ScaledCoordinate,
        lon: ScaledCoordinate,
        precision: usize,
    ) -> Result<Self, GeoError> {
        encode(lat.to_degrees(), lon.to_degrees(), precision)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn precision(&self) -> usize {
        self.0.len()
    }

    /// Enclosing cell at a coarser precision.
    pub fn parent(&self, precision: usize) -> Result<Self, GeoError> {
        check_precision(precision)?;
        if precision > self.precision() {
            return Err(GeoError::LengthMismatch {
                expected: self.precision(),
                actual: precision,
            });
        }
        Ok(Self(self.0[..precision].to_string()))
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    pub fn bounds(&self) -> BoundingBox {
        decode_bounds(self)
    }

    /// ASCII left-aligned, zero padded 32-byte form used by the registry.
    pub fn to_bytes32(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..self.0.len()].copy_from_slice(self.0.as_bytes());
        out
    }

    pub fn from_bytes32(bytes: &[u8; 32]) -> Result<Self, GeoError> {
        let len = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        // Padding must be all zero so each cell has exactly one encoding
        if let Some(last) = bytes.iter().rposition(|b| *b != 0).filter(|last| *last >= len) {
            return Err(GeoError::LengthMismatch {
                expected: len,
                actual: last + 1,
            });
        }
        let text: String = bytes[..len].iter().map(|b| *b as char).collect();
        Self::try_from(text)
    }
}

impl TryFrom<String> for GeoCell {
    type Error = GeoError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        check_precision(text.chars().count())?;
        check_alphabet(&text)?;
        Ok(Self(text))
    }
}

impl From<GeoCell> for String {
    fn from(cell: GeoCell) -> Self {
        cell.0
    }
}

impl fmt::Display for GeoCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
