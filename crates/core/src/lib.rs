//! Core primitives for GeoProof, proof-of-presence reviews.
//!
//! This crate holds everything that must agree bit-for-bit between the
//! device, the off-chain relay and the on-chain registry: the geo-cell
//! index, the canonical public-input encoding and its digest, the
//! micro-degree coordinate representation, and the proving capability
//! traits the rest of the workspace is written against.

pub mod config;
pub mod geo;
pub mod geocell;
pub mod logging;
pub mod public_inputs;
pub mod zk_trait;

pub use config::{
    Config, ConfigError, LedgerConfig, LocationConfig, ProofConfig, RegistryConfig, RelayConfig,
};
pub use geo::{GeoCoordinate, Radius, ScaledCoordinate, MAX_RADIUS_METERS, MIN_RADIUS_METERS};
pub use geocell::{
    decode_bounds, encode, validate_prefix, BoundingBox, GeoCell, GeoError, ALPHABET,
    DEFAULT_PRECISION, MAX_PRECISION,
};
pub use public_inputs::{
    decode_hex, EncodingError, PublicInputHash, PublicInputs, ENCODED_LEN, FIELD_COUNT, WORD_LEN,
};
pub use zk_trait::{
    CircuitRef, PrivateWitness, ProofMode, ProofVerifier, ProvingBackend, ZkError, ZkResult,
};
