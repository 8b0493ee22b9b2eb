//! End-to-end tests across the GeoProof workspace
//!
//! This suite validates:
//! - Device proof generation against a scripted location platform
//! - Off-chain submission through the relay HTTP surface
//! - On-chain replay guarding in the registry mirror
//! - Persistence of both stores across restarts

pub mod test_utils;

#[cfg(test)]
mod proof_flow_tests;

#[cfg(test)]
mod persistence_tests;
