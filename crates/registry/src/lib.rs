//! Registry mirror: permanent replay guard keyed by public-input hash,
//! plus the submission event log.

pub mod error;
pub mod mirror;

pub use error::{ChainError, ChainResult};
pub use mirror::{
    RegistryMetrics, RegistryMirror, ReplayGuardEntry, SubmissionEvent, VerifierBinding,
    EVENT_CHANNEL_CAPACITY,
};
