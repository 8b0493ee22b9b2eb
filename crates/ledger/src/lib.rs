//! Off-chain store of proof-backed reviews.
//!
//! Records are bucketed by geo-cell and queried by cell prefix. A prover
//! resubmitting for the same cell inside the dedup window replaces their
//! earlier record.

pub mod error;
pub mod record;
pub mod store;

pub use error::{Result, SubmitError};
pub use record::{SubmissionRecord, MAX_RATING, MAX_TEXT_CHARS, MIN_RATING};
pub use store::{LedgerMetrics, SubmissionLedger, SubmitReceipt};
