//! Permission-aware, one-shot location acquisition.
//!
//! The permission ladder is a finite-state machine with a pure transition
//! function ([`state::transition`]); [`LocationAcquirer`] drives it against an
//! injected [`LocationPlatform`], executing one side effect per step. Every
//! suspension point (permission prompt, fix wait) is therefore an explicit
//! [`Effect`] that tests can enumerate without a real platform.
//!
//! # State Transitions
//!
//! ```text
//! Idle
//!     ↓ (start)
//! RequestingPermission ──(denied / restricted)──→ DeniedTerminal
//!     ↓ (granted, accuracy settled)
//! AwaitingFix
//!     ↓
//! FixObtained | FixFailed
//! ```

pub mod acquirer;
pub mod error;
pub mod platform;
pub mod scripted;
pub mod state;

pub use acquirer::{Acquisition, LocationAcquirer};
pub use error::{LocationError, ProviderError};
pub use platform::{
    AccuracyTier, AuthSnapshot, AuthorizationTier, Denial, FixSink, Location, LocationPlatform,
};
pub use scripted::{FixBehavior, PromptBehavior, ScriptedPlatform};
pub use state::{
    transition, AcquisitionEvent, AcquisitionState, Effect, Ladder, LadderPolicy, PromptKind,
};
