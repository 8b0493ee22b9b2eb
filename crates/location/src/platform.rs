//! Host platform boundary: permission tiers, prompts and the fix callback.

use async_trait::async_trait;
use geoproof_core::GeoCoordinate;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ProviderError;

/// Why access is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Denial {
    Denied,
    Restricted,
}

/// Location authorization tier as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationTier {
    Undetermined,
    WhenInUse,
    Always,
    DeniedOrRestricted(Denial),
}

impl AuthorizationTier {
    pub fn is_granted(self) -> bool {
        matches!(self, AuthorizationTier::WhenInUse | AuthorizationTier::Always)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccuracyTier {
    Full,
    Reduced,
}

/// One fresh read of the platform's permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSnapshot {
    pub tier: AuthorizationTier,
    pub accuracy: AccuracyTier,
}

impl AuthSnapshot {
    pub fn new(tier: AuthorizationTier, accuracy: AccuracyTier) -> Self {
        Self { tier, accuracy }
    }
}

/// A delivered fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub coordinate: GeoCoordinate,
    /// Horizontal accuracy radius in meters, when the provider reports one
    pub horizontal_accuracy_m: Option<f64>,
}

impl Location {
    pub fn new(coordinate: GeoCoordinate) -> Self {
        Self {
            coordinate,
            horizontal_accuracy_m: None,
        }
    }
}

type FixResult = Result<Location, ProviderError>;

/// One-shot callback handed to the platform for a single fix request.
///
/// Providers are allowed to call back more than once; only the first
/// delivery reaches the requester and later ones return `false`.
#[derive(Clone)]
pub struct FixSink {
    slot: Arc<Mutex<Option<oneshot::Sender<FixResult>>>>,
}

impl FixSink {
    pub fn channel() -> (Self, oneshot::Receiver<FixResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    pub fn deliver(&self, result: FixResult) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            // A closed receiver means the request already timed out.
            Some(tx) => tx.send(result).is_ok(),
            None => {
                debug!("Dropping duplicate fix delivery");
                false
            }
        }
    }

    pub fn is_spent(&self) -> bool {
        match self.slot.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// What the acquisition state machine needs from the host platform.
///
/// Prompt methods resolve when the system dialog is dismissed, however the
/// user answered; the outcome is read back through [`authorization`].
///
/// [`authorization`]: LocationPlatform::authorization
#[async_trait]
pub trait LocationPlatform: Send + Sync {
    /// Current tier, read fresh on every call
    fn authorization(&self) -> AuthSnapshot;

    async fn request_when_in_use(&self);

    async fn request_always(&self);

    async fn request_temporary_full_accuracy(&self, purpose_key: &str);

    /// Start a one-shot fix; the outcome goes to `sink`
    fn request_fix(&self, sink: FixSink);
}
