//! Error types for location acquisition.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced to the caller of a one-shot fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum LocationError {
    /// User denied location access
    #[error("Location permission denied")]
    PermissionDenied,

    /// Access restricted by policy (parental controls, MDM)
    #[error("Location permission restricted")]
    PermissionRestricted,

    /// A permission prompt was never answered
    #[error("Location permission prompt timed out while undetermined")]
    PermissionPromptTimeout,

    /// Provider could not determine a location
    #[error("Location unknown")]
    LocationUnknown,

    /// No fix arrived before the deadline
    #[error("Location fix timed out")]
    Timeout,
}

impl LocationError {
    /// Permission problems are fixed in system settings, the rest by retrying.
    pub fn is_permission(&self) -> bool {
        matches!(
            self,
            LocationError::PermissionDenied
                | LocationError::PermissionRestricted
                | LocationError::PermissionPromptTimeout
        )
    }
}

/// Raw failure reported by the platform's fix callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ProviderError {
    #[error("Provider could not determine location")]
    LocationUnknown,

    #[error("Provider reported access denied")]
    Denied,

    #[error("Provider error: {0}")]
    Other(String),
}

impl From<ProviderError> for LocationError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Denied => LocationError::PermissionDenied,
            ProviderError::LocationUnknown | ProviderError::Other(_) => {
                LocationError::LocationUnknown
            }
        }
    }
}
