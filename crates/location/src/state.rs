//! Pure transition function for the permission ladder and fix request.
//!
//! `transition(state, event) -> (state, effect)` does no I/O. The driver
//! executes the returned effect and feeds its outcome back as the next
//! event. Authorization is re-read after every prompt, since the user may
//! answer a system dialog at any time.

use serde::{Deserialize, Serialize};

use crate::error::{LocationError, ProviderError};
use crate::platform::{AccuracyTier, AuthSnapshot, AuthorizationTier, Denial, Location};

/// Per-request escalation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderPolicy {
    /// Ask when-in-use users to upgrade to always
    pub escalate_to_always: bool,
    /// Temporary full accuracy may still be requested this session
    pub full_accuracy_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptKind {
    WhenInUse,
    Always,
    FullAccuracy,
}

/// Progress through the permission ladder. Each prompt is issued at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ladder {
    pub policy: LadderPolicy,
    pub prompted_when_in_use: bool,
    pub prompted_always: bool,
    pub prompted_full_accuracy: bool,
    pub pending: Option<PromptKind>,
}

impl Ladder {
    pub fn new(policy: LadderPolicy) -> Self {
        Self {
            policy,
            prompted_when_in_use: false,
            prompted_always: false,
            prompted_full_accuracy: false,
            pending: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AcquisitionState {
    Idle,
    RequestingPermission(Ladder),
    AwaitingFix,
    FixObtained(Location),
    FixFailed(LocationError),
    DeniedTerminal(LocationError),
}

impl AcquisitionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcquisitionState::FixObtained(_)
                | AcquisitionState::FixFailed(_)
                | AcquisitionState::DeniedTerminal(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AcquisitionEvent {
    Start(LadderPolicy),
    Authorization(AuthSnapshot),
    PromptResolved,
    PromptTimedOut,
    FixDelivered(Result<Location, ProviderError>),
    FixTimedOut,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    ReadAuthorization,
    PromptWhenInUse,
    PromptAlways,
    PromptFullAccuracy,
    RequestFix,
    Finish(Result<Location, LocationError>),
    /// Event not applicable in this state (late or duplicate callback)
    Ignore,
}

pub fn transition(state: AcquisitionState, event: AcquisitionEvent) -> (AcquisitionState, Effect) {
    use AcquisitionEvent as Ev;
    use AcquisitionState as St;

    match (state, event) {
        (St::Idle, Ev::Start(policy)) => (
            St::RequestingPermission(Ladder::new(policy)),
            Effect::ReadAuthorization,
        ),

        (St::RequestingPermission(ladder), Ev::Authorization(snapshot)) => {
            climb(ladder, snapshot)
        }

        (St::RequestingPermission(mut ladder), Ev::PromptResolved) => {
            ladder.pending = None;
            (St::RequestingPermission(ladder), Effect::ReadAuthorization)
        }

        (St::RequestingPermission(mut ladder), Ev::PromptTimedOut) => {
            match ladder.pending.take() {
                // Without a foreground grant there is nothing to fall back on.
                Some(PromptKind::WhenInUse) => deny(LocationError::PermissionPromptTimeout),
                _ => (St::RequestingPermission(ladder), Effect::ReadAuthorization),
            }
        }

        (St::AwaitingFix, Ev::FixDelivered(Ok(location))) => (
            St::FixObtained(location),
            Effect::Finish(Ok(location)),
        ),

        (St::AwaitingFix, Ev::FixDelivered(Err(error))) => {
            let error = LocationError::from(error);
            (St::FixFailed(error.clone()), Effect::Finish(Err(error)))
        }

        (St::AwaitingFix, Ev::FixTimedOut) => (
            St::FixFailed(LocationError::Timeout),
            Effect::Finish(Err(LocationError::Timeout)),
        ),

        (state, _) => (state, Effect::Ignore),
    }
}

fn climb(mut ladder: Ladder, snapshot: AuthSnapshot) -> (AcquisitionState, Effect) {
    match snapshot.tier {
        AuthorizationTier::DeniedOrRestricted(Denial::Denied) => {
            deny(LocationError::PermissionDenied)
        }
        AuthorizationTier::DeniedOrRestricted(Denial::Restricted) => {
            deny(LocationError::PermissionRestricted)
        }
        AuthorizationTier::Undetermined if !ladder.prompted_when_in_use => {
            ladder.prompted_when_in_use = true;
            ladder.pending = Some(PromptKind::WhenInUse);
            (
                AcquisitionState::RequestingPermission(ladder),
                Effect::PromptWhenInUse,
            )
        }
        // Dialog dismissed without an answer
        AuthorizationTier::Undetermined => deny(LocationError::PermissionDenied),
        AuthorizationTier::WhenInUse
            if ladder.policy.escalate_to_always && !ladder.prompted_always =>
        {
            ladder.prompted_always = true;
            ladder.pending = Some(PromptKind::Always);
            (
                AcquisitionState::RequestingPermission(ladder),
                Effect::PromptAlways,
            )
        }
        AuthorizationTier::WhenInUse | AuthorizationTier::Always => {
            if snapshot.accuracy == AccuracyTier::Reduced
                && ladder.policy.full_accuracy_available
                && !ladder.prompted_full_accuracy
            {
                ladder.prompted_full_accuracy = true;
                ladder.pending = Some(PromptKind::FullAccuracy);
                (
                    AcquisitionState::RequestingPermission(ladder),
                    Effect::PromptFullAccuracy,
                )
            } else {
                (AcquisitionState::AwaitingFix, Effect::RequestFix)
            }
        }
    }
}

fn deny(error: LocationError) -> (AcquisitionState, Effect) {
    (
        AcquisitionState::DeniedTerminal(error.clone()),
        Effect::Finish(Err(error)),
    )
}
