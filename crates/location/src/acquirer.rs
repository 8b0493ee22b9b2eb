//! Async driver for the acquisition state machine.

use geoproof_core::{GeoCoordinate, LocationConfig};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{LocationError, ProviderError};
use crate::platform::{AuthSnapshot, FixSink, Location, LocationPlatform};
use crate::state::{transition, AcquisitionEvent, AcquisitionState, Effect, LadderPolicy};

/// Outcome of one request plus the effects executed to reach it, in order.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub result: Result<Location, LocationError>,
    pub effects: Vec<Effect>,
}

/// Drives one-shot fix requests against a platform.
///
/// Holds the per-session memory that the temporary full-accuracy prompt has
/// already been shown; nothing else carries over between requests.
pub struct LocationAcquirer<P: ?Sized> {
    platform: Arc<P>,
    fix_timeout: Duration,
    prompt_timeout: Duration,
    escalate_to_always: bool,
    purpose_key: String,
    full_accuracy_requested: AtomicBool,
}

impl<P: LocationPlatform + ?Sized> LocationAcquirer<P> {
    pub fn new(platform: Arc<P>, config: &LocationConfig) -> Self {
        Self {
            platform,
            fix_timeout: config.fix_timeout(),
            prompt_timeout: config.prompt_timeout(),
            escalate_to_always: config.escalate_to_always,
            purpose_key: config.full_accuracy_purpose_key.clone(),
            full_accuracy_requested: AtomicBool::new(false),
        }
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Request a single fix. Exactly one result per call.
    pub async fn request_one_shot_fix(
        &self,
        previous: Option<AuthSnapshot>,
    ) -> Result<Location, LocationError> {
        self.acquire(previous).await.result
    }

    /// Like [`request_one_shot_fix`](Self::request_one_shot_fix), also
    /// returning the executed effects.
    pub async fn acquire(&self, previous: Option<AuthSnapshot>) -> Acquisition {
        let policy = LadderPolicy {
            escalate_to_always: self.escalate_to_always,
            full_accuracy_available: !self.full_accuracy_requested.load(Ordering::SeqCst),
        };

        let mut state = AcquisitionState::Idle;
        let mut event = AcquisitionEvent::Start(policy);
        let mut effects = Vec::new();
        let mut first_read = true;

        loop {
            let (next, effect) = transition(state, event);
            state = next;
            effects.push(effect.clone());

            event = match effect {
                Effect::ReadAuthorization => {
                    let snapshot = self.platform.authorization();
                    if first_read {
                        first_read = false;
                        if let Some(previous) = previous.filter(|p| *p != snapshot) {
                            debug!(
                                ?previous,
                                current = ?snapshot,
                                "Authorization changed since last request"
                            );
                        }
                    }
                    AcquisitionEvent::Authorization(snapshot)
                }
                Effect::PromptWhenInUse => {
                    info!("Requesting when-in-use location permission");
                    self.prompt(self.platform.request_when_in_use()).await
                }
                Effect::PromptAlways => {
                    info!("Requesting always location permission");
                    self.prompt(self.platform.request_always()).await
                }
                Effect::PromptFullAccuracy => {
                    self.full_accuracy_requested.store(true, Ordering::SeqCst);
                    info!(purpose = %self.purpose_key, "Requesting temporary full accuracy");
                    self.prompt(
                        self.platform
                            .request_temporary_full_accuracy(&self.purpose_key),
                    )
                    .await
                }
                Effect::RequestFix => self.await_fix().await,
                Effect::Finish(result) => {
                    if let Err(e) = &result {
                        warn!(error = %e, "Location acquisition failed");
                    }
                    return Acquisition { result, effects };
                }
                Effect::Ignore => {
                    warn!(?state, "Acquisition driver received an inapplicable event");
                    return Acquisition {
                        result: Err(LocationError::LocationUnknown),
                        effects,
                    };
                }
            };
        }
    }

    async fn prompt<F: Future<Output = ()>>(&self, dialog: F) -> AcquisitionEvent {
        match timeout(self.prompt_timeout, dialog).await {
            Ok(()) => AcquisitionEvent::PromptResolved,
            Err(_) => {
                warn!(
                    timeout_ms = self.prompt_timeout.as_millis() as u64,
                    "Permission prompt did not resolve"
                );
                AcquisitionEvent::PromptTimedOut
            }
        }
    }

    async fn await_fix(&self) -> AcquisitionEvent {
        let (sink, receiver) = FixSink::channel();
        self.platform.request_fix(sink);

        match timeout(self.fix_timeout, receiver).await {
            Ok(Ok(Ok(location))) => {
                let coordinate = location.coordinate;
                match GeoCoordinate::new(coordinate.latitude, coordinate.longitude) {
                    Ok(_) => AcquisitionEvent::FixDelivered(Ok(location)),
                    Err(e) => {
                        warn!(error = %e, "Provider delivered an unusable fix");
                        AcquisitionEvent::FixDelivered(Err(ProviderError::LocationUnknown))
                    }
                }
            }
            Ok(Ok(Err(e))) => AcquisitionEvent::FixDelivered(Err(e)),
            // Provider dropped the sink without calling back
            Ok(Err(_)) => AcquisitionEvent::FixDelivered(Err(ProviderError::Other(
                "fix callback dropped".to_string(),
            ))),
            Err(_) => AcquisitionEvent::FixTimedOut,
        }
    }
}
