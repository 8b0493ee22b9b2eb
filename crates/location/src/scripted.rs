//! Scripted [`LocationPlatform`] for simulators and tests.
//!
//! Each prompt and fix request follows a fixed behavior, and the platform
//! counts what it was asked to do.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::ProviderError;
use crate::platform::{
    AccuracyTier, AuthSnapshot, AuthorizationTier, FixSink, Location, LocationPlatform,
};

/// How a permission dialog resolves
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PromptBehavior {
    /// Dismissed, state unchanged
    Unchanged,
    SetTier(AuthorizationTier),
    SetAccuracy(AccuracyTier),
    /// Never resolves
    Hang,
}

/// How a fix request resolves
#[derive(Debug, Clone, PartialEq)]
pub enum FixBehavior {
    Deliver(Location),
    /// Calls back twice with the same fix
    DeliverTwice(Location),
    Fail(ProviderError),
    /// Holds the sink and never calls back
    Hang,
}

pub struct ScriptedPlatform {
    snapshot: Mutex<AuthSnapshot>,
    when_in_use: PromptBehavior,
    always: PromptBehavior,
    full_accuracy: PromptBehavior,
    fix: Mutex<FixBehavior>,
    held_sinks: Mutex<Vec<FixSink>>,
    prompts: AtomicUsize,
    fix_requests: AtomicUsize,
    duplicates: AtomicUsize,
}

impl ScriptedPlatform {
    pub fn new(snapshot: AuthSnapshot, fix: FixBehavior) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            when_in_use: PromptBehavior::Unchanged,
            always: PromptBehavior::Unchanged,
            full_accuracy: PromptBehavior::Unchanged,
            fix: Mutex::new(fix),
            held_sinks: Mutex::new(Vec::new()),
            prompts: AtomicUsize::new(0),
            fix_requests: AtomicUsize::new(0),
            duplicates: AtomicUsize::new(0),
        }
    }

    /// Always-authorized, full-accuracy platform delivering `location`.
    pub fn granted(location: Location) -> Self {
        Self::new(
            AuthSnapshot::new(AuthorizationTier::Always, AccuracyTier::Full),
            FixBehavior::Deliver(location),
        )
    }

    pub fn on_when_in_use(mut self, behavior: PromptBehavior) -> Self {
        self.when_in_use = behavior;
        self
    }

    pub fn on_always(mut self, behavior: PromptBehavior) -> Self {
        self.always = behavior;
        self
    }

    pub fn on_full_accuracy(mut self, behavior: PromptBehavior) -> Self {
        self.full_accuracy = behavior;
        self
    }

    /// Change what later fix requests return (the user walked somewhere).
    pub fn set_fix(&self, behavior: FixBehavior) {
        if let Ok(mut fix) = self.fix.lock() {
            *fix = behavior;
        }
    }

    pub fn set_authorization(&self, snapshot: AuthSnapshot) {
        if let Ok(mut current) = self.snapshot.lock() {
            *current = snapshot;
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn fix_requests(&self) -> usize {
        self.fix_requests.load(Ordering::SeqCst)
    }

    pub fn duplicate_deliveries(&self) -> usize {
        self.duplicates.load(Ordering::SeqCst)
    }

    async fn resolve(&self, behavior: PromptBehavior) {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        match behavior {
            PromptBehavior::Unchanged => {}
            PromptBehavior::SetTier(tier) => {
                if let Ok(mut snapshot) = self.snapshot.lock() {
                    snapshot.tier = tier;
                }
            }
            PromptBehavior::SetAccuracy(accuracy) => {
                if let Ok(mut snapshot) = self.snapshot.lock() {
                    snapshot.accuracy = accuracy;
                }
            }
            PromptBehavior::Hang => std::future::pending::<()>().await,
        }
    }
}

#[async_trait]
impl LocationPlatform for ScriptedPlatform {
    fn authorization(&self) -> AuthSnapshot {
        match self.snapshot.lock() {
            Ok(snapshot) => *snapshot,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn request_when_in_use(&self) {
        self.resolve(self.when_in_use).await
    }

    async fn request_always(&self) {
        self.resolve(self.always).await
    }

    async fn request_temporary_full_accuracy(&self, _purpose_key: &str) {
        self.resolve(self.full_accuracy).await
    }

    fn request_fix(&self, sink: FixSink) {
        self.fix_requests.fetch_add(1, Ordering::SeqCst);
        let behavior = match self.fix.lock() {
            Ok(fix) => fix.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        match behavior {
            FixBehavior::Deliver(location) => {
                sink.deliver(Ok(location));
            }
            FixBehavior::DeliverTwice(location) => {
                sink.deliver(Ok(location));
                if !sink.deliver(Ok(location)) {
                    self.duplicates.fetch_add(1, Ordering::SeqCst);
                }
            }
            FixBehavior::Fail(error) => {
                sink.deliver(Err(error));
            }
            FixBehavior::Hang => {
                if let Ok(mut held) = self.held_sinks.lock() {
                    held.push(sink);
                }
            }
        }
    }
}
