//! Outcome events and the channel that carries them to the application.
//!
//! The orchestrator is a pure emitter: it knows nothing about who listens.
//! Listeners either register an [`OutcomeObserver`] callback or hold a
//! bounded broadcast receiver from [`EventChannel::subscribe`].

use crate::types::Metadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const DEFAULT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Enroll,
    Authenticate,
    Clear,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Enroll => "enroll",
            Action::Authenticate => "authenticate",
            Action::Clear => "clear",
        })
    }
}

/// Why an attempt failed. One per failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Recoverable: capture again.
    NoFaceDetected,
    CaptureFailure,
    /// Models are not loaded; re-initialize first.
    ModelInitializationFailure,
    /// Inference error or malformed descriptor.
    ExtractionFailure,
    /// Authenticate with nothing enrolled.
    EmptyStore,
    LowConfidenceMatch,
    StorageFailure,
    /// Enrollment blocked because an identity already exists.
    AlreadyEnrolled,
    /// Every enrolled embedding comes from another model version.
    ModelVersionMismatch,
}

impl FailureReason {
    /// Whether the applicant can simply try again.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureReason::NoFaceDetected | FailureReason::CaptureFailure | FailureReason::LowConfidenceMatch
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Result of one enroll / authenticate / clear attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub action: Action,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Flow the caller should switch to instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Non-fatal problem, e.g. an identity that was not persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl Outcome {
    pub fn success(action: Action) -> Self {
        Self {
            action,
            success: true,
            metadata: None,
            identity_id: None,
            score: None,
            reason: None,
            redirect: None,
            detail: None,
            warning: None,
        }
    }

    pub fn failure(action: Action, reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason),
            detail: Some(detail.into()),
            ..Self::success(action)
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_identity(mut self, id: impl Into<String>) -> Self {
        self.identity_id = Some(id.into());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_redirect(mut self, action: Action) -> Self {
        self.redirect = Some(action);
        self
    }

    pub fn with_warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(r#"{{"action":"{}","success":{},"detail":"unserializable outcome: {err}"}}"#, self.action, self.success)
        })
    }
}

/// Callback interface for outcome listeners.
pub trait OutcomeObserver: Send + Sync {
    fn on_outcome(&self, outcome: &Outcome);
}

impl<F> OutcomeObserver for F
where
    F: Fn(&Outcome) + Send + Sync,
{
    fn on_outcome(&self, outcome: &Outcome) {
        self(outcome)
    }
}

/// Fan-out of outcomes to registered observers and broadcast subscribers.
#[derive(Clone)]
pub struct EventChannel {
    sender: broadcast::Sender<Outcome>,
    observers: Arc<Mutex<Vec<Arc<dyn OutcomeObserver>>>>,
}

impl EventChannel {
    /// `capacity` bounds how far a slow subscriber may lag before it
    /// starts missing outcomes.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            observers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outcome> {
        self.sender.subscribe()
    }

    pub fn register(&self, observer: impl OutcomeObserver + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(observer));
    }

    /// Observers run without the registry lock held, so they may register
    /// further observers; those see the next outcome onwards.
    pub fn emit(&self, outcome: &Outcome) {
        tracing::debug!(action = %outcome.action, success = outcome.success, "emitting outcome");
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for observer in &observers {
            observer.on_outcome(outcome);
        }
        // No subscribers is fine.
        let _ = self.sender.send(outcome.clone());
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
