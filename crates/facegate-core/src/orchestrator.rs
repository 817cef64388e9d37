//! Enrollment / authentication orchestration.
//!
//! Sequences capture → extraction → (enroll | match) → outcome and turns
//! every attempt into exactly one [`Outcome`] on the [`EventChannel`].
//! Taking `&mut self` serializes attempts: one is in flight at a time.

use crate::events::{Action, EventChannel, FailureReason, Outcome};
use crate::extractor::{ExtractError, Extractor};
use crate::matcher::{EuclideanMatcher, MatchError, Matcher, DEFAULT_ACCEPTANCE_THRESHOLD};
use crate::pipeline::DescriptorPipeline;
use crate::store::{IdentityStore, StoreError};
use crate::types::{keys, Embedding, IdentitySummary, Metadata, MetadataValue};
use chrono::{DateTime, SecondsFormat, Utc};
use facegate_capture::ImageSource;
use serde::Serialize;

/// Where the current attempt is. Resets to `Idle` after each outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Capturing,
    Extracting,
    Enrolling,
    Matching,
    Success,
    Failure,
}

/// Session-level rules layered over the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRules {
    /// Minimum score for an authentication to be accepted.
    pub acceptance_threshold: f32,
    /// Reject enrollment once any identity exists and point the caller at
    /// authentication instead.
    pub single_identity: bool,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            acceptance_threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
            single_identity: true,
        }
    }
}

/// Snapshot reported by [`Orchestrator::status`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub state: SessionState,
    pub identities: usize,
    pub model_ready: bool,
    pub model_version: Option<String>,
    pub acceptance_threshold: f32,
    pub single_identity: bool,
    pub max_attempts: usize,
    pub store: String,
}

pub struct Orchestrator {
    store: IdentityStore,
    extractor: Extractor,
    matcher: Box<dyn Matcher + Send + Sync>,
    events: EventChannel,
    rules: SessionRules,
    state: SessionState,
}

impl Orchestrator {
    pub fn new(store: IdentityStore, extractor: Extractor, events: EventChannel) -> Self {
        Self {
            store,
            extractor,
            matcher: Box::new(EuclideanMatcher),
            events,
            rules: SessionRules::default(),
            state: SessionState::Idle,
        }
    }

    pub fn with_rules(mut self, rules: SessionRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_matcher(mut self, matcher: Box<dyn Matcher + Send + Sync>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn rules(&self) -> &SessionRules {
        &self.rules
    }

    pub fn summaries(&self) -> Vec<IdentitySummary> {
        self.store.summaries()
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.state,
            identities: self.store.count(),
            model_ready: self.extractor.is_ready(),
            model_version: self.extractor.model_version().map(str::to_string),
            acceptance_threshold: self.rules.acceptance_threshold,
            single_identity: self.rules.single_identity,
            max_attempts: self.extractor.policy().max_attempts(),
            store: self.store.backend_description(),
        }
    }

    /// Swap in a freshly loaded pipeline after a model initialization failure.
    pub fn reinitialize(&mut self, pipeline: Box<dyn DescriptorPipeline>) {
        self.extractor.install(pipeline);
    }

    /// Capture a face and enroll it under a new identity.
    ///
    /// `supplied` carries applicant identifiers when the application has
    /// them; missing ones are generated.
    pub async fn enroll(&mut self, source: &mut dyn ImageSource, supplied: Metadata) -> Outcome {
        if self.rules.single_identity && self.store.count() > 0 {
            let outcome = Outcome::failure(
                Action::Enroll,
                FailureReason::AlreadyEnrolled,
                "a face is already enrolled; authenticate instead",
            )
            .with_redirect(Action::Authenticate);
            return self.finish(outcome);
        }

        let embedding = match self.capture_and_extract(Action::Enroll, source).await {
            Ok(embedding) => embedding,
            Err(outcome) => return self.finish(outcome),
        };

        self.transition(SessionState::Enrolling);
        let metadata = complete_metadata(supplied, Utc::now());
        let outcome = match self.store.append(embedding, metadata.clone()) {
            Ok(receipt) => Outcome::success(Action::Enroll)
                .with_identity(receipt.id)
                .with_metadata(metadata)
                .with_warning(receipt.warning),
            Err(err) => Outcome::failure(Action::Enroll, store_reason(&err), err.to_string()),
        };
        self.finish(outcome)
    }

    /// Capture a face and match it against every enrolled identity.
    pub async fn authenticate(&mut self, source: &mut dyn ImageSource) -> Outcome {
        if self.store.count() == 0 {
            let outcome = Outcome::failure(
                Action::Authenticate,
                FailureReason::EmptyStore,
                "no face enrolled yet; enroll first",
            )
            .with_redirect(Action::Enroll);
            return self.finish(outcome);
        }

        let probe = match self.capture_and_extract(Action::Authenticate, source).await {
            Ok(embedding) => embedding,
            Err(outcome) => return self.finish(outcome),
        };

        self.transition(SessionState::Matching);
        let threshold = self.rules.acceptance_threshold;
        let outcome = match self.matcher.find_best_match(&probe, self.store.list_all(), threshold) {
            Ok(result) if result.accepted => Outcome::success(Action::Authenticate)
                .with_identity(result.id)
                .with_score(result.score)
                .with_metadata(result.metadata),
            Ok(result) => Outcome::failure(
                Action::Authenticate,
                FailureReason::LowConfidenceMatch,
                format!("best match scored {:.3}, below threshold {threshold:.3}", result.score),
            )
            .with_score(result.score),
            Err(err @ MatchError::NoCandidates) => {
                Outcome::failure(Action::Authenticate, FailureReason::EmptyStore, err.to_string())
            }
            Err(err @ MatchError::NoComparableCandidates { .. }) => {
                Outcome::failure(Action::Authenticate, FailureReason::ModelVersionMismatch, err.to_string())
            }
        };
        self.finish(outcome)
    }

    /// Irreversibly drop every enrolled identity.
    pub fn clear(&mut self) -> Outcome {
        let outcome = match self.store.clear_all() {
            Ok(()) => Outcome::success(Action::Clear),
            Err(err) => Outcome::failure(
                Action::Clear,
                FailureReason::StorageFailure,
                format!("cleared in memory, but the stored copy remains: {err}"),
            ),
        };
        self.finish(outcome)
    }

    async fn capture_and_extract(
        &mut self,
        action: Action,
        source: &mut dyn ImageSource,
    ) -> Result<Embedding, Outcome> {
        self.transition(SessionState::Capturing);
        tracing::debug!(action = %action, source = %source.describe(), "capturing");
        let frame = source
            .capture()
            .map_err(|err| Outcome::failure(action, FailureReason::CaptureFailure, err.to_string()))?;

        self.transition(SessionState::Extracting);
        self.extractor
            .extract(&frame.image)
            .await
            .map_err(|err| Outcome::failure(action, extract_reason(&err), err.to_string()))
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    fn finish(&mut self, outcome: Outcome) -> Outcome {
        self.transition(if outcome.success {
            SessionState::Success
        } else {
            SessionState::Failure
        });

        if outcome.success {
            tracing::info!(
                action = %outcome.action,
                identity = outcome.identity_id.as_deref().unwrap_or("-"),
                score = ?outcome.score,
                "attempt succeeded"
            );
        } else {
            tracing::warn!(
                action = %outcome.action,
                reason = ?outcome.reason,
                score = ?outcome.score,
                detail = outcome.detail.as_deref().unwrap_or(""),
                "attempt failed"
            );
        }
        if let Some(warning) = &outcome.warning {
            tracing::warn!(action = %outcome.action, warning = %warning, "attempt completed with warning");
        }

        self.events.emit(&outcome);
        self.transition(SessionState::Idle);
        outcome
    }
}

/// Fill in the applicant identifiers the application did not supply.
///
/// `applicantId` / `loanApplicationId` are generated when missing or blank,
/// `applicationStep` defaults to `"initial"`, `timestamp` is always the
/// enrollment time.
pub fn complete_metadata(mut metadata: Metadata, now: DateTime<Utc>) -> Metadata {
    let millis = now.timestamp_millis();
    for (key, prefix) in [(keys::APPLICANT_ID, "applicant"), (keys::LOAN_APPLICATION_ID, "loan")] {
        if metadata.get(key).map_or(true, MetadataValue::is_blank) {
            metadata.insert(key.to_string(), MetadataValue::from(format!("{prefix}-{millis}-{}", short_token())));
        }
    }
    metadata
        .entry(keys::APPLICATION_STEP.to_string())
        .or_insert_with(|| MetadataValue::from("initial"));
    metadata.insert(
        keys::TIMESTAMP.to_string(),
        MetadataValue::from(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    metadata
}

fn short_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn extract_reason(err: &ExtractError) -> FailureReason {
    match err {
        ExtractError::NoFaceDetected { .. } => FailureReason::NoFaceDetected,
        ExtractError::ModelNotReady => FailureReason::ModelInitializationFailure,
        ExtractError::Pipeline(e) if e.is_model_missing() => FailureReason::ModelInitializationFailure,
        ExtractError::Pipeline(_) | ExtractError::InvalidDescriptor(_) => FailureReason::ExtractionFailure,
    }
}

fn store_reason(err: &StoreError) -> FailureReason {
    match err {
        StoreError::DimensionMismatch { .. } => FailureReason::ModelVersionMismatch,
        StoreError::InvalidEmbedding => FailureReason::ExtractionFailure,
        StoreError::Io { .. } | StoreError::Corrupt { .. } | StoreError::Serialize(_) => FailureReason::StorageFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::testing::{fast_policy, ScriptedPipeline, Step};
    use crate::store::{JsonFileBackend, StoreBackend};
    use crate::types::EnrolledIdentity;
    use facegate_capture::MemorySource;
    use image::{Rgb, RgbImage};
    use std::sync::{Arc, Mutex};

    fn camera() -> MemorySource {
        MemorySource::new(RgbImage::from_pixel(16, 16, Rgb([120, 110, 100])))
    }

    fn orchestrator(steps: Vec<Step>) -> Orchestrator {
        let extractor = crate::extractor::Extractor::new(Box::new(ScriptedPipeline::new(2, steps)), fast_policy());
        Orchestrator::new(IdentityStore::in_memory(), extractor, EventChannel::default())
    }

    fn applicant(id: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert(keys::APPLICANT_ID.into(), MetadataValue::from(id));
        m
    }

    fn record_outcomes(orch: &Orchestrator) -> Arc<Mutex<Vec<Outcome>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        orch.events().register(move |o: &Outcome| sink.lock().unwrap().push(o.clone()));
        seen
    }

    #[tokio::test]
    async fn test_enroll_then_authenticate_same_face() {
        let e1 = vec![0.6, 0.8];
        let mut orch = orchestrator(vec![Step::Face(e1.clone()), Step::Face(e1)]);
        let seen = record_outcomes(&orch);

        let enrolled = orch.enroll(&mut camera(), applicant("A1")).await;
        assert!(enrolled.success, "{enrolled:?}");
        assert_eq!(orch.store().count(), 1);

        let auth = orch.authenticate(&mut camera()).await;
        assert!(auth.success, "{auth:?}");
        assert_eq!(auth.score, Some(1.0));
        assert_eq!(auth.identity_id, enrolled.identity_id);
        assert_eq!(auth.metadata.unwrap()[keys::APPLICANT_ID].as_str(), Some("A1"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!((seen[0].action, seen[0].success), (Action::Enroll, true));
        assert_eq!((seen[1].action, seen[1].success), (Action::Authenticate, true));
        assert_eq!(orch.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_authenticate_dissimilar_face_is_low_confidence() {
        let mut orch = orchestrator(vec![Step::Face(vec![0.0, 0.0]), Step::Face(vec![1.4, 0.0])]);
        orch.enroll(&mut camera(), applicant("A1")).await;

        let auth = orch.authenticate(&mut camera()).await;
        assert!(!auth.success);
        assert_eq!(auth.score, Some(0.0));
        assert_eq!(auth.reason, Some(FailureReason::LowConfidenceMatch));
        assert!(auth.metadata.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_empty_store_never_captures() {
        let pipeline = ScriptedPipeline::new(2, [Step::Face(vec![1.0, 0.0])]);
        let calls = pipeline.seen.clone();
        let extractor = crate::extractor::Extractor::new(Box::new(pipeline), fast_policy());
        let mut orch = Orchestrator::new(IdentityStore::in_memory(), extractor, EventChannel::default());
        let seen = record_outcomes(&orch);

        let auth = orch.authenticate(&mut camera()).await;
        assert!(!auth.success);
        assert_eq!(auth.reason, Some(FailureReason::EmptyStore));
        assert_eq!(auth.redirect, Some(Action::Enroll));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reenrollment_redirects_to_authenticate() {
        let mut orch = orchestrator(vec![Step::Face(vec![1.0, 0.0]), Step::Face(vec![0.0, 1.0])]);
        orch.enroll(&mut camera(), applicant("A1")).await;
        assert_eq!(orch.store().count(), 1);

        let second = orch.enroll(&mut camera(), applicant("A2")).await;
        assert!(!second.success);
        assert_eq!(second.reason, Some(FailureReason::AlreadyEnrolled));
        assert_eq!(second.redirect, Some(Action::Authenticate));
        assert_eq!(orch.store().count(), 1);
    }

    #[tokio::test]
    async fn test_enroll_clear_enroll_without_single_identity_rule() {
        let mut orch = orchestrator(vec![
            Step::Face(vec![1.0, 0.0]),
            Step::Face(vec![0.0, 1.0]),
            Step::Face(vec![0.5, 0.5]),
        ])
        .with_rules(SessionRules {
            single_identity: false,
            ..SessionRules::default()
        });
        let seen = record_outcomes(&orch);

        let first = orch.enroll(&mut camera(), Metadata::new()).await.identity_id.unwrap();
        let second = orch.enroll(&mut camera(), Metadata::new()).await.identity_id.unwrap();
        assert_ne!(first, second);
        assert_eq!(orch.store().count(), 2);

        let cleared = orch.clear();
        assert!(cleared.success);
        assert_eq!(orch.store().count(), 0);

        let third = orch.enroll(&mut camera(), Metadata::new()).await.identity_id.unwrap();
        let ids: Vec<&str> = orch.store().list_all().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![third.as_str()]);
        assert!(!ids.contains(&first.as_str()) && !ids.contains(&second.as_str()));

        let actions: Vec<Action> = seen.lock().unwrap().iter().map(|o| o.action).collect();
        assert_eq!(actions, vec![Action::Enroll, Action::Enroll, Action::Clear, Action::Enroll]);
    }

    #[tokio::test]
    async fn test_enroll_no_face_after_retry() {
        let pipeline = ScriptedPipeline::new(2, [Step::NoFace, Step::NoFace]);
        let calls = pipeline.seen.clone();
        let extractor = crate::extractor::Extractor::new(Box::new(pipeline), fast_policy());
        let mut orch = Orchestrator::new(IdentityStore::in_memory(), extractor, EventChannel::default());

        let outcome = orch.enroll(&mut camera(), Metadata::new()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.reason, Some(FailureReason::NoFaceDetected));
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(orch.store().count(), 0);
    }

    #[tokio::test]
    async fn test_enroll_system_error_is_distinct_from_no_face() {
        let mut orch = orchestrator(vec![Step::Fail]);
        let outcome = orch.enroll(&mut camera(), Metadata::new()).await;
        assert_eq!(outcome.reason, Some(FailureReason::ExtractionFailure));
    }

    #[tokio::test]
    async fn test_models_not_loaded_then_reinitialized() {
        let extractor = crate::extractor::Extractor::not_ready(fast_policy());
        let mut orch = Orchestrator::new(IdentityStore::in_memory(), extractor, EventChannel::default());
        assert!(!orch.status().model_ready);

        let outcome = orch.enroll(&mut camera(), Metadata::new()).await;
        assert_eq!(outcome.reason, Some(FailureReason::ModelInitializationFailure));

        orch.reinitialize(Box::new(ScriptedPipeline::new(2, [Step::Face(vec![1.0, 0.0])])));
        assert!(orch.status().model_ready);
        assert!(orch.enroll(&mut camera(), Metadata::new()).await.success);
    }

    #[tokio::test]
    async fn test_capture_failure() {
        let mut orch = orchestrator(vec![Step::Face(vec![1.0, 0.0])]);
        let mut blank = MemorySource::new(RgbImage::new(0, 0));
        let outcome = orch.enroll(&mut blank, Metadata::new()).await;
        assert_eq!(outcome.reason, Some(FailureReason::CaptureFailure));
        assert_eq!(orch.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_enroll_survives_storage_failure_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the store directory should be makes every write fail.
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let path = blocker.join("identities.json");
        let store = IdentityStore::open(Box::new(JsonFileBackend::new(&path))).unwrap();
        let extractor = crate::extractor::Extractor::new(
            Box::new(ScriptedPipeline::new(2, [Step::Face(vec![1.0, 0.0])])),
            fast_policy(),
        );
        let mut orch = Orchestrator::new(store, extractor, EventChannel::default());

        let outcome = orch.enroll(&mut camera(), applicant("A1")).await;
        assert!(outcome.success);
        assert!(outcome.warning.is_some());
        assert_eq!(orch.store().count(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_other_model_version() {
        struct Seeded(Vec<EnrolledIdentity>);
        impl StoreBackend for Seeded {
            fn load(&self) -> Result<Vec<EnrolledIdentity>, StoreError> {
                Ok(self.0.clone())
            }
            fn save(&self, _: &[EnrolledIdentity]) -> Result<(), StoreError> {
                Ok(())
            }
            fn clear(&self) -> Result<(), StoreError> {
                Ok(())
            }
            fn describe(&self) -> String {
                "seeded".into()
            }
        }

        let legacy = EnrolledIdentity {
            id: "face-1-legacy0".into(),
            embedding: Embedding::new(vec![1.0, 0.0], Some("old-model".into())),
            metadata: applicant("A0"),
            created_at: Utc::now(),
        };
        let store = IdentityStore::open(Box::new(Seeded(vec![legacy]))).unwrap();
        let extractor = crate::extractor::Extractor::new(
            Box::new(ScriptedPipeline::new(2, [Step::Face(vec![1.0, 0.0])])),
            fast_policy(),
        );
        let mut orch = Orchestrator::new(store, extractor, EventChannel::default());

        let outcome = orch.authenticate(&mut camera()).await;
        assert_eq!(outcome.reason, Some(FailureReason::ModelVersionMismatch));
        assert!(outcome.score.is_none());
    }

    #[tokio::test]
    async fn test_custom_threshold_applies() {
        let mut orch = orchestrator(vec![Step::Face(vec![0.0, 0.0]), Step::Face(vec![0.3, 0.4])])
            .with_rules(SessionRules {
                acceptance_threshold: 0.6,
                single_identity: true,
            });
        orch.enroll(&mut camera(), applicant("A1")).await;
        // distance 0.5 → score 0.5 < 0.6
        let outcome = orch.authenticate(&mut camera()).await;
        assert_eq!(outcome.reason, Some(FailureReason::LowConfidenceMatch));
    }

    #[test]
    fn test_complete_metadata_generates_missing_ids() {
        let now = Utc::now();
        let meta = complete_metadata(Metadata::new(), now);
        let applicant = meta[keys::APPLICANT_ID].as_str().unwrap();
        let loan = meta[keys::LOAN_APPLICATION_ID].as_str().unwrap();
        assert!(applicant.starts_with(&format!("applicant-{}-", now.timestamp_millis())));
        assert!(loan.starts_with("loan-"));
        assert_eq!(meta[keys::APPLICATION_STEP].as_str(), Some("initial"));
        assert!(meta[keys::TIMESTAMP].as_str().unwrap().ends_with('Z'));

        let again = complete_metadata(Metadata::new(), now);
        assert_ne!(again[keys::APPLICANT_ID], meta[keys::APPLICANT_ID]);
    }

    #[test]
    fn test_complete_metadata_keeps_supplied_values() {
        let mut supplied = applicant("A1");
        supplied.insert(keys::LOAN_APPLICATION_ID.into(), MetadataValue::from("  "));
        supplied.insert(keys::APPLICATION_STEP.into(), MetadataValue::from("financials"));
        supplied.insert("age".into(), MetadataValue::from(41i64));

        let meta = complete_metadata(supplied, Utc::now());
        assert_eq!(meta[keys::APPLICANT_ID].as_str(), Some("A1"));
        assert!(meta[keys::LOAN_APPLICATION_ID].as_str().unwrap().starts_with("loan-"));
        assert_eq!(meta[keys::APPLICATION_STEP].as_str(), Some("financials"));
        assert_eq!(meta["age"], MetadataValue::from(41i64));
    }

    #[test]
    fn test_clear_reports_success_on_empty_store() {
        let mut orch = orchestrator(vec![]);
        let outcome = orch.clear();
        assert!(outcome.success);
        assert_eq!(outcome.action, Action::Clear);
    }

    #[tokio::test]
    async fn test_clear_with_failing_backend_is_storage_failure() {
        struct Undeletable;
        impl StoreBackend for Undeletable {
            fn load(&self) -> Result<Vec<EnrolledIdentity>, StoreError> {
                Ok(Vec::new())
            }
            fn save(&self, _: &[EnrolledIdentity]) -> Result<(), StoreError> {
                Ok(())
            }
            fn clear(&self) -> Result<(), StoreError> {
                Err(StoreError::Io {
                    path: "/locked/identities.json".into(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                })
            }
            fn describe(&self) -> String {
                "undeletable".into()
            }
        }

        let store = IdentityStore::open(Box::new(Undeletable)).unwrap();
        let extractor = crate::extractor::Extractor::new(
            Box::new(ScriptedPipeline::new(2, [Step::Face(vec![1.0, 0.0])])),
            fast_policy(),
        );
        let mut orch = Orchestrator::new(store, extractor, EventChannel::default());
        let seen = record_outcomes(&orch);
        assert!(orch.enroll(&mut camera(), applicant("A1")).await.success);

        let outcome = orch.clear();
        assert!(!outcome.success);
        assert_eq!(outcome.action, Action::Clear);
        assert_eq!(outcome.reason, Some(FailureReason::StorageFailure));
        assert!(outcome.detail.unwrap().contains("stored copy remains"));
        assert_eq!(orch.store().count(), 0);
        assert_eq!(orch.state(), SessionState::Idle);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_status_reports_rules() {
        let orch = orchestrator(vec![]);
        let status = orch.status();
        assert_eq!(status.state, SessionState::Idle);
        assert_eq!(status.identities, 0);
        assert!(status.model_ready);
        assert_eq!(status.model_version.as_deref(), Some("scripted-v1"));
        assert_eq!(status.acceptance_threshold, DEFAULT_ACCEPTANCE_THRESHOLD);
        assert_eq!(status.max_attempts, 2);
        assert_eq!(status.store, "memory");
    }
}
