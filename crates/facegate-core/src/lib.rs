//! facegate-core — face enrollment and authentication engine.
//!
//! SCRFD finds the face and ArcFace embeds it, both through ONNX Runtime
//! on the CPU. Embeddings live in an [`IdentityStore`]; the
//! [`Orchestrator`] runs enroll / authenticate / clear attempts and
//! publishes each [`Outcome`] on an [`EventChannel`].

pub mod detector;
pub mod events;
pub mod extractor;
pub mod matcher;
pub mod orchestrator;
pub mod pipeline;
pub mod recognizer;
pub mod store;
pub mod types;

pub use events::{Action, EventChannel, FailureReason, Outcome, OutcomeObserver};
pub use extractor::{ExtractError, Extractor, RetryPolicy};
pub use matcher::{EuclideanMatcher, MatchError, Matcher, DEFAULT_ACCEPTANCE_THRESHOLD};
pub use orchestrator::{Orchestrator, SessionRules, SessionState, Status};
pub use pipeline::{DescriptorPipeline, DetectionOptions, OnnxPipeline, PipelineError};
pub use store::{AppendReceipt, IdentityStore, JsonFileBackend, MemoryBackend, StoreBackend, StoreError};
pub use types::{BoundingBox, EnrolledIdentity, Embedding, IdentitySummary, MatchResult, Metadata, MetadataValue};
