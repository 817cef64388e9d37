//! Descriptor extraction with a bounded retry policy.

use crate::pipeline::{DescriptorPipeline, DetectionOptions, PipelineError};
use crate::types::Embedding;
use image::RgbImage;
use std::time::Duration;
use thiserror::Error;

/// Pause between a failed attempt and the next one.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face detected after {attempts} attempt(s)")]
    NoFaceDetected { attempts: usize },
    #[error("face models are not loaded")]
    ModelNotReady,
    #[error("descriptor pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("pipeline produced an invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Detection options to try, in order, and the pause between tries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: Vec<DetectionOptions>,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Default options first, then one relaxed retry.
    pub fn two_attempt(relaxed: DetectionOptions, delay: Duration) -> Self {
        Self {
            attempts: vec![DetectionOptions::default(), relaxed],
            delay,
        }
    }

    /// A single attempt with the given options.
    pub fn single(options: DetectionOptions) -> Self {
        Self {
            attempts: vec![options],
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.attempts.len()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::two_attempt(DetectionOptions::RELAXED, DEFAULT_RETRY_DELAY)
    }
}

/// Runs a [`DescriptorPipeline`] under a [`RetryPolicy`].
///
/// Starts "not ready" when models failed to load; [`Extractor::install`]
/// re-initializes it.
pub struct Extractor {
    pipeline: Option<Box<dyn DescriptorPipeline>>,
    policy: RetryPolicy,
}

impl Extractor {
    pub fn new(pipeline: Box<dyn DescriptorPipeline>, policy: RetryPolicy) -> Self {
        Self {
            pipeline: Some(pipeline),
            policy,
        }
    }

    pub fn not_ready(policy: RetryPolicy) -> Self {
        Self { pipeline: None, policy }
    }

    pub fn install(&mut self, pipeline: Box<dyn DescriptorPipeline>) {
        tracing::info!(model_version = pipeline.model_version(), "descriptor pipeline installed");
        self.pipeline = Some(pipeline);
    }

    pub fn is_ready(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn model_version(&self) -> Option<&str> {
        self.pipeline.as_ref().map(|p| p.model_version())
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Extract one embedding, walking the retry policy until a face is found.
    ///
    /// System errors abort immediately; only "no face" moves on to the next
    /// attempt.
    pub async fn extract(&mut self, image: &RgbImage) -> Result<Embedding, ExtractError> {
        let pipeline = self.pipeline.as_mut().ok_or(ExtractError::ModelNotReady)?;
        let attempts = self.policy.attempts.len();

        for (attempt, options) in self.policy.attempts.iter().enumerate() {
            if attempt > 0 && !self.policy.delay.is_zero() {
                tokio::time::sleep(self.policy.delay).await;
            }

            tracing::debug!(
                attempt = attempt + 1,
                of = attempts,
                min_confidence = options.min_confidence,
                enlarge_factor = options.enlarge_factor,
                "extracting descriptor"
            );

            match pipeline.describe(image, options)? {
                Some(embedding) => {
                    validate(&embedding, pipeline.dimension())?;
                    tracing::info!(attempt = attempt + 1, dim = embedding.dimension(), "descriptor extracted");
                    return Ok(embedding);
                }
                None => {
                    tracing::info!(attempt = attempt + 1, of = attempts, "no face detected");
                }
            }
        }

        Err(ExtractError::NoFaceDetected { attempts })
    }
}

fn validate(embedding: &Embedding, expected_dim: usize) -> Result<(), ExtractError> {
    if embedding.dimension() != expected_dim {
        return Err(ExtractError::InvalidDescriptor(format!(
            "expected {expected_dim} values, got {}",
            embedding.dimension()
        )));
    }
    if !embedding.is_finite() {
        return Err(ExtractError::InvalidDescriptor("non-finite values".into()));
    }
    Ok(())
}
