//! Descriptor pipeline: face detection and embedding as one step.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_EMBEDDING_DIM, ARCFACE_MODEL_VERSION};
use crate::types::Embedding;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

impl PipelineError {
    /// True when the error comes from loading a model rather than running it.
    pub fn is_model_missing(&self) -> bool {
        matches!(
            self,
            PipelineError::Detector(DetectorError::ModelNotFound(_))
                | PipelineError::Recognizer(RecognizerError::ModelNotFound(_))
        )
    }
}

/// Per-attempt detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionOptions {
    /// Minimum detector confidence for a face to count.
    pub min_confidence: f32,
    /// Fraction by which the face box grows before embedding.
    pub enlarge_factor: f32,
}

impl DetectionOptions {
    /// Lowered confidence and a wider crop, for a second attempt.
    pub const RELAXED: DetectionOptions = DetectionOptions {
        min_confidence: 0.4,
        enlarge_factor: 0.2,
    };
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            enlarge_factor: 0.0,
        }
    }
}

/// Turns one decoded image into at most one face embedding.
///
/// `Ok(None)` means no face cleared the options; `Err` is a system failure.
pub trait DescriptorPipeline: Send {
    fn describe(
        &mut self,
        image: &RgbImage,
        options: &DetectionOptions,
    ) -> Result<Option<Embedding>, PipelineError>;

    fn model_version(&self) -> &str;

    /// Length of every embedding this pipeline produces.
    fn dimension(&self) -> usize;
}

/// SCRFD detection followed by ArcFace embedding of the most confident face.
pub struct OnnxPipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxPipeline {
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self { detector, recognizer })
    }

    /// Load both models from their standard file names in `model_dir`.
    pub fn load_from_dir(model_dir: &Path) -> Result<Self, PipelineError> {
        let scrfd = model_dir.join(SCRFD_MODEL_FILE);
        let arcface = model_dir.join(ARCFACE_MODEL_FILE);
        Self::load(&scrfd.to_string_lossy(), &arcface.to_string_lossy())
    }
}

impl DescriptorPipeline for OnnxPipeline {
    fn describe(
        &mut self,
        image: &RgbImage,
        options: &DetectionOptions,
    ) -> Result<Option<Embedding>, PipelineError> {
        let faces = self.detector.detect(image, options.min_confidence)?;
        let Some(face) = faces.first() else {
            return Ok(None);
        };
        tracing::debug!(
            confidence = face.confidence,
            x = face.x,
            y = face.y,
            width = face.width,
            height = face.height,
            "face detected"
        );
        let embedding = self.recognizer.extract(image, face, options.enlarge_factor)?;
        Ok(Some(embedding))
    }

    fn model_version(&self) -> &str {
        ARCFACE_MODEL_VERSION
    }

    fn dimension(&self) -> usize {
        ARCFACE_EMBEDDING_DIM
    }
}

/// `$XDG_DATA_HOME/facegate/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    data_dir().join("models")
}

/// `$XDG_DATA_HOME/facegate`, falling back to `~/.local/share/facegate`.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
}
