//! Image sources — where a captured still comes from.

use crate::frame::{Frame, FrameError};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("image not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to decode image from {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    InvalidFrame(#[from] FrameError),
}

/// Supplies one decoded bitmap per request.
pub trait ImageSource: Send {
    fn capture(&mut self) -> Result<Frame, CaptureError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Reads and decodes an image file (JPEG, PNG, ...) on every capture.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        if !self.path.exists() {
            return Err(CaptureError::NotFound(self.path.clone()));
        }
        let origin = self.path.display().to_string();
        let decoded = image::open(&self.path).map_err(|source| CaptureError::Decode {
            origin: origin.clone(),
            source,
        })?;
        let frame = Frame::new(decoded.to_rgb8(), origin)?;
        log_frame(&frame);
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Hands out an already captured image (e.g. pushed by a front-end).
#[derive(Clone)]
pub struct MemorySource {
    image: RgbImage,
}

impl MemorySource {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Decode an encoded image buffer up front.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CaptureError> {
        let decoded = image::load_from_memory(bytes).map_err(|source| CaptureError::Decode {
            origin: "memory".into(),
            source,
        })?;
        Ok(Self::new(decoded.to_rgb8()))
    }
}

impl ImageSource for MemorySource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let frame = Frame::new(self.image.clone(), "memory")?;
        log_frame(&frame);
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("memory:{}x{}", self.image.width(), self.image.height())
    }
}

fn log_frame(frame: &Frame) {
    tracing::debug!(
        origin = %frame.origin,
        width = frame.width(),
        height = frame.height(),
        brightness = frame.avg_brightness(),
        "captured frame"
    );
    if frame.is_dark {
        tracing::warn!(origin = %frame.origin, "captured frame is very dark; detection will likely fail");
    }
}
