//! Frame type — a decoded RGB still plus capture bookkeeping.

use image::RgbImage;

/// Share of near-black pixels above which a frame counts as dark.
const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// A captured, decoded RGB frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Where the frame came from (file path, "memory", ...).
    pub origin: String,
    pub timestamp: std::time::Instant,
    pub is_dark: bool,
}

impl Frame {
    /// Wrap a decoded image, enforcing the non-empty bitmap precondition.
    pub fn new(image: RgbImage, origin: impl Into<String>) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyImage { width, height });
        }
        let is_dark = is_dark_frame(&image, DARK_FRAME_THRESHOLD);
        Ok(Self {
            image,
            origin: origin.into(),
            timestamp: std::time::Instant::now(),
            is_dark,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average luma (0.0–255.0), Rec. 601 weights.
    pub fn avg_brightness(&self) -> f32 {
        let pixels = self.image.width() as usize * self.image.height() as usize;
        if pixels == 0 {
            return 0.0;
        }
        self.image.pixels().map(|p| luma(p.0)).sum::<f32>() / pixels as f32
    }
}

fn luma([r, g, b]: [u8; 3]) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Returns true if more than `threshold_pct` of pixels have luma below 32.
pub fn is_dark_frame(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = image.width() as usize * image.height() as usize;
    if total == 0 {
        return true;
    }
    let dark = image.pixels().filter(|p| luma(p.0) < 32.0).count();
    (dark as f32 / total as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("image has invalid dimensions {width}x{height}")]
    EmptyImage { width: u32, height: u32 },
}
