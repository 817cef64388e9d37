use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Grow the box by `factor` of its size (half on each side), clamped to the image.
    ///
    /// Returns integer crop coordinates `(x, y, width, height)`, never empty.
    pub fn enlarged_crop(&self, factor: f32, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let factor = factor.max(0.0);
        let grow_x = self.width * factor / 2.0;
        let grow_y = self.height * factor / 2.0;

        let max_x = image_width.saturating_sub(1) as f32;
        let max_y = image_height.saturating_sub(1) as f32;
        let x0 = (self.x - grow_x).clamp(0.0, max_x);
        let y0 = (self.y - grow_y).clamp(0.0, max_y);
        let x1 = (self.x + self.width + grow_x).clamp(0.0, image_width as f32);
        let y1 = (self.y + self.height + grow_y).clamp(0.0, image_height as f32);

        let x = x0.floor() as u32;
        let y = y0.floor() as u32;
        let w = ((x1.ceil() as u32).saturating_sub(x)).max(1);
        let h = ((y1.ceil() as u32).saturating_sub(y)).max(1);
        (x, y, w.min(image_width - x), h.min(image_height - y))
    }
}

/// Face embedding vector (512-dimensional for the bundled ArcFace model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>, model_version: Option<String>) -> Self {
        Self { values, model_version }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Two embeddings are comparable only if they come from the same model
    /// version and have the same dimension.
    pub fn is_comparable(&self, other: &Embedding) -> bool {
        self.values.len() == other.values.len() && self.model_version == other.model_version
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A metadata value: JSON string or JSON number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Number(serde_json::Number),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            MetadataValue::Number(_) => None,
        }
    }

    /// Empty strings count as absent when defaults are synthesized.
    pub fn is_blank(&self) -> bool {
        matches!(self, MetadataValue::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value.into())
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        MetadataValue::Number(value.into())
    }
}

/// Applicant metadata attached to an identity. Sorted keys keep
/// serialization deterministic.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Well-known metadata keys.
pub mod keys {
    pub const APPLICANT_ID: &str = "applicantId";
    pub const LOAN_APPLICATION_ID: &str = "loanApplicationId";
    pub const APPLICATION_STEP: &str = "applicationStep";
    pub const EMAIL: &str = "email";
    pub const TIMESTAMP: &str = "timestamp";
}

/// An enrolled face with its applicant metadata. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrolledIdentity {
    pub id: String,
    pub embedding: Embedding,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// Listing view of an identity, without the embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    pub id: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl From<&EnrolledIdentity> for IdentitySummary {
    fn from(identity: &EnrolledIdentity) -> Self {
        Self {
            id: identity.id.clone(),
            metadata: identity.metadata.clone(),
            created_at: identity.created_at,
            model_version: identity.embedding.model_version.clone(),
        }
    }
}

/// Best candidate for a probe, with the acceptance decision applied.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub id: String,
    /// Similarity in [0, 1].
    pub score: f32,
    pub metadata: Metadata,
    pub accepted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Embedding::new(vec![0.0, 0.0], None);
        let b = Embedding::new(vec![3.0, 4.0], None);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_comparable_requires_same_version() {
        let a = Embedding::new(vec![1.0, 0.0], Some("w600k_r50".into()));
        let b = Embedding::new(vec![1.0, 0.0], Some("w600k_r100".into()));
        let c = Embedding::new(vec![1.0, 0.0], Some("w600k_r50".into()));
        assert!(!a.is_comparable(&b));
        assert!(a.is_comparable(&c));
    }

    #[test]
    fn test_comparable_requires_same_dimension() {
        let a = Embedding::new(vec![1.0, 0.0], None);
        let b = Embedding::new(vec![1.0, 0.0, 0.0], None);
        assert!(!a.is_comparable(&b));
    }

    #[test]
    fn test_is_finite() {
        assert!(Embedding::new(vec![0.5, -0.5], None).is_finite());
        assert!(!Embedding::new(vec![f32::NAN, 0.0], None).is_finite());
        assert!(!Embedding::new(vec![f32::INFINITY], None).is_finite());
    }

    #[test]
    fn test_enlarged_crop_no_factor() {
        let crop = bbox(10.0, 20.0, 30.0, 40.0).enlarged_crop(0.0, 100, 100);
        assert_eq!(crop, (10, 20, 30, 40));
    }

    #[test]
    fn test_enlarged_crop_grows_symmetrically() {
        // 0.2 of 30x40 → +3 / +4 each side
        let crop = bbox(10.0, 20.0, 30.0, 40.0).enlarged_crop(0.2, 100, 100);
        assert_eq!(crop, (7, 16, 36, 48));
    }

    #[test]
    fn test_enlarged_crop_clamps_to_image() {
        let (x, y, w, h) = bbox(-5.0, 90.0, 50.0, 30.0).enlarged_crop(0.5, 100, 100);
        assert_eq!((x, y), (0, 82));
        assert!(x + w <= 100);
        assert!(y + h <= 100);
    }

    #[test]
    fn test_metadata_value_serde_keeps_numbers() {
        let mut meta = Metadata::new();
        meta.insert("applicantId".into(), "A1".into());
        meta.insert("step".into(), 3i64.into());
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"applicantId":"A1","step":3}"#);
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_metadata_value_blank() {
        assert!(MetadataValue::from("  ").is_blank());
        assert!(!MetadataValue::from("x").is_blank());
        assert!(!MetadataValue::from(0i64).is_blank());
    }
}
