//! Similarity scoring and best-candidate selection.

use crate::types::{Embedding, EnrolledIdentity, MatchResult};
use thiserror::Error;

/// The single acceptance threshold for a positive match.
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f32 = 0.35;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("no enrolled candidates to compare against")]
    NoCandidates,
    #[error("none of the {skipped} enrolled candidates was produced by the probe's model version")]
    NoComparableCandidates { skipped: usize },
}

/// Similarity in [0, 1]: `max(0, 1 - euclidean_distance)`.
///
/// Embeddings from different model versions or dimensions score 0.
pub fn score(a: &Embedding, b: &Embedding) -> f32 {
    if !a.is_comparable(b) {
        return 0.0;
    }
    let s = 1.0 - a.euclidean_distance(b);
    if s.is_finite() {
        s.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Strategy for comparing a probe embedding against the enrolled identities.
pub trait Matcher {
    fn find_best_match(
        &self,
        probe: &Embedding,
        candidates: &[EnrolledIdentity],
        threshold: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Euclidean-distance matcher with full gallery traversal.
///
/// Always iterates every candidate (no early exit). Ties go to the earliest
/// enrolled candidate.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn find_best_match(
        &self,
        probe: &Embedding,
        candidates: &[EnrolledIdentity],
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        if candidates.is_empty() {
            return Err(MatchError::NoCandidates);
        }

        let mut best_score = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;
        let mut skipped = 0usize;

        for (i, candidate) in candidates.iter().enumerate() {
            if !probe.is_comparable(&candidate.embedding) {
                skipped += 1;
                continue;
            }
            let s = score(probe, &candidate.embedding);
            if s > best_score {
                best_score = s;
                best_idx = Some(i);
            }
        }

        if skipped > 0 {
            tracing::warn!(
                skipped,
                probe_version = ?probe.model_version,
                "skipped enrolled embeddings from a different model"
            );
        }

        let idx = best_idx.ok_or(MatchError::NoComparableCandidates { skipped })?;
        let best = &candidates[idx];
        Ok(MatchResult {
            id: best.id.clone(),
            score: best_score,
            metadata: best.metadata.clone(),
            accepted: best_score >= threshold,
        })
    }
}
