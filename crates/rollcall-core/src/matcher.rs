//! Matching a query embedding against the registered faces.
//!
//! Two embeddings match when their Euclidean distance is within the
//! tolerance. When several registered faces match, the first one in
//! insertion order wins, not the closest. Callers that observe names rely on
//! that order, so it is kept as an explicit policy.

use crate::types::{Embedding, MatchResult, PersonRecord};

/// Default maximum distance for two embeddings to be the same person.
///
/// ArcFace embeddings are unit length, so Euclidean distance `d` and cosine
/// similarity `c` are tied by `d = sqrt(2 - 2c)`. This is the distance for a
/// cosine similarity of 0.40.
pub const DEFAULT_TOLERANCE: f32 = 1.095;

/// Euclidean tolerance equivalent to a cosine-similarity threshold on
/// unit-length embeddings.
pub fn tolerance_for_cosine(similarity: f32) -> f32 {
    (2.0 - 2.0 * similarity.clamp(-1.0, 1.0)).sqrt()
}

/// Distance from `query` to every known embedding, in order.
pub fn face_distances(known: &[&Embedding], query: &Embedding) -> Vec<f32> {
    known.iter().map(|k| k.euclidean_distance(query)).collect()
}

/// Whether `query` matches each known embedding, in order.
pub fn compare_faces(known: &[&Embedding], query: &Embedding, tolerance: f32) -> Vec<bool> {
    face_distances(known, query)
        .into_iter()
        .map(|d| d <= tolerance)
        .collect()
}

/// Strategy for resolving a query embedding against a gallery snapshot.
pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &[PersonRecord]) -> MatchResult;
}

/// Euclidean-tolerance matcher with first-by-insertion tie-break.
#[derive(Debug, Clone, Copy)]
pub struct FirstMatch {
    pub tolerance: f32,
}

impl Default for FirstMatch {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl FirstMatch {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }
}

impl Matcher for FirstMatch {
    fn compare(&self, query: &Embedding, gallery: &[PersonRecord]) -> MatchResult {
        let known: Vec<&Embedding> = gallery.iter().map(|r| &r.embedding).collect();
        let distances = face_distances(&known, query);

        // Every entry is evaluated; no early exit on the first hit.
        let first_hit = distances.iter().position(|&d| d <= self.tolerance);
        match first_hit {
            Some(idx) => MatchResult {
                matched: true,
                name: gallery[idx].name.clone(),
                distance: distances[idx],
            },
            None if gallery.is_empty() => MatchResult::unknown(0.0),
            None => {
                let closest = distances.iter().copied().fold(f32::INFINITY, f32::min);
                MatchResult::unknown(closest)
            }
        }
    }
}
