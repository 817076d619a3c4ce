use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name reported for a face that matched nobody in the store.
pub const UNKNOWN_NAME: &str = "Unknown";

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

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Embeddings of different length are never comparable and yield `f32::INFINITY`.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A face found in a frame: where it is and who it looks like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// A registered person in the face store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRecord {
    /// Unique within the store; equals the image filename minus extension.
    pub name: String,
    pub embedding: Embedding,
    pub source_path: PathBuf,
}

/// Result of matching a query embedding against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Name of the matched person, or [`UNKNOWN_NAME`].
    pub name: String,
    /// Euclidean distance to the chosen record, or the closest one when unmatched.
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            matched: false,
            name: UNKNOWN_NAME.to_string(),
            distance,
        }
    }
}

/// One overlay entry handed back to the UI: a face box and who it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recognition {
    pub bbox: BoundingBox,
    #[serde(flatten)]
    pub result: MatchResult,
}
