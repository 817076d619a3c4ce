//! Embedding extraction: frame in, one embedding per detected face out.

use crate::detector::{DetectorError, FaceDetector};
use crate::frame::Frame;
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_EMBEDDING_DIM};
use crate::types::{BoundingBox, DetectedFace, Embedding};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("analysis failed: {0}")]
    Other(String),
}

/// Strategy for finding faces in a frame and embedding them.
///
/// Implementations must be deterministic for a given frame and report faces
/// in a stable order (the ONNX pipeline uses descending detector confidence).
pub trait FaceAnalyzer: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, AnalyzerError>;

    fn embed(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, AnalyzerError>;

    /// Length of the embeddings this analyzer produces.
    fn embedding_dim(&self) -> usize;

    /// Detect every face and embed each one independently.
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let boxes = self.detect(frame)?;
        tracing::trace!(faces = boxes.len(), "detected faces");
        boxes
            .into_iter()
            .map(|bbox| {
                let embedding = self.embed(frame, &bbox)?;
                Ok(DetectedFace { bbox, embedding })
            })
            .collect()
    }
}

/// SCRFD detection followed by ArcFace embedding.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxAnalyzer {
    /// Load both models; fails fast if either file is missing.
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, AnalyzerError> {
        Ok(self.detector.detect(frame)?)
    }

    fn embed(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, AnalyzerError> {
        Ok(self.recognizer.extract(frame, face)?)
    }

    fn embedding_dim(&self) -> usize {
        ARCFACE_EMBEDDING_DIM
    }
}
