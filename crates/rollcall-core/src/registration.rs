//! Registration workflow: one captured frame becomes one stored person.
//!
//! `Idle → FrameCaptured → Validated → Extracted → Stored`. Every failure is
//! reported with the stage that was reached, and none of them leave a
//! half-registered person behind.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::frame::Frame;
use crate::store::{validate_name, FaceStore, StoreError};
use crate::types::{BoundingBox, PersonRecord};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStage {
    Idle,
    FrameCaptured,
    Validated,
    Extracted,
    Stored,
}

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("{0}")]
    InvalidName(String),
    #[error("name already registered: {0}")]
    DuplicateName(String),
    #[error("no face detected")]
    NoFace,
    #[error("multiple faces detected, registration requires exactly one ({count} found)")]
    MultipleFaces { count: usize },
    #[error("could not extract face embedding: {source}")]
    Extraction {
        stage: RegistrationStage,
        #[source]
        source: AnalyzerError,
    },
    #[error("could not save face: {0}")]
    StoreIo(#[source] StoreError),
}

impl RegistrationError {
    /// Last stage reached before the failure.
    pub fn stage(&self) -> RegistrationStage {
        match self {
            Self::InvalidName(_) | Self::DuplicateName(_) => RegistrationStage::Idle,
            Self::NoFace | Self::MultipleFaces { .. } => RegistrationStage::FrameCaptured,
            Self::Extraction { stage, .. } => *stage,
            Self::StoreIo(_) => RegistrationStage::Extracted,
        }
    }
}

impl From<StoreError> for RegistrationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateName(name) => Self::DuplicateName(name),
            StoreError::InvalidName { reason, .. } => Self::InvalidName(reason.to_string()),
            other => Self::StoreIo(other),
        }
    }
}

/// Exactly one face, or the matching validation error.
pub fn require_single_face(faces: Vec<BoundingBox>) -> Result<BoundingBox, RegistrationError> {
    let count = faces.len();
    let mut faces = faces.into_iter();
    match (faces.next(), count) {
        (Some(face), 1) => Ok(face),
        (None, _) => Err(RegistrationError::NoFace),
        _ => Err(RegistrationError::MultipleFaces { count }),
    }
}

/// Run the full workflow for `name` against `frame`.
pub fn register(
    store: &mut FaceStore,
    analyzer: &mut dyn FaceAnalyzer,
    name: &str,
    frame: &Frame,
) -> Result<PersonRecord, RegistrationError> {
    let name = validate_name(name)?;
    if store.contains(name) {
        return Err(RegistrationError::DuplicateName(name.to_string()));
    }

    let mut stage = RegistrationStage::FrameCaptured;
    tracing::debug!(name, ?stage, "registration started");

    let boxes = analyzer
        .detect(frame)
        .map_err(|source| RegistrationError::Extraction { stage, source })?;
    let face = require_single_face(boxes)?;
    stage = RegistrationStage::Validated;
    tracing::debug!(name, ?stage, confidence = face.confidence, "single face found");

    let embedding = analyzer
        .embed(frame, &face)
        .map_err(|source| RegistrationError::Extraction { stage, source })?;
    stage = RegistrationStage::Extracted;
    tracing::debug!(name, ?stage, dim = embedding.dim(), "embedding extracted");

    let record = store.add(name, frame, embedding)?.clone();
    stage = RegistrationStage::Stored;
    tracing::info!(name, ?stage, "face registered");

    Ok(record)
}
