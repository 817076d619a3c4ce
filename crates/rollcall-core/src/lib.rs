//! rollcall-core: face registration and recognition for attendance apps.
//!
//! Detects faces with SCRFD, embeds them with ArcFace (both via ONNX
//! Runtime), keeps one reference image per person in a directory and
//! matches query faces against it.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod frame;
pub mod matcher;
pub mod overlay;
pub mod recognizer;
pub mod registration;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

pub use analyzer::{AnalyzerError, FaceAnalyzer, OnnxAnalyzer};
pub use frame::{Frame, FrameError};
pub use matcher::{tolerance_for_cosine, FirstMatch, Matcher, DEFAULT_TOLERANCE};
pub use registration::{RegistrationError, RegistrationStage};
pub use service::FaceService;
pub use store::{FaceStore, StoreError};
pub use types::{BoundingBox, DetectedFace, Embedding, MatchResult, PersonRecord, Recognition, UNKNOWN_NAME};

/// SCRFD detection model filename.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model filename.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`, falling back
/// to `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}
