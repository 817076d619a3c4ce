//! Face matching service: the entry point the UI polls once per frame.
//!
//! Recognition reads the store and registration writes it, never at the
//! same time. The analyzer is a single exclusive resource. Lock order is
//! always analyzer, then store.

use crate::analyzer::FaceAnalyzer;
use crate::frame::Frame;
use crate::matcher::{FirstMatch, Matcher};
use crate::registration::{self, RegistrationError};
use crate::store::{FaceStore, StoreError};
use crate::types::{DetectedFace, PersonRecord, Recognition};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock, TryLockError};

pub struct FaceService {
    analyzer: Mutex<Box<dyn FaceAnalyzer>>,
    store: RwLock<FaceStore>,
    matcher: FirstMatch,
}

impl FaceService {
    /// Load the store at `store_dir` and build the service around it.
    pub fn open(
        store_dir: impl Into<PathBuf>,
        mut analyzer: Box<dyn FaceAnalyzer>,
        tolerance: f32,
    ) -> Result<Self, StoreError> {
        let store = FaceStore::load(store_dir, analyzer.as_mut())?;
        Ok(Self {
            analyzer: Mutex::new(analyzer),
            store: RwLock::new(store),
            matcher: FirstMatch::new(tolerance),
        })
    }

    /// Recognize every face in `frame`.
    ///
    /// A frame the analyzer cannot process yields no recognitions; the caller
    /// simply moves on to the next frame.
    pub fn recognize(&self, frame: &Frame) -> Vec<Recognition> {
        let faces = {
            let mut analyzer = self.analyzer.lock().unwrap_or_else(PoisonError::into_inner);
            analyze_or_skip(analyzer.as_mut(), frame)
        };
        self.match_faces(faces)
    }

    /// Like [`recognize`](Self::recognize), but returns `None` instead of
    /// waiting when another operation holds the analyzer or the store.
    pub fn try_recognize(&self, frame: &Frame) -> Option<Vec<Recognition>> {
        let faces = {
            let mut analyzer = match self.analyzer.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(p)) => p.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    tracing::trace!("analyzer busy, dropping frame");
                    return None;
                }
            };
            analyze_or_skip(analyzer.as_mut(), frame)
        };

        let store = match self.store.try_read() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                tracing::trace!("store busy, dropping frame");
                return None;
            }
        };
        Some(self.resolve(&store, faces))
    }

    fn match_faces(&self, faces: Vec<DetectedFace>) -> Vec<Recognition> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        self.resolve(&store, faces)
    }

    fn resolve(&self, store: &FaceStore, faces: Vec<DetectedFace>) -> Vec<Recognition> {
        faces
            .into_iter()
            .map(|face| {
                let result = self.matcher.compare(&face.embedding, store.records());
                tracing::debug!(name = %result.name, matched = result.matched, distance = result.distance, "face resolved");
                Recognition {
                    bbox: face.bbox,
                    result,
                }
            })
            .collect()
    }

    /// Register `frame` under `name`. Blocks recognition until done.
    pub fn register(&self, name: &str, frame: &Frame) -> Result<PersonRecord, RegistrationError> {
        let mut analyzer = self.analyzer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        registration::register(&mut store, analyzer.as_mut(), name, frame)
    }

    /// Registered names in insertion order.
    pub fn names(&self) -> Vec<String> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.names().into_iter().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn store_dir(&self) -> PathBuf {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.dir().to_path_buf()
    }

    pub fn tolerance(&self) -> f32 {
        self.matcher.tolerance
    }
}

fn analyze_or_skip(analyzer: &mut dyn FaceAnalyzer, frame: &Frame) -> Vec<DetectedFace> {
    analyzer.analyze(frame).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "frame analysis failed, treating as no detection");
        Vec::new()
    })
}
