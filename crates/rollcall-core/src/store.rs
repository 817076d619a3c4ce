//! Directory-backed face store.
//!
//! One image per registered person, `<name>.<ext>`, in a single directory.
//! Embeddings are computed once when the directory is loaded or when a face
//! is added, then served from memory.

use crate::analyzer::FaceAnalyzer;
use crate::frame::Frame;
use crate::types::{Embedding, PersonRecord};
use image::codecs::jpeg::JpegEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Image extensions picked up when scanning the store directory.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
/// Extension used for newly registered faces.
pub const STORE_EXTENSION: &str = "jpg";
const JPEG_QUALITY: u8 = 95;
/// Minimum mtime gap between consecutive registrations.
const STAMP_STEP: Duration = Duration::from_millis(1);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode face image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("name already registered: {0}")]
    DuplicateName(String),
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl StoreError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Check that `name` can be used as a person name and filename stem.
///
/// Returns the trimmed name.
pub fn validate_name(name: &str) -> Result<&str, StoreError> {
    let trimmed = name.trim();
    let reason = if trimmed.is_empty() {
        Some("please enter a name")
    } else if trimmed.starts_with('.') {
        Some("must not start with '.'")
    } else if trimmed.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        Some("must not contain path separators or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(trimmed),
    }
}

/// Ordered, directory-backed registry of named reference faces.
///
/// Insertion order is the files' modification order. Every new file is
/// stamped strictly after the newest one already in the directory.
#[derive(Debug)]
pub struct FaceStore {
    dir: PathBuf,
    records: Vec<PersonRecord>,
    /// Embedding length produced by the analyzer the store was loaded with.
    dim: usize,
    /// Newest modification time seen in the directory.
    newest: Option<SystemTime>,
}

impl FaceStore {
    /// Scan `dir` and build the index, creating the directory if needed.
    ///
    /// Files are taken oldest first (ties by filename) so registration order
    /// survives a restart. Images that cannot be read, or that do not hold
    /// exactly one face, are skipped with a warning.
    pub fn load(dir: impl Into<PathBuf>, analyzer: &mut dyn FaceAnalyzer) -> Result<Self, StoreError> {
        let mut store = Self {
            dir: dir.into(),
            records: Vec::new(),
            dim: analyzer.embedding_dim(),
            newest: None,
        };
        store.reload(analyzer)?;
        Ok(store)
    }

    /// Discard the in-memory index and rebuild it from the directory.
    pub fn reload(&mut self, analyzer: &mut dyn FaceAnalyzer) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        self.dim = analyzer.embedding_dim();

        let files = self.scan()?;
        self.newest = files.last().map(|(modified, _)| *modified);

        let mut records: Vec<PersonRecord> = Vec::new();
        for (_, path) in files {
            let Some(name) = stem_name(&path) else {
                tracing::warn!(path = %path.display(), "skipping file with unusable name");
                continue;
            };
            if records.iter().any(|r| r.name == name) {
                tracing::warn!(path = %path.display(), name, "skipping duplicate name");
                continue;
            }

            let Some(embedding) = embed_reference(&path, analyzer) else {
                continue;
            };
            if embedding.dim() != self.dim {
                tracing::warn!(
                    path = %path.display(),
                    expected = self.dim,
                    actual = embedding.dim(),
                    "skipping face with mismatched embedding size"
                );
                continue;
            }

            records.push(PersonRecord {
                name: name.to_string(),
                embedding,
                source_path: path,
            });
        }

        tracing::info!(dir = %self.dir.display(), faces = records.len(), "face store loaded");
        self.records = records;
        Ok(())
    }

    /// Image files in the store directory with their mtimes, oldest first.
    fn scan(&self) -> Result<Vec<(SystemTime, PathBuf)>, StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() || !has_supported_extension(&path) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, path));
        }

        files.sort();
        Ok(files)
    }

    /// Persist `frame` as `name`'s reference image and index `embedding`.
    ///
    /// The image is fully written and synced under a temporary name, then
    /// moved into place without overwriting. The index only changes after
    /// that succeeds.
    pub fn add(&mut self, name: &str, frame: &Frame, embedding: Embedding) -> Result<&PersonRecord, StoreError> {
        let name = validate_name(name)?;
        if self.contains(name) {
            return Err(StoreError::DuplicateName(name.to_string()));
        }
        if embedding.dim() != self.dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.dim(),
            });
        }

        let path = self.path_for(name);
        let stamp = self.next_stamp();
        self.write_image(&path, frame, stamp).map_err(|e| match e {
            StoreError::Io { source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists => {
                StoreError::DuplicateName(name.to_string())
            }
            other => other,
        })?;

        self.newest = Some(stamp);
        tracing::info!(name, path = %path.display(), "face stored");
        self.records.push(PersonRecord {
            name: name.to_string(),
            embedding,
            source_path: path,
        });
        Ok(&self.records[self.records.len() - 1])
    }

    /// Modification time for the next registered file: now, or just after
    /// the newest file when the clock has not moved past it.
    fn next_stamp(&self) -> SystemTime {
        let now = SystemTime::now();
        match self.newest {
            Some(newest) if newest >= now => newest + STAMP_STEP,
            _ => now,
        }
    }

    fn write_image(&self, path: &Path, frame: &Frame, stamp: SystemTime) -> Result<(), StoreError> {
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY).encode_image(&frame.to_image())?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        tmp.write_all(&encoded)
            .and_then(|_| tmp.as_file().set_modified(stamp))
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist_noclobber(path)
            .map_err(|e| StoreError::io(path, e.error))?;

        // Make the new directory entry durable too.
        #[cfg(unix)]
        if let Err(e) = std::fs::File::open(&self.dir).and_then(|d| d.sync_all()) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "failed to sync store directory");
        }

        Ok(())
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{STORE_EXTENSION}"))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.name == name)
    }

    /// Registered names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn records(&self) -> &[PersonRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn stem_name(path: &Path) -> Option<&str> {
    let stem = path.file_stem()?.to_str()?;
    match validate_name(stem) {
        Ok(name) if name == stem => Some(stem),
        _ => None,
    }
}

/// Embedding of the single face in a stored reference image, if any.
fn embed_reference(path: &Path, analyzer: &mut dyn FaceAnalyzer) -> Option<Embedding> {
    let frame = match Frame::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable face image");
            return None;
        }
    };

    let faces = match analyzer.analyze(&frame) {
        Ok(faces) => faces,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping face image that failed analysis");
            return None;
        }
    };

    match <[_; 1]>::try_from(faces) {
        Ok([face]) => Some(face.embedding),
        Err(faces) => {
            tracing::warn!(
                path = %path.display(),
                faces = faces.len(),
                "skipping face image without exactly one face"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerError;
    use crate::testing::ColourCells;
    use crate::types::BoundingBox;
    use tempfile::tempdir;

    const RED: [u8; 3] = [230, 20, 20];
    const BLUE: [u8; 3] = [20, 20, 230];

    fn embedding_of(colour: [u8; 3]) -> Embedding {
        Embedding::new(colour.iter().map(|&c| c as f32 / 255.0).collect())
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  alice ").unwrap(), "alice");
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("tab\there").is_err());
        assert_eq!(validate_name("Ada Lovelace").unwrap(), "Ada Lovelace");
    }

    #[test]
    fn test_load_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let faces = dir.path().join("faces");
        let store = FaceStore::load(&faces, &mut ColourCells).unwrap();
        assert!(faces.is_dir());
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_writes_image_and_indexes() {
        let dir = tempdir().unwrap();
        let mut store = FaceStore::load(dir.path(), &mut ColourCells).unwrap();

        let record = store
            .add("alice", &ColourCells::frame(&[RED]), embedding_of(RED))
            .unwrap();
        assert_eq!(record.source_path, dir.path().join("alice.jpg"));
        assert!(dir.path().join("alice.jpg").is_file());
        assert_eq!(store.names(), vec!["alice"]);
    }

    #[test]
    fn test_add_rejects_duplicate_name() {
        let dir = tempdir().unwrap();
        let mut store = FaceStore::load(dir.path(), &mut ColourCells).unwrap();
        store.add("alice", &ColourCells::frame(&[RED]), embedding_of(RED)).unwrap();

        let err = store
            .add("alice", &ColourCells::frame(&[BLUE]), embedding_of(BLUE))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(ref n) if n == "alice"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_refuses_to_clobber_unindexed_file() {
        let dir = tempdir().unwrap();
        let mut store = FaceStore::load(dir.path(), &mut ColourCells).unwrap();
        // Present on disk but never indexed (e.g. skipped at load).
        std::fs::write(dir.path().join("bob.jpg"), b"not an image").unwrap();

        let err = store
            .add("bob", &ColourCells::frame(&[BLUE]), embedding_of(BLUE))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));
        assert!(store.is_empty());
        assert_eq!(std::fs::read(dir.path().join("bob.jpg")).unwrap(), b"not an image");
    }

    #[test]
    fn test_add_rejects_dimension_mismatch() {
        let dir = tempdir().unwrap();
        let mut store = FaceStore::load(dir.path(), &mut ColourCells).unwrap();
        store.add("alice", &ColourCells::frame(&[RED]), embedding_of(RED)).unwrap();

        let err = store
            .add("bob", &ColourCells::frame(&[BLUE]), Embedding::new(vec![0.0; 4]))
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 3, actual: 4 }));
        assert!(!dir.path().join("bob.jpg").exists());
    }

    #[test]
    fn test_first_record_must_match_analyzer_dim() {
        let dir = tempdir().unwrap();
        let mut store = FaceStore::load(dir.path(), &mut ColourCells).unwrap();

        let err = store
            .add("alice", &ColourCells::frame(&[RED]), Embedding::new(vec![0.0; 512]))
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 3, actual: 512 }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_write_leaves_index_untouched() {
        let dir = tempdir().unwrap();
        let mut store = FaceStore::load(dir.path().join("faces"), &mut ColourCells).unwrap();
        std::fs::remove_dir(dir.path().join("faces")).unwrap();

        let err = store
            .add("alice", &ColourCells::frame(&[RED]), embedding_of(RED))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_reload_restores_names_in_order() {
        let dir = tempdir().unwrap();
        let mut store = FaceStore::load(dir.path(), &mut ColourCells).unwrap();
        store.add("alice", &ColourCells::frame(&[RED]), embedding_of(RED)).unwrap();
        store.add("bob", &ColourCells::frame(&[BLUE]), embedding_of(BLUE)).unwrap();

        let reloaded = FaceStore::load(dir.path(), &mut ColourCells).unwrap();
        assert_eq!(reloaded.names(), vec!["alice", "bob"]);
        for (orig, again) in store.records().iter().zip(reloaded.records()) {
            assert!(orig.embedding.euclidean_distance(&again.embedding) < 0.05);
        }
    }

    #[test]
    fn test_back_to_back_registrations_keep_order_against_filename_order() {
        let dir = tempdir().unwrap();
        let mut store = FaceStore::load(dir.path(), &mut ColourCells).unwrap();
        let names = ["zed", "yvonne", "xavier", "alice"];
        for name in names {
            store.add(name, &ColourCells::frame(&[RED]), embedding_of(RED)).unwrap();
        }

        for _ in 0..5 {
            let reloaded = FaceStore::load(dir.path(), &mut ColourCells).unwrap();
            assert_eq!(reloaded.names(), names.to_vec());
        }
    }

    #[test]
    fn test_new_file_stamped_after_future_dated_file() {
        let dir = tempdir().unwrap();
        let p = dir.path();
        ColourCells::frame(&[BLUE]).to_image().save(p.join("zed.png")).unwrap();
        let future = SystemTime::now() + Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(p.join("zed.png"))
            .unwrap()
            .set_modified(future)
            .unwrap();

        let mut store = FaceStore::load(p, &mut ColourCells).unwrap();
        store.add("alice", &ColourCells::frame(&[RED]), embedding_of(RED)).unwrap();

        let reloaded = FaceStore::load(p, &mut ColourCells).unwrap();
        assert_eq!(reloaded.names(), vec!["zed", "alice"]);
    }

    /// Claims a longer embedding than it produces.
    struct Misreported;

    impl FaceAnalyzer for Misreported {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, AnalyzerError> {
            ColourCells.detect(frame)
        }

        fn embed(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, AnalyzerError> {
            ColourCells.embed(frame, face)
        }

        fn embedding_dim(&self) -> usize {
            512
        }
    }

    #[test]
    fn test_load_skips_faces_of_wrong_length() {
        let dir = tempdir().unwrap();
        ColourCells::frame(&[RED]).to_image().save(dir.path().join("alice.png")).unwrap();

        let store = FaceStore::load(dir.path(), &mut Misreported).unwrap();
        assert!(store.is_empty());
        let store = FaceStore::load(dir.path(), &mut ColourCells).unwrap();
        assert_eq!(store.names(), vec!["alice"]);
    }

    #[test]
    fn test_load_skips_unusable_files() {
        let dir = tempdir().unwrap();
        let p = dir.path();
        ColourCells::frame(&[RED]).to_image().save(p.join("alice.png")).unwrap();
        ColourCells::frame(&[[0, 0, 0]]).to_image().save(p.join("nobody.png")).unwrap();
        ColourCells::frame(&[RED, BLUE]).to_image().save(p.join("crowd.png")).unwrap();
        std::fs::write(p.join("broken.jpg"), b"garbage").unwrap();
        std::fs::write(p.join("notes.txt"), b"ignored").unwrap();

        let store = FaceStore::load(p, &mut ColourCells).unwrap();
        assert_eq!(store.names(), vec!["alice"]);
    }
}
