use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";

/// CLI configuration: defaults, then an optional TOML file, then `ROLLCALL_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one reference image per registered person.
    pub store_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum embedding distance for a positive match.
    pub tolerance: f32,
    /// Font for name labels on annotated images; boxes only when unset.
    pub label_font: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("faces"),
            model_dir: rollcall_core::default_model_dir(),
            tolerance: rollcall_core::DEFAULT_TOLERANCE,
            label_font: rollcall_core::overlay::find_font(),
        }
    }
}

impl Config {
    /// Resolve the configuration.
    ///
    /// `explicit` (from `--config` or `ROLLCALL_CONFIG`) must exist; the
    /// implicit `./rollcall.toml` is only read when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from environment variables; unparsable values are ignored.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("ROLLCALL_STORE_DIR") {
            self.store_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(font) = var("ROLLCALL_LABEL_FONT") {
            self.label_font = Some(PathBuf::from(font));
        }
        if let Some(raw) = var("ROLLCALL_TOLERANCE") {
            match raw.parse::<f32>() {
                Ok(t) if t.is_finite() && t > 0.0 => self.tolerance = t,
                _ => tracing::warn!(value = %raw, "ignoring invalid ROLLCALL_TOLERANCE"),
            }
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(rollcall_core::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(rollcall_core::ARCFACE_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}
