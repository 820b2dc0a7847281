use facewatch_core::{LoopOptions, DEFAULT_TOLERANCE};
use std::path::PathBuf;

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Root of the known-faces tree (`<root>/<label>/*.jpg`).
    pub gallery_dir: PathBuf,
    /// Camera index, device path or file path.
    pub source: String,
    /// Euclidean distance tolerance for a positive match.
    pub tolerance: f32,
    /// Run recognition on every Nth frame.
    pub process_every: u32,
    /// Downscale factor applied before detection.
    pub detect_scale: f32,
}

impl Config {
    /// Load configuration from `FACEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            model_dir: var("FACEWATCH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facewatch_core::default_model_dir),
            gallery_dir: var("FACEWATCH_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("known-faces")),
            source: var("FACEWATCH_SOURCE").unwrap_or_else(|| "0".to_string()),
            tolerance: parse_or(var("FACEWATCH_TOLERANCE"), DEFAULT_TOLERANCE),
            process_every: parse_or(var("FACEWATCH_PROCESS_EVERY"), 2),
            detect_scale: parse_or(var("FACEWATCH_DETECT_SCALE"), 0.5),
        }
    }

    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            tolerance: self.tolerance,
            process_every: self.process_every,
            detect_scale: self.detect_scale,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
