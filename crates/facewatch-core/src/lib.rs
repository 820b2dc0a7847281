//! facewatch-core — known-face gallery matching.
//!
//! Builds a gallery of labeled face embeddings from a directory tree and
//! resolves faces detected in video frames to the nearest known label.
//! Detection and embedding sit behind [`EmbeddingService`]; the bundled
//! implementation runs SCRFD and ArcFace via ONNX Runtime.

pub mod detector;
pub mod frame_loop;
pub mod gallery;
pub mod matcher;
pub mod overlay;
pub mod recognizer;
pub mod service;
pub mod types;

pub use frame_loop::{
    process_frame, Annotation, FrameLoop, FrameReadError, FrameSink, FrameSource, LoopError, LoopOptions,
    LoopStats, SinkControl, StopReason, StopSignal,
};
pub use gallery::{load_image, Gallery, GalleryBuilder, GalleryEntry, GalleryError};
pub use matcher::{match_probe, EuclideanMatcher, MatchResult, Matcher, DEFAULT_TOLERANCE, UNKNOWN_LABEL};
pub use service::{EmbeddingService, OnnxFaceService, ServiceError};
pub use types::{Embedding, FaceObservation, FaceRegion};

use std::path::PathBuf;

/// Model directory used when none is configured.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}
