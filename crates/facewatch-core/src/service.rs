//! The detection + embedding capability the gallery builder and frame loop
//! depend on, and its ONNX Runtime implementation.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceObservation;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("{0}")]
    Other(String),
}

/// Finds faces in an image and encodes each one as an embedding.
///
/// Implementations must return embeddings of one fixed dimension and be
/// deterministic per input. Returning an empty list means no face was found.
pub trait EmbeddingService {
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<FaceObservation>, ServiceError>;
}

impl<S: EmbeddingService + ?Sized> EmbeddingService for &mut S {
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<FaceObservation>, ServiceError> {
        (**self).detect_and_encode(image)
    }
}

impl<S: EmbeddingService + ?Sized> EmbeddingService for Box<S> {
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<FaceObservation>, ServiceError> {
        (**self).detect_and_encode(image)
    }
}

/// SCRFD detector + ArcFace embedder.
pub struct OnnxFaceService {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceService {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ServiceError> {
        let detector_path = model_dir.join(DETECTOR_MODEL_FILE);
        let recognizer_path = model_dir.join(RECOGNIZER_MODEL_FILE);

        let detector = FaceDetector::load(&detector_path)?;
        let recognizer = FaceRecognizer::load(&recognizer_path)?;

        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl EmbeddingService for OnnxFaceService {
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<FaceObservation>, ServiceError> {
        let regions = self.detector.detect(image)?;
        tracing::trace!(faces = regions.len(), "detected faces");

        let mut observations = Vec::with_capacity(regions.len());
        for region in regions {
            let embedding = self.recognizer.extract(image, &region)?;
            observations.push(FaceObservation { region, embedding });
        }
        Ok(observations)
    }
}
