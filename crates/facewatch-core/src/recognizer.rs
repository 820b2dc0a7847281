//! ArcFace face embedder via ONNX Runtime.
//!
//! Extracts 512-dimensional embeddings from a square crop around each
//! detected region, using the w600k_r50 ArcFace model.

use crate::types::{Embedding, FaceRegion};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_INPUT_SIZE: u32 = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";
/// Crop margin added around the detected region, as a fraction of its longer side.
const CROP_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download w600k_r50.onnx from insightface and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region lies outside the frame")]
    RegionOutOfFrame,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face embedder.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Extract an L2-normalized embedding for one detected face.
    pub fn extract(&mut self, frame: &RgbImage, face: &FaceRegion) -> Result<Embedding, RecognizerError> {
        let crop = crop_face(frame, face).ok_or(RecognizerError::RegionOutOfFrame)?;
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

/// Square crop centred on the region, enlarged by [`CROP_MARGIN`], clipped to
/// the frame and resized to the ArcFace input size.
fn crop_face(frame: &RgbImage, face: &FaceRegion) -> Option<RgbImage> {
    let side = face.width.max(face.height) * (1.0 + CROP_MARGIN);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).max(0.0);
    let y0 = (cy - side / 2.0).max(0.0);
    let x1 = (cx + side / 2.0).min(frame.width() as f32);
    let y1 = (cy + side / 2.0).min(frame.height() as f32);
    if !(x1 - x0 >= 1.0 && y1 - y0 >= 1.0) {
        return None;
    }

    let (x, y) = (x0 as u32, y0 as u32);
    let w = ((x1 - x0) as u32).clamp(1, frame.width() - x);
    let h = ((y1 - y0) as u32).clamp(1, frame.height() - y);
    let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
    Some(imageops::resize(&crop, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE, FilterType::Triangle))
}

/// 112x112 RGB crop → NCHW tensor.
fn preprocess(face: &RgbImage) -> Array4<f32> {
    let size = ARCFACE_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in face.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
