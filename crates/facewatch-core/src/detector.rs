//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB frame to the model input, decodes the anchor-free
//! outputs of all three strides and suppresses overlaps with NMS. Keypoint
//! outputs, when the export has them, are not read.

use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_SCORE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download det_10g.onnx from insightface and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("empty frame")]
    EmptyFrame,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for mapping letterboxed coordinates back to the frame.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: usize) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((target as f32 - new_w) / 2.0).floor(),
            pad_y: ((target as f32 - new_h) / 2.0).floor(),
        }
    }

    fn to_frame(self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    input_size: usize,
    score_threshold: f32,
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        // 6 outputs without keypoints, 9 with.
        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires at least 6 outputs (3 strides × score/bbox), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_size: SCRFD_INPUT_SIZE,
            score_threshold: SCRFD_SCORE_THRESHOLD,
            stride_indices,
        })
    }

    /// Detect faces, returning regions sorted by descending score.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceRegion>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectorError::EmptyFrame);
        }

        let (input, letterbox) = preprocess(frame, self.input_size);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                self.input_size,
                letterbox,
                self.score_threshold,
            ));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Letterbox an RGB frame into a normalized NCHW tensor.
fn preprocess(frame: &RgbImage, size: usize) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(frame.width(), frame.height(), size);
    let new_w = ((frame.width() as f32 * letterbox.scale).round() as u32).clamp(1, size as u32);
    let new_h = ((frame.height() as f32 * letterbox.scale).round() as u32).clamp(1, size as u32);
    let resized = imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    // Padding holds SCRFD_MEAN, which normalizes to 0.0.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let off_x = letterbox.pad_x as usize;
    let off_y = letterbox.pad_y as usize;
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (off_x + x as usize, off_y + y as usize);
        if tx >= size || ty >= size {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Discover score/bbox tensor ordering by name.
///
/// Exports either name outputs "score_8", "bbox_16", ... or use generic
/// numeric names, in which case the standard positional layout applies:
/// `[0-2]` scores, `[3-5]` bboxes (strides 8, 16, 32).
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(found) => {
            tracing::debug!("SCRFD: using name-based output tensor mapping");
            [found[0], found[1], found[2]]
        }
        None => {
            tracing::debug!(?names, "SCRFD: output names not recognized, using positional mapping");
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

/// Decode the detections of a single stride level into frame coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: Letterbox,
    threshold: f32,
) -> Vec<FaceRegion> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    (0..num_anchors)
        .filter_map(|idx| {
            let score = *scores.get(idx)?;
            if score <= threshold {
                return None;
            }
            let offsets = bboxes.get(idx * 4..idx * 4 + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let anchor_x = (cell % grid) as f32 * step;
            let anchor_y = (cell / grid) as f32 * step;

            let (x1, y1) = letterbox.to_frame(anchor_x - offsets[0] * step, anchor_y - offsets[1] * step);
            let (x2, y2) = letterbox.to_frame(anchor_x + offsets[2] * step, anchor_y + offsets[3] * step);

            Some(FaceRegion {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                score,
            })
        })
        .collect()
}

/// Non-maximum suppression. Output is sorted by descending score.
fn nms(mut detections: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<FaceRegion> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-union of two regions.
fn iou(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let inter_w = (a.right().min(b.right()) - a.x.max(b.x)).max(0.0);
    let inter_h = (a.bottom().min(b.bottom()) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
