use serde::{Deserialize, Serialize};

/// Region of a detected face in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector score in [0, 1].
    pub score: f32,
}

impl FaceRegion {
    /// Multiply every coordinate by `factor`, leaving the score untouched.
    ///
    /// Used to map regions found on a downscaled frame back to the full frame.
    pub fn scaled(&self, factor: f32) -> FaceRegion {
        FaceRegion {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            score: self.score,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector. Dimension is fixed by the model that produced it
/// (512 for ArcFace w600k_r50).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings. Embeddings of different
    /// dimension are infinitely far apart.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found by an [`EmbeddingService`](crate::service::EmbeddingService).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceObservation {
    pub region: FaceRegion,
    pub embedding: Embedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.3, -0.2, 0.9]);
        assert_eq!(a.euclidean_distance(&a.clone()), 0.0);
    }

    #[test]
    fn test_euclidean_distance_345() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_symmetric() {
        let a = Embedding::new(vec![1.0, 2.0, 3.0]);
        let b = Embedding::new(vec![-1.0, 0.5, 2.0]);
        assert_eq!(a.euclidean_distance(&b), b.euclidean_distance(&a));
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![0.0, 0.0, 9.0]);
        assert_eq!(a.euclidean_distance(&b), f32::INFINITY);
        assert_eq!(b.euclidean_distance(&a), f32::INFINITY);
    }

    #[test]
    fn test_region_scaled() {
        let r = FaceRegion { x: 10.0, y: 20.0, width: 30.0, height: 40.0, score: 0.8 };
        let s = r.scaled(2.0);
        assert_eq!((s.x, s.y, s.width, s.height), (20.0, 40.0, 60.0, 80.0));
        assert_eq!(s.score, 0.8);
        assert_eq!(s.right(), 80.0);
        assert_eq!(s.bottom(), 120.0);
    }

    #[test]
    fn test_region_area_negative_size() {
        let r = FaceRegion { x: 0.0, y: 0.0, width: -5.0, height: 10.0, score: 1.0 };
        assert_eq!(r.area(), 0.0);
    }
}
