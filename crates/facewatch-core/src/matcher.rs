//! Nearest-neighbour matching of a probe embedding against the gallery.
//!
//! The argmin is taken over every gallery entry first; only then is the
//! winner tested against the tolerance. Entries inside the tolerance are not
//! pre-filtered.

use crate::gallery::Gallery;
use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default Euclidean tolerance. Smaller is stricter.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// Display text for a probe that matched nobody.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Result of matching one probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Label of the best entry, `None` when the best distance exceeds the tolerance.
    pub label: Option<String>,
    /// Distance to the nearest gallery entry (`+inf` for an empty gallery).
    pub distance: f32,
    /// `max(0, 1 - distance)` for a match, 0 otherwise.
    pub confidence: f32,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            label: None,
            distance,
            confidence: 0.0,
        }
    }

    pub fn is_known(&self) -> bool {
        self.label.is_some()
    }

    /// Label, or [`UNKNOWN_LABEL`].
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label} ({:.2}%)", self.confidence * 100.0),
            None => f.write_str(UNKNOWN_LABEL),
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery.
pub trait Matcher {
    fn compare(&self, gallery: &Gallery, probe: &Embedding, tolerance: f32) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, gallery: &Gallery, probe: &Embedding, tolerance: f32) -> MatchResult {
        if gallery.is_empty() {
            return MatchResult::unknown(f32::INFINITY);
        }
        if gallery.dimension() != Some(probe.dimension()) {
            tracing::warn!(
                probe = probe.dimension(),
                gallery = ?gallery.dimension(),
                "probe dimension does not match gallery"
            );
            return MatchResult::unknown(f32::INFINITY);
        }

        let mut best_distance = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        // Strict `<` keeps the earliest entry on ties; NaN never wins.
        for (i, entry) in gallery.entries().iter().enumerate() {
            let distance = probe.euclidean_distance(&entry.embedding);
            if distance < best_distance {
                best_distance = distance;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_distance <= tolerance => MatchResult {
                label: Some(gallery.entries()[idx].label.clone()),
                distance: best_distance,
                confidence: (1.0 - best_distance).max(0.0),
            },
            _ => MatchResult::unknown(best_distance),
        }
    }
}

/// Match `probe` against `gallery` with the [`EuclideanMatcher`].
pub fn match_probe(gallery: &Gallery, probe: &Embedding, tolerance: f32) -> MatchResult {
    EuclideanMatcher.compare(gallery, probe, tolerance)
}
