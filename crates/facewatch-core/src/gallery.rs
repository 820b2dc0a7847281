//! Known-face gallery: labeled reference embeddings built from a directory tree.
//!
//! Layout is one directory per person:
//!
//! ```text
//! root/
//!   alice/
//!     1.jpg
//!     2.png
//!   bob/
//!     group.jpeg
//! ```
//!
//! Every face found in every image becomes its own entry, so one image can
//! contribute several entries for the same label.

use crate::service::EmbeddingService;
use crate::types::Embedding;
use image::{ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reference image extensions, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory not found: {0}")]
    DirectoryNotFound(PathBuf),
    #[error("gallery root is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("no usable reference faces found under {0}")]
    EmptyGallery(PathBuf),
    #[error("embedding dimension mismatch for label {label:?}: expected {expected}, got {actual}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One labeled reference embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub embedding: Embedding,
    pub label: String,
    /// Reference image this embedding was extracted from, if any.
    pub source: Option<PathBuf>,
}

impl GalleryEntry {
    pub fn new(embedding: Embedding, label: impl Into<String>) -> Self {
        Self {
            embedding,
            label: label.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Read-only collection of labeled embeddings, all of one dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    /// Build a gallery from entries in the given order.
    ///
    /// Fails if the entries do not all share one embedding dimension.
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Result<Self, GalleryError> {
        if let Some(first) = entries.first() {
            let expected = first.embedding.dimension();
            if let Some(bad) = entries.iter().find(|e| e.embedding.dimension() != expected) {
                return Err(GalleryError::DimensionMismatch {
                    label: bad.label.clone(),
                    expected,
                    actual: bad.embedding.dimension(),
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension, `None` for an empty gallery.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.dimension())
    }

    /// Number of distinct labels.
    pub fn label_count(&self) -> usize {
        self.label_histogram().len()
    }

    /// Entry count per label, sorted by label.
    pub fn label_histogram(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.label.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Walks a labeled directory tree and embeds every reference image.
pub struct GalleryBuilder<S> {
    service: S,
    include_root_files: bool,
}

impl<S: EmbeddingService> GalleryBuilder<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            include_root_files: false,
        }
    }

    /// Also embed image files placed directly in the root, labeled by file stem
    /// (`root/alice.jpg` → `alice`).
    pub fn include_root_files(mut self, include: bool) -> Self {
        self.include_root_files = include;
        self
    }

    /// Give the service back, e.g. to reuse it for the frame loop.
    pub fn into_service(self) -> S {
        self.service
    }

    /// Build the gallery rooted at `root`.
    pub fn build(&mut self, root: &Path) -> Result<Gallery, GalleryError> {
        if !root.exists() {
            return Err(GalleryError::DirectoryNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(GalleryError::NotADirectory(root.to_path_buf()));
        }

        let mut entries = Vec::new();
        for path in sorted_dir_entries(root)? {
            if path.is_dir() {
                let Some(label) = file_name_string(&path) else {
                    tracing::warn!(path = %path.display(), "skipping directory with non UTF-8 name");
                    continue;
                };
                for image_path in sorted_dir_entries(&path)? {
                    if image_path.is_file() && is_reference_image(&image_path) {
                        self.embed_image(&image_path, &label, &mut entries);
                    }
                }
            } else if self.include_root_files && path.is_file() && is_reference_image(&path) {
                let Some(label) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
                    continue;
                };
                self.embed_image(&path, &label, &mut entries);
            }
        }

        if entries.is_empty() {
            return Err(GalleryError::EmptyGallery(root.to_path_buf()));
        }

        let gallery = Gallery::from_entries(entries)?;
        tracing::info!(
            root = %root.display(),
            entries = gallery.len(),
            labels = gallery.label_count(),
            "gallery built"
        );
        Ok(gallery)
    }

    /// Embed one reference image; failures drop the image with a warning.
    fn embed_image(&mut self, path: &Path, label: &str, entries: &mut Vec<GalleryEntry>) {
        let image = match load_image(path) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping undecodable reference image");
                return;
            }
        };

        let observations = match self.service.detect_and_encode(&image) {
            Ok(obs) => obs,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "embedding failed; skipping reference image");
                return;
            }
        };

        if observations.is_empty() {
            tracing::warn!(path = %path.display(), label, "no face detected in reference image");
            return;
        }

        tracing::debug!(path = %path.display(), label, faces = observations.len(), "embedded reference image");
        entries.extend(
            observations
                .into_iter()
                .map(|obs| GalleryEntry::new(obs.embedding, label).with_source(path)),
        );
    }
}

/// Whether `path` has one of [`IMAGE_EXTENSIONS`], ignoring case.
pub fn is_reference_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

fn file_name_string(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_owned)
}

/// Decode an image as RGB. The format is sniffed from the content, so a PNG
/// saved as `.jpg` still loads.
pub fn load_image(path: &Path) -> Result<RgbImage, image::ImageError> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?.to_rgb8())
}

/// Directory children sorted by file name.
fn sorted_dir_entries(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let io_err = |source| GalleryError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}
