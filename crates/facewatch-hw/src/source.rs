//! Resolves a user-supplied source string to a concrete [`FrameSource`].

use crate::camera::{Camera, CaptureOptions};
use crate::file_source::{ImageSequence, MjpegFile};
use facewatch_core::FrameSource;
use image::ImageReader;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("video source {name} unavailable: {reason}")]
    Unavailable { name: String, reason: String },
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// Camera index, `/dev/video{N}`.
    Camera(u32),
    /// Explicit V4L2 device node.
    Device(PathBuf),
    /// Image file, directory of frames, or Motion-JPEG file.
    Path(PathBuf),
}

impl FromStr for VideoSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = s.parse() {
                return Ok(VideoSource::Camera(index));
            }
        }
        if s.starts_with("/dev/") {
            return Ok(VideoSource::Device(PathBuf::from(s)));
        }
        Ok(VideoSource::Path(PathBuf::from(s)))
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSource::Camera(index) => write!(f, "camera {index}"),
            VideoSource::Device(path) | VideoSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

impl VideoSource {
    pub fn open(&self, options: CaptureOptions) -> Result<Box<dyn FrameSource>, SourceError> {
        let unavailable = |reason: String| SourceError::Unavailable {
            name: self.to_string(),
            reason,
        };
        match self {
            VideoSource::Camera(index) => {
                let path = format!("/dev/video{index}");
                let camera = Camera::open(&path, options).map_err(|e| unavailable(e.to_string()))?;
                Ok(Box::new(camera))
            }
            VideoSource::Device(path) => {
                let camera = Camera::open(&path.to_string_lossy(), options)
                    .map_err(|e| unavailable(e.to_string()))?;
                Ok(Box::new(camera))
            }
            VideoSource::Path(path) => open_path(path).map_err(|e| unavailable(e.to_string())),
        }
    }
}

fn open_path(path: &Path) -> std::io::Result<Box<dyn FrameSource>> {
    let meta = std::fs::metadata(path)?;
    if meta.is_dir() {
        return Ok(Box::new(ImageSequence::from_dir(path)?));
    }
    let is_mjpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mjpg") || e.eq_ignore_ascii_case("mjpeg"));
    if is_mjpeg {
        return Ok(Box::new(MjpegFile::open(path)?));
    }
    // Anything else must be a still image the decoder recognizes.
    if ImageReader::open(path)?.with_guessed_format()?.format().is_none() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "unsupported file format (expected an image, image directory or .mjpg file)",
        ));
    }
    Ok(Box::new(ImageSequence::single(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn parse(s: &str) -> VideoSource {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_camera_index() {
        assert_eq!(parse("0"), VideoSource::Camera(0));
        assert_eq!(parse("12"), VideoSource::Camera(12));
    }

    #[test]
    fn test_parse_device_and_path() {
        assert_eq!(parse("/dev/video2"), VideoSource::Device("/dev/video2".into()));
        assert_eq!(parse("clip.mjpg"), VideoSource::Path("clip.mjpg".into()));
        assert_eq!(parse("-1"), VideoSource::Path("-1".into()));
        assert_eq!(parse("99999999999"), VideoSource::Path("99999999999".into()));
    }

    #[test]
    fn test_display() {
        assert_eq!(VideoSource::Camera(3).to_string(), "camera 3");
        assert_eq!(parse("frames/").to_string(), "frames/");
    }

    #[test]
    fn test_missing_path_is_unavailable() {
        let err = parse("/nonexistent/clip.mjpg")
            .open(CaptureOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, SourceError::Unavailable { .. }));
        assert!(err.to_string().contains("/nonexistent/clip.mjpg"));
    }

    #[test]
    fn test_unsupported_video_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isom").unwrap();

        let err = VideoSource::Path(clip).open(CaptureOptions::default()).err().unwrap();
        assert!(matches!(err, SourceError::Unavailable { .. }));
        assert!(err.to_string().contains("unsupported file format"));
    }

    #[test]
    fn test_image_with_wrong_extension_opens() {
        let dir = tempfile::tempdir().unwrap();
        let still = dir.path().join("frame.dat");
        RgbImage::new(6, 2).save_with_format(&still, image::ImageFormat::Png).unwrap();

        let mut src = VideoSource::Path(still).open(CaptureOptions::default()).unwrap();
        assert_eq!(src.next_frame().unwrap().unwrap().dimensions(), (6, 2));
    }

    #[test]
    fn test_missing_camera_is_unavailable() {
        let err = VideoSource::Device("/dev/video-missing".into())
            .open(CaptureOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[test]
    fn test_open_directory_and_still() {
        let dir = tempfile::tempdir().unwrap();
        let still = dir.path().join("a.png");
        RgbImage::new(4, 4).save(&still).unwrap();

        let mut seq = VideoSource::Path(dir.path().to_path_buf())
            .open(CaptureOptions::default())
            .unwrap();
        assert!(seq.next_frame().unwrap().is_some());
        assert!(seq.next_frame().unwrap().is_none());

        let mut single = VideoSource::Path(still).open(CaptureOptions::default()).unwrap();
        assert_eq!(single.next_frame().unwrap().unwrap().dimensions(), (4, 4));
    }
}
