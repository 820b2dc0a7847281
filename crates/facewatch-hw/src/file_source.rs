//! Frame sources backed by files: image sequences and Motion-JPEG streams.

use crate::frame;
use facewatch_core::{load_image, FrameReadError, FrameSource};
use image::RgbImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Decodes a list of image files one per frame, in order.
pub struct ImageSequence {
    frames: VecDeque<PathBuf>,
    origin: PathBuf,
}

impl ImageSequence {
    /// Every decodable image in `dir`, sorted by file name.
    pub fn from_dir(dir: &Path) -> std::io::Result<Self> {
        let mut paths = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        paths.retain(|p| p.is_file() && image::ImageFormat::from_path(p).is_ok());
        paths.sort();
        Ok(Self {
            frames: paths.into(),
            origin: dir.to_path_buf(),
        })
    }

    /// A single still image played as a one-frame stream.
    pub fn single(path: &Path) -> Self {
        Self {
            frames: VecDeque::from([path.to_path_buf()]),
            origin: path.to_path_buf(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameReadError> {
        let Some(path) = self.frames.pop_front() else {
            return Ok(None);
        };
        load_image(&path)
            .map(Some)
            .map_err(|e| FrameReadError(format!("{}: {e}", path.display())))
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.origin.display())
    }
}

/// Concatenated JPEG frames (`.mjpg` / `.mjpeg`), as written by many webcams
/// and `ffmpeg -f mjpeg`.
pub struct MjpegFile {
    data: Vec<u8>,
    pos: usize,
    path: PathBuf,
}

impl MjpegFile {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?, path))
    }

    pub fn from_bytes(data: Vec<u8>, path: &Path) -> Self {
        Self {
            data,
            pos: 0,
            path: path.to_path_buf(),
        }
    }

    /// Byte range of the next complete JPEG image starting at or after `pos`.
    fn next_jpeg(&self) -> Option<Result<(usize, usize), FrameReadError>> {
        let start = self.pos + find(&self.data[self.pos..], &JPEG_SOI)?;
        let end = match find(&self.data[start + 2..], &JPEG_EOI) {
            Some(offset) => start + 2 + offset + 2,
            None => {
                return Some(Err(FrameReadError(format!(
                    "{}: truncated JPEG frame at byte {start}",
                    self.path.display()
                ))))
            }
        };
        Some(Ok((start, end)))
    }
}

impl FrameSource for MjpegFile {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameReadError> {
        let (start, end) = match self.next_jpeg() {
            None => return Ok(None),
            Some(range) => range?,
        };
        self.pos = end;
        frame::decode_jpeg(&self.data[start..end])
            .map(Some)
            .map_err(|e| FrameReadError(format!("{} @{start}: {e}", self.path.display())))
    }

    fn describe(&self) -> String {
        format!("mjpeg file {}", self.path.display())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(w, h, Rgb([10, 200, 30]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    #[test]
    fn test_mjpeg_splits_frames() {
        let mut data = jpeg_bytes(8, 8);
        data.extend(jpeg_bytes(16, 4));
        let mut src = MjpegFile::from_bytes(data, Path::new("test.mjpg"));

        assert_eq!(src.next_frame().unwrap().unwrap().dimensions(), (8, 8));
        assert_eq!(src.next_frame().unwrap().unwrap().dimensions(), (16, 4));
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_mjpeg_skips_leading_garbage() {
        let mut data = b"boundary\r\n".to_vec();
        data.extend(jpeg_bytes(8, 8));
        let mut src = MjpegFile::from_bytes(data, Path::new("test.mjpg"));
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_mjpeg_truncated_frame_is_read_error() {
        let mut data = jpeg_bytes(8, 8);
        let full = jpeg_bytes(8, 8);
        data.extend_from_slice(&full[..full.len() / 2]);
        let mut src = MjpegFile::from_bytes(data, Path::new("test.mjpg"));
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.next_frame().is_err());
    }

    #[test]
    fn test_mjpeg_empty() {
        let mut src = MjpegFile::from_bytes(Vec::new(), Path::new("empty.mjpg"));
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_image_sequence_sorted() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(2, 2).save(dir.path().join("002.png")).unwrap();
        RgbImage::new(1, 1).save(dir.path().join("001.png")).unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();

        let mut src = ImageSequence::from_dir(dir.path()).unwrap();
        assert_eq!(src.remaining(), 2);
        assert_eq!(src.next_frame().unwrap().unwrap().dimensions(), (1, 1));
        assert_eq!(src.next_frame().unwrap().unwrap().dimensions(), (2, 2));
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_image_sequence_corrupt_frame() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.png"), b"not a png").unwrap();
        let mut src = ImageSequence::from_dir(dir.path()).unwrap();
        assert!(src.next_frame().is_err());
    }

    #[test]
    fn test_single_image_format_sniffed_from_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.jpg");
        RgbImage::new(5, 3).save_with_format(&path, ImageFormat::Png).unwrap();
        let mut src = ImageSequence::single(&path);
        assert_eq!(src.next_frame().unwrap().unwrap().dimensions(), (5, 3));
    }

    #[test]
    fn test_single_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        RgbImage::new(3, 3).save(&path).unwrap();
        let mut src = ImageSequence::single(&path);
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.next_frame().unwrap().is_none());
    }
}
