//! Captured frame type and pixel format conversion (YUYV to RGB, JPEG decode).

use image::{ImageFormat, Rgb, RgbImage};

/// A captured RGB frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
}

impl Frame {
    /// Average luma (0.0–255.0), used by the device diagnostics.
    pub fn avg_brightness(&self) -> f32 {
        let pixels = (self.image.width() * self.image.height()) as usize;
        if pixels == 0 {
            return 0.0;
        }
        let sum: f32 = self
            .image
            .pixels()
            .map(|Rgb([r, g, b])| 0.299 * *r as f32 + 0.587 * *g as f32 + 0.114 * *b as f32)
            .sum();
        sum / pixels as f32
    }
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the chroma pair. Uses limited-range BT.601 coefficients.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected || width % 2 != 0 {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 1.164 * (y as f32 - 16.0);
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(c + 1.596 * e),
        clamp(c - 0.392 * d - 0.813 * e),
        clamp(c + 2.017 * d),
    ]
}

/// Decode one JPEG (e.g. an MJPG camera buffer) to RGB.
pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage, FrameError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?.to_rgb8())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_yuyv_black_and_white() {
        // 2x1 image: black then white, neutral chroma
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*rgb.get_pixel(1, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_yuyv_red_dominant() {
        // high V (Cr) pushes towards red
        let yuyv = vec![82, 90, 82, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let Rgb([r, g, b]) = *rgb.get_pixel(0, 0);
        assert!(r > 200 && g < 50 && b < 50, "got {r},{g},{b}");
    }

    #[test]
    fn test_yuyv_4x2_dimensions() {
        let yuyv = vec![128u8; 4 * 2 * 2];
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.dimensions(), (4, 2));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128];
        assert!(matches!(
            yuyv_to_rgb(&yuyv, 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_decode_jpeg_roundtrip_dimensions() {
        let img = RgbImage::from_pixel(16, 8, Rgb([200, 100, 50]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg).unwrap();
        let decoded = decode_jpeg(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
    }

    #[test]
    fn test_decode_jpeg_garbage() {
        assert!(matches!(decode_jpeg(b"definitely not a jpeg"), Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame {
            image: RgbImage::from_pixel(4, 4, Rgb([100, 100, 100])),
        };
        assert!((frame.avg_brightness() - 100.0).abs() < 1e-3);
    }
}
