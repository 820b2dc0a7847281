//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use facewatch_core::{FrameReadError, FrameSource};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Motion JPEG, one JFIF image per buffer.
    Mjpg,
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"MJPG") {
            Some(PixelFormat::Mjpg)
        } else if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else {
            None
        }
    }
}

/// Requested capture resolution; the driver may pick the nearest it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Streaming V4L2 camera.
pub struct Camera {
    stream: MmapStream<'static>,
    _device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") and start streaming.
    pub fn open(device_path: &str, options: CaptureOptions) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Prefer MJPG (cheap on USB bandwidth); fall back to whatever YUYV the driver gives.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.width = options.width;
        fmt.height = options.height;

        let mut negotiated = None;
        for fourcc in [b"MJPG", b"YUYV"] {
            fmt.fourcc = FourCC::new(fourcc);
            let got = device.set_format(&fmt).map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
            })?;
            if let Some(pixel_format) = PixelFormat::from_fourcc(got.fourcc) {
                negotiated = Some((got, pixel_format));
                break;
            }
        }
        let (negotiated, pixel_format) = negotiated.ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need MJPG or YUYV)",
                fmt.fourcc
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            ?pixel_format,
            "negotiated format"
        );

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        Ok(Self {
            stream,
            _device: device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// Dequeue the next buffer and convert it to RGB.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used > 0 { &buf[..used] } else { buf };

        let image = to_rgb(self.pixel_format, data, self.width, self.height)?;
        Ok(Frame { image })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..64 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameReadError> {
        self.capture_frame()
            .map(|frame| Some(frame.image))
            .map_err(|e| FrameReadError(e.to_string()))
    }

    fn describe(&self) -> String {
        format!("camera {} ({}x{}, {:?})", self.device_path, self.width, self.height, self.pixel_format)
    }
}

fn to_rgb(format: PixelFormat, data: &[u8], width: u32, height: u32) -> Result<RgbImage, CameraError> {
    match format {
        PixelFormat::Mjpg => frame::decode_jpeg(data)
            .map_err(|e| CameraError::CaptureFailed(format!("MJPG decode failed: {e}"))),
        PixelFormat::Yuyv => frame::yuyv_to_rgb(data, width, height)
            .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
    }
}
