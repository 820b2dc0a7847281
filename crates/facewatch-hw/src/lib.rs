//! facewatch-hw — video sources for the recognition loop.
//!
//! V4L2 camera capture plus file-backed sources (image sequences and
//! Motion-JPEG files), all exposed through [`facewatch_core::FrameSource`].

pub mod camera;
pub mod file_source;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, CaptureOptions, DeviceInfo, PixelFormat};
pub use file_source::{ImageSequence, MjpegFile};
pub use frame::{Frame, FrameError};
pub use source::{SourceError, VideoSource};
