//! Headless frame sink: logs recognitions and optionally writes annotated frames.

use facewatch_core::{overlay, Annotation, FrameSink, SinkControl};
use image::RgbImage;
use std::path::{Path, PathBuf};

pub struct HeadlessSink {
    output: Option<PathBuf>,
    max_frames: Option<u64>,
    presented: u64,
    written: u64,
}

impl HeadlessSink {
    pub fn new(output: Option<PathBuf>, max_frames: Option<u64>) -> std::io::Result<Self> {
        if let Some(dir) = &output {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            output,
            max_frames,
            presented: 0,
            written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    fn write_frame(&mut self, dir: &Path, frame: &RgbImage, annotations: &[Annotation]) {
        let mut annotated = frame.clone();
        overlay::annotate(&mut annotated, annotations);
        let path = dir.join(frame_file_name(self.presented));
        match annotated.save(&path) {
            Ok(()) => self.written += 1,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to write frame"),
        }
    }
}

impl FrameSink for HeadlessSink {
    fn present(&mut self, frame: &RgbImage, annotations: &[Annotation], processed: bool) -> SinkControl {
        self.presented += 1;

        if processed {
            for a in annotations {
                tracing::info!(
                    frame = self.presented,
                    label = a.result.display_label(),
                    distance = a.result.distance,
                    confidence = a.result.confidence,
                    x = a.region.x.round() as i32,
                    y = a.region.y.round() as i32,
                    "face"
                );
            }
        }

        if let Some(dir) = self.output.clone() {
            self.write_frame(&dir, frame, annotations);
        }

        match self.max_frames {
            Some(max) if self.presented >= max => SinkControl::Quit,
            _ => SinkControl::Continue,
        }
    }
}

fn frame_file_name(index: u64) -> String {
    format!("frame_{index:06}.jpg")
}
