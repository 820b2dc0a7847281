//! Frame-at-a-time recognition loop.
//!
//! Pulls frames from a [`FrameSource`], runs the embedding service and the
//! matcher on every `process_every`-th frame, and hands each frame with its
//! annotations to a [`FrameSink`]. Frames that are not processed are passed
//! through with no annotations.

use crate::gallery::Gallery;
use crate::matcher::{MatchResult, Matcher, DEFAULT_TOLERANCE};
use crate::service::{EmbeddingService, ServiceError};
use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// A single frame could not be read or decoded. The loop treats it as end of stream.
#[derive(Error, Debug)]
#[error("frame read failed: {0}")]
pub struct FrameReadError(pub String);

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("process_every must be at least 1")]
    InvalidProcessEvery,
    #[error("detect_scale must be in (0, 1], got {0}")]
    InvalidDetectScale(f32),
    #[error("tolerance must be a non-negative number, got {0}")]
    InvalidTolerance(f32),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Produces frames until the stream ends (`Ok(None)`).
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameReadError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String {
        "frame source".to_string()
    }
}

impl<F: FrameSource + ?Sized> FrameSource for Box<F> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameReadError> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// What the sink wants the loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Quit,
}

/// Rendering/display collaborator.
pub trait FrameSink {
    /// `annotations` is empty for frames that were not processed.
    fn present(&mut self, frame: &RgbImage, annotations: &[Annotation], processed: bool) -> SinkControl;
}

/// One recognized (or unknown) face in a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub region: FaceRegion,
    pub result: MatchResult,
}

/// Cooperative stop flag, checked once per loop iteration.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopOptions {
    pub tolerance: f32,
    /// Process every N-th frame (1 = every frame).
    pub process_every: u32,
    /// Downscale factor applied before detection, in (0, 1].
    pub detect_scale: f32,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            process_every: 1,
            detect_scale: 1.0,
        }
    }
}

impl LoopOptions {
    /// Reject settings the loop cannot honor.
    pub fn validate(&self) -> Result<(), LoopError> {
        if self.process_every == 0 {
            return Err(LoopError::InvalidProcessEvery);
        }
        if !(self.detect_scale > 0.0 && self.detect_scale <= 1.0) {
            return Err(LoopError::InvalidDetectScale(self.detect_scale));
        }
        if !(self.tolerance >= 0.0) {
            return Err(LoopError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    FrameReadFailed(String),
    SinkQuit,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub faces_known: u64,
    pub faces_unknown: u64,
}

/// Detect, embed and match every face in one frame.
///
/// With `detect_scale < 1` detection runs on a downscaled copy and regions
/// are mapped back to `frame` coordinates.
pub fn process_frame<S, M>(
    service: &mut S,
    gallery: &Gallery,
    matcher: &M,
    frame: &RgbImage,
    options: &LoopOptions,
) -> Result<Vec<Annotation>, ServiceError>
where
    S: EmbeddingService + ?Sized,
    M: Matcher + ?Sized,
{
    let scale = options.detect_scale;
    let observations = if scale < 1.0 {
        let w = ((frame.width() as f32 * scale).round() as u32).max(1);
        let h = ((frame.height() as f32 * scale).round() as u32).max(1);
        let small = imageops::resize(frame, w, h, FilterType::Triangle);
        service.detect_and_encode(&small)?
    } else {
        service.detect_and_encode(frame)?
    };

    Ok(observations
        .into_iter()
        .map(|obs| Annotation {
            region: if scale < 1.0 { obs.region.scaled(1.0 / scale) } else { obs.region },
            result: matcher.compare(gallery, &obs.embedding, options.tolerance),
        })
        .collect())
}

/// Recognition loop over a fixed gallery.
pub struct FrameLoop<'g, M> {
    gallery: &'g Gallery,
    matcher: M,
    options: LoopOptions,
    stop: StopSignal,
}

impl<'g, M: Matcher> FrameLoop<'g, M> {
    pub fn new(gallery: &'g Gallery, matcher: M, options: LoopOptions) -> Result<Self, LoopError> {
        options.validate()?;
        Ok(Self {
            gallery,
            matcher,
            options,
            stop: StopSignal::new(),
        })
    }

    /// Use an externally owned stop signal (e.g. one flipped by Ctrl-C).
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Run until end of stream, a frame read failure, a sink quit or a stop request.
    pub fn run<Src, S, K>(
        &self,
        source: &mut Src,
        service: &mut S,
        sink: &mut K,
    ) -> Result<(LoopStats, StopReason), LoopError>
    where
        Src: FrameSource + ?Sized,
        S: EmbeddingService + ?Sized,
        K: FrameSink + ?Sized,
    {
        let mut stats = LoopStats::default();
        tracing::info!(
            source = %source.describe(),
            gallery = self.gallery.len(),
            tolerance = self.options.tolerance,
            process_every = self.options.process_every,
            "frame loop started"
        );

        let reason = loop {
            if self.stop.is_stopped() {
                break StopReason::Stopped;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::EndOfStream,
                Err(e) => {
                    tracing::warn!(error = %e, "frame read failed; ending stream");
                    break StopReason::FrameReadFailed(e.0);
                }
            };
            stats.frames_seen += 1;

            if stats.frames_seen % u64::from(self.options.process_every) != 0 {
                if sink.present(&frame, &[], false) == SinkControl::Quit {
                    break StopReason::SinkQuit;
                }
                continue;
            }

            let annotations = process_frame(&mut *service, self.gallery, &self.matcher, &frame, &self.options)?;
            stats.frames_processed += 1;
            for a in &annotations {
                if a.result.is_known() {
                    stats.faces_known += 1;
                } else {
                    stats.faces_unknown += 1;
                }
            }
            tracing::debug!(frame = stats.frames_seen, faces = annotations.len(), "frame processed");

            if sink.present(&frame, &annotations, true) == SinkControl::Quit {
                break StopReason::SinkQuit;
            }
        };

        tracing::info!(?reason, ?stats, "frame loop finished");
        Ok((stats, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::tests::PixelCodedService;
    use crate::gallery::GalleryEntry;
    use crate::matcher::EuclideanMatcher;
    use crate::types::Embedding;
    use image::Rgb;
    use std::collections::VecDeque;

    struct VecSource {
        frames: VecDeque<Result<RgbImage, FrameReadError>>,
    }

    impl VecSource {
        fn new(frames: Vec<Result<RgbImage, FrameReadError>>) -> Self {
            Self { frames: frames.into() }
        }
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameReadError> {
            self.frames.pop_front().transpose()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        presented: Vec<(bool, Vec<Annotation>)>,
        quit_after: Option<usize>,
    }

    impl FrameSink for RecordingSink {
        fn present(&mut self, _frame: &RgbImage, annotations: &[Annotation], processed: bool) -> SinkControl {
            self.presented.push((processed, annotations.to_vec()));
            match self.quit_after {
                Some(n) if self.presented.len() >= n => SinkControl::Quit,
                _ => SinkControl::Continue,
            }
        }
    }

    /// One face whose first component is green/255: seed 0 matches "alice".
    fn frame(faces: u8, seed: u8) -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb([faces, seed, 0]))
    }

    fn gallery() -> Gallery {
        Gallery::from_entries(vec![
            GalleryEntry::new(Embedding::new(vec![0.0, 0.0]), "alice"),
            GalleryEntry::new(Embedding::new(vec![0.0, 1.0]), "alice"),
        ])
        .unwrap()
    }

    fn service() -> PixelCodedService {
        PixelCodedService { calls: 0 }
    }

    #[test]
    fn test_process_frame_annotates_each_face() {
        let g = gallery();
        let annotations =
            process_frame(&mut service(), &g, &EuclideanMatcher, &frame(2, 0), &LoopOptions::default()).unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].result.label.as_deref(), Some("alice"));
        assert_eq!(annotations[0].result.confidence, 1.0);
        assert_eq!(annotations[1].region.x, 10.0);
    }

    #[test]
    fn test_process_frame_unknown_face() {
        let g = gallery();
        let annotations =
            process_frame(&mut service(), &g, &EuclideanMatcher, &frame(1, 255), &LoopOptions::default()).unwrap();
        assert_eq!(annotations.len(), 1);
        assert!(!annotations[0].result.is_known());
    }

    #[test]
    fn test_process_frame_rescales_regions() {
        let g = gallery();
        let options = LoopOptions { detect_scale: 0.5, ..LoopOptions::default() };
        let annotations = process_frame(&mut service(), &g, &EuclideanMatcher, &frame(2, 0), &options).unwrap();
        assert_eq!(annotations[1].region.x, 20.0);
        assert_eq!(annotations[1].region.width, 20.0);
    }

    #[test]
    fn test_process_every_samples_frames() {
        let g = gallery();
        let options = LoopOptions { process_every: 2, ..LoopOptions::default() };
        let fl = FrameLoop::new(&g, EuclideanMatcher, options).unwrap();
        let mut source = VecSource::new((0..5).map(|_| Ok(frame(1, 0))).collect());
        let mut svc = service();
        let mut sink = RecordingSink::default();

        let (stats, reason) = fl.run(&mut source, &mut svc, &mut sink).unwrap();

        assert_eq!(reason, StopReason::EndOfStream);
        assert_eq!(stats.frames_seen, 5);
        assert_eq!(stats.frames_processed, 2);
        assert_eq!(svc.calls, 2);
        let processed: Vec<bool> = sink.presented.iter().map(|(p, _)| *p).collect();
        assert_eq!(processed, [false, true, false, true, false]);
        assert!(sink.presented[0].1.is_empty());
        assert_eq!(sink.presented[1].1.len(), 1);
    }

    #[test]
    fn test_frame_read_error_ends_stream() {
        let g = gallery();
        let fl = FrameLoop::new(&g, EuclideanMatcher, LoopOptions::default()).unwrap();
        let mut source = VecSource::new(vec![
            Ok(frame(1, 0)),
            Err(FrameReadError("corrupt".into())),
            Ok(frame(1, 0)),
        ]);
        let mut sink = RecordingSink::default();

        let (stats, reason) = fl.run(&mut source, &mut service(), &mut sink).unwrap();
        assert_eq!(reason, StopReason::FrameReadFailed("corrupt".into()));
        assert_eq!(stats.frames_seen, 1);
        assert_eq!(stats.faces_known, 1);
    }

    #[test]
    fn test_sink_quit() {
        let g = gallery();
        let fl = FrameLoop::new(&g, EuclideanMatcher, LoopOptions::default()).unwrap();
        let mut source = VecSource::new((0..10).map(|_| Ok(frame(1, 255))).collect());
        let mut sink = RecordingSink { quit_after: Some(3), ..Default::default() };

        let (stats, reason) = fl.run(&mut source, &mut service(), &mut sink).unwrap();
        assert_eq!(reason, StopReason::SinkQuit);
        assert_eq!(stats.frames_seen, 3);
        assert_eq!(stats.faces_unknown, 3);
    }

    #[test]
    fn test_stop_signal_checked_before_reading() {
        let g = gallery();
        let stop = StopSignal::new();
        let fl = FrameLoop::new(&g, EuclideanMatcher, LoopOptions::default())
            .unwrap()
            .with_stop_signal(stop.clone());
        stop.stop();
        let mut source = VecSource::new(vec![Ok(frame(1, 0))]);
        let mut sink = RecordingSink::default();

        let (stats, reason) = fl.run(&mut source, &mut service(), &mut sink).unwrap();
        assert_eq!(reason, StopReason::Stopped);
        assert_eq!(stats.frames_seen, 0);
        assert_eq!(source.frames.len(), 1);
    }

    #[test]
    fn test_service_error_is_surfaced() {
        let g = gallery();
        let fl = FrameLoop::new(&g, EuclideanMatcher, LoopOptions::default()).unwrap();
        let mut source = VecSource::new(vec![Ok(RgbImage::from_pixel(4, 4, Rgb([1, 0, 255])))]);
        let err = fl
            .run(&mut source, &mut service(), &mut RecordingSink::default())
            .unwrap_err();
        assert!(matches!(err, LoopError::Service(_)));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let g = gallery();
        let zero = LoopOptions { process_every: 0, ..LoopOptions::default() };
        assert!(matches!(FrameLoop::new(&g, EuclideanMatcher, zero), Err(LoopError::InvalidProcessEvery)));
        let scale = LoopOptions { detect_scale: 0.0, ..LoopOptions::default() };
        assert!(matches!(FrameLoop::new(&g, EuclideanMatcher, scale), Err(LoopError::InvalidDetectScale(_))));
    }

    #[test]
    fn test_invalid_tolerance_rejected() {
        let g = gallery();
        for tolerance in [-0.1, f32::NAN] {
            let opts = LoopOptions { tolerance, ..LoopOptions::default() };
            assert!(matches!(
                FrameLoop::new(&g, EuclideanMatcher, opts),
                Err(LoopError::InvalidTolerance(_))
            ));
        }
        let zero = LoopOptions { tolerance: 0.0, ..LoopOptions::default() };
        assert!(FrameLoop::new(&g, EuclideanMatcher, zero).is_ok());
    }
}
