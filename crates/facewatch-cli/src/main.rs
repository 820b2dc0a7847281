use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facewatch_core::{
    load_image, overlay, process_frame, Annotation, EuclideanMatcher, FrameLoop, Gallery, GalleryBuilder, GalleryError,
    LoopOptions, LoopStats, OnnxFaceService, StopReason, StopSignal,
};
use facewatch_hw::{Camera, CaptureOptions, VideoSource};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod sink;

use config::Config;
use sink::HeadlessSink;

#[derive(Parser)]
#[command(name = "facewatch", about = "Real-time known-face recognition")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    /// Known-faces root: one subdirectory of reference images per person
    #[arg(long, global = true)]
    gallery: Option<PathBuf>,
    /// Maximum embedding distance for a match (lower is stricter)
    #[arg(long, global = true)]
    tolerance: Option<f32>,
    /// Also label images directly under the gallery root by file name
    #[arg(long, global = true)]
    by_filename: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize faces in a live or recorded video source
    Run {
        /// Camera index, /dev/videoN, image directory, .mjpg file or still image
        #[arg(short, long)]
        source: Option<String>,
        /// Run recognition on every Nth frame
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        process_every: Option<u32>,
        /// Downscale factor applied before detection (0 < s <= 1)
        #[arg(long)]
        detect_scale: Option<f32>,
        /// Requested capture width
        #[arg(long, default_value_t = 640)]
        width: u32,
        /// Requested capture height
        #[arg(long, default_value_t = 480)]
        height: u32,
        /// Write annotated frames to this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,
    },
    /// Build the gallery and summarize it
    Gallery {
        /// Dump every entry as JSON
        #[arg(long)]
        json: bool,
    },
    /// Match faces in still images and print the results as JSON
    Identify {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Write annotated copies of the images to this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List V4L2 capture devices
    Devices {
        /// Capture one frame from each device and report its brightness
        #[arg(long)]
        probe: bool,
    },
}

#[derive(Serialize)]
struct IdentifyReport<'a> {
    image: &'a Path,
    faces: Vec<Annotation>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.common.model_dir {
        config.model_dir = dir;
    }
    if let Some(dir) = cli.common.gallery {
        config.gallery_dir = dir;
    }
    if let Some(tolerance) = cli.common.tolerance {
        config.tolerance = tolerance;
    }
    let by_filename = cli.common.by_filename;

    match cli.command {
        Commands::Run {
            source,
            process_every,
            detect_scale,
            width,
            height,
            output,
            max_frames,
        } => {
            if let Some(source) = source {
                config.source = source;
            }
            if let Some(n) = process_every {
                config.process_every = n;
            }
            if let Some(scale) = detect_scale {
                config.detect_scale = scale;
            }
            let sink = HeadlessSink::new(output, max_frames).context("failed to create output directory")?;
            run(config, by_filename, CaptureOptions { width, height }, sink).await?;
        }
        Commands::Gallery { json } => {
            let (gallery, _) = load_gallery(&config, by_filename)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&gallery)?);
            } else {
                print_loaded(&gallery);
                for (label, count) in gallery.label_histogram() {
                    println!("  {label}: {count}");
                }
            }
        }
        Commands::Identify { images, output } => {
            identify(&config, by_filename, &images, output.as_deref())?;
        }
        Commands::Devices { probe } => devices(probe),
    }

    Ok(())
}

/// Run the recognition loop on a blocking task until it finishes or Ctrl-C arrives.
async fn run(config: Config, by_filename: bool, capture: CaptureOptions, sink: HeadlessSink) -> Result<()> {
    let stop = StopSignal::new();
    let worker_stop = stop.clone();
    let mut task = tokio::task::spawn_blocking(move || recognize(&config, by_filename, capture, sink, worker_stop));

    let (stats, reason) = tokio::select! {
        joined = &mut task => joined??,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupt received, stopping");
            stop.stop();
            task.await??
        }
    };

    println!(
        "{} frames, {} processed, {} known faces, {} unknown faces ({})",
        stats.frames_seen,
        stats.frames_processed,
        stats.faces_known,
        stats.faces_unknown,
        describe_stop(&reason)
    );
    Ok(())
}

fn recognize(
    config: &Config,
    by_filename: bool,
    capture: CaptureOptions,
    mut sink: HeadlessSink,
    stop: StopSignal,
) -> Result<(LoopStats, StopReason)> {
    let source: VideoSource = config.source.parse()?;
    let (gallery, mut service) = load_gallery(config, by_filename)?;
    print_loaded(&gallery);

    let mut frames = source.open(capture)?;
    let frame_loop = FrameLoop::new(&gallery, EuclideanMatcher, config.loop_options())?.with_stop_signal(stop);
    let outcome = frame_loop.run(&mut frames, &mut service, &mut sink)?;
    if sink.frames_written() > 0 {
        tracing::info!(frames = sink.frames_written(), "annotated frames written");
    }
    Ok(outcome)
}

/// Load the models and build the gallery. A missing gallery root fails before
/// the models are loaded.
fn load_gallery(config: &Config, by_filename: bool) -> Result<(Gallery, OnnxFaceService)> {
    if !config.gallery_dir.exists() {
        return Err(GalleryError::DirectoryNotFound(config.gallery_dir.clone()).into());
    }
    let service = OnnxFaceService::load(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    let mut builder = GalleryBuilder::new(service).include_root_files(by_filename);
    let gallery = builder.build(&config.gallery_dir)?;
    Ok((gallery, builder.into_service()))
}

fn print_loaded(gallery: &Gallery) {
    println!(
        "Loaded {} encodings from {} people",
        gallery.len(),
        gallery.label_count()
    );
}

fn identify(config: &Config, by_filename: bool, images: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let (gallery, mut service) = load_gallery(config, by_filename)?;
    if let Some(dir) = output {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let options = LoopOptions {
        tolerance: config.tolerance,
        ..LoopOptions::default()
    };
    options.validate()?;

    let mut reports = Vec::with_capacity(images.len());
    for path in images {
        let mut frame = match load_image(path) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping undecodable image");
                continue;
            }
        };
        let faces = process_frame(&mut service, &gallery, &EuclideanMatcher, &frame, &options)?;

        if let (Some(dir), Some(name)) = (output, path.file_name()) {
            overlay::annotate(&mut frame, &faces);
            let target = dir.join(name);
            frame
                .save(&target)
                .with_context(|| format!("failed to write {}", target.display()))?;
        }
        reports.push(IdentifyReport { image: path, faces });
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn devices(probe: bool) {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }

    for info in devices {
        println!("{}  {} ({}, {})", info.path, info.name, info.driver, info.bus);
        if !probe {
            continue;
        }
        match Camera::open(&info.path, CaptureOptions::default()).and_then(|mut cam| {
            let frame = cam.capture_frame()?;
            Ok((cam.width, cam.height, cam.pixel_format, frame.avg_brightness()))
        }) {
            Ok((w, h, format, brightness)) => {
                println!("    {w}x{h} {format:?}, avg brightness {brightness:.1}");
            }
            Err(e) => println!("    probe failed: {e}"),
        }
    }
}

fn describe_stop(reason: &StopReason) -> String {
    match reason {
        StopReason::EndOfStream => "end of stream".to_string(),
        StopReason::FrameReadFailed(e) => format!("frame read failed: {e}"),
        StopReason::SinkQuit => "frame limit reached".to_string(),
        StopReason::Stopped => "interrupted".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["facewatch", "run", "--tolerance", "0.6", "--source", "clip.mjpg"]).unwrap();
        assert_eq!(cli.common.tolerance, Some(0.6));
        assert!(matches!(cli.command, Commands::Run { source: Some(ref s), .. } if s == "clip.mjpg"));
    }

    #[test]
    fn test_process_every_zero_rejected() {
        assert!(Cli::try_parse_from(["facewatch", "run", "--process-every", "0"]).is_err());
    }

    #[test]
    fn test_identify_requires_image() {
        assert!(Cli::try_parse_from(["facewatch", "identify"]).is_err());
    }

    #[test]
    fn test_missing_gallery_fails_before_models() {
        let config = Config {
            model_dir: PathBuf::from("/nonexistent/models"),
            gallery_dir: PathBuf::from("/nonexistent/known-faces"),
            source: "0".into(),
            tolerance: 0.5,
            process_every: 2,
            detect_scale: 0.5,
        };
        let err = load_gallery(&config, false).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<GalleryError>(),
            Some(GalleryError::DirectoryNotFound(_))
        ));
    }
}
