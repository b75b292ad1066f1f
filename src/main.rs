use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use clap::Parser;
use image::RgbImage;
use log::{debug, info, warn};

use faceswap::face_landmarks::model_npy::{read_landmarks, NpyLandmarksModel};
use faceswap::frames::{Frame, FrameSink, FrameSource, ImageDirSink, InputSource};
use faceswap::utils::{FrameRate, LatestFrame};
use faceswap::{CompositeOutcome, Compositor, CompositorConfig, Config, Error, FaceLandmarksModel, LandmarkSet};

const LOG_EVERY: usize = 30;

/// Pastes a target face onto the face in every input frame.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Input image or directory of frames
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Target face image
    #[arg(short, long)]
    target: Option<PathBuf>,
    /// Landmarks of the target face, (N, 2) .npy
    #[arg(long)]
    target_landmarks: Option<PathBuf>,
    /// Landmarks of the input frames, (N, 2) or (F, N, 2) .npy
    #[arg(short, long)]
    landmarks: Option<PathBuf>,
    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long)]
    no_color_correction: bool,
    #[arg(long)]
    blend_ratio: Option<f32>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.input_source = Some(input.clone());
        }
        if let Some(target) = &self.target {
            config.target_face = Some(target.clone());
        }
        if let Some(path) = &self.target_landmarks {
            config.target_landmarks = Some(path.clone());
        }
        if let Some(path) = &self.landmarks {
            config.landmarks = Some(path.clone());
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if self.no_color_correction {
            config.color_correction = false;
        }
        if let Some(ratio) = self.blend_ratio {
            config.blend_ratio = ratio;
        }
    }
}

fn read_target(face: &Path, landmarks: &Path) -> faceswap::Result<(RgbImage, LandmarkSet)> {
    if !face.exists() {
        return Err(Error::InputNotFound(face.to_path_buf()));
    }
    let texture = image::open(face)?.to_rgb8();
    Ok((texture, read_landmarks(landmarks)?))
}

// a failed load leaves the compositor without a target, frames then pass through
fn load_target(compositor: &Compositor, config: &Config) {
    let Some(face) = &config.target_face else {
        warn!("no target face configured, frames will pass through unchanged");
        return;
    };

    let result = match &config.target_landmarks {
        Some(landmarks) => {
            read_target(face, landmarks).and_then(|(texture, l)| compositor.set_target(texture, l))
        }
        None => compositor.load_target(face),
    };

    if let Err(e) = result {
        warn!("could not load target face {}: {}", face.display(), e);
    }
}

#[derive(Debug, Default)]
struct Summary {
    frames: usize,
    composited: usize,
    missed: usize,
    failed: usize,
}

fn worker_thread(
    compositor: Compositor,
    mut source: Box<dyn FrameSource>,
    mut sink: ImageDirSink,
    latest: &LatestFrame<(usize, Frame)>,
) -> faceswap::Result<Summary> {
    let mut summary = Summary::default();
    let mut last_error = None;

    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("skipping unreadable frame: {}", e);
                last_error = Some(e);
                continue;
            }
        };

        let composition = compositor.compose_frame(&frame.image);
        match composition.outcome {
            CompositeOutcome::Composited { .. } => summary.composited += 1,
            CompositeOutcome::NoTarget | CompositeOutcome::NoFace => summary.missed += 1,
            CompositeOutcome::BlendFailed(_) => summary.failed += 1,
        }
        debug!("{}: {:?}", frame.name, composition.outcome);

        let output = Frame {
            name: frame.name,
            image: composition.image,
        };
        sink.write(&output)?;
        summary.frames += 1;
        latest.publish((summary.frames, output));
    }

    match last_error {
        Some(e) if summary.frames == 0 => Err(e),
        _ => Ok(summary),
    }
}

// drains the latest frame at its own pace and reports progress
fn monitor(latest: LatestFrame<(usize, Frame)>) {
    let mut rate = FrameRate::new(10);
    let mut logged = 0;

    loop {
        match latest.take(Duration::from_millis(500)) {
            Some((index, frame)) => {
                rate.tick(Instant::now());
                if index / LOG_EVERY > logged / LOG_EVERY {
                    logged = index;
                    match rate.get_mean() {
                        Some(fps) => info!("frame {} ({}), {:.1} fps", index, frame.name, fps),
                        None => info!("frame {} ({})", index, frame.name),
                    }
                }
            }
            None if latest.is_closed() => break,
            None => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let input = config
        .input_source
        .clone()
        .context("no input source given (--input or input_source)")?;
    let source = InputSource::from_path(&input)?.open()?;

    let detector: Box<dyn FaceLandmarksModel> = match &config.landmarks {
        Some(path) => Box::new(NpyLandmarksModel::new(path)?),
        None => {
            warn!("no frame landmarks given, no face will be found");
            Box::new(|_: &RgbImage| -> Option<LandmarkSet> { None })
        }
    };

    let compositor = Compositor::new(CompositorConfig::from(&config), detector);
    load_target(&compositor, &config);

    let sink = ImageDirSink::new(&config.output_path)?;

    let latest = LatestFrame::new();
    let producer = latest.clone();
    let worker = std::thread::spawn(move || {
        let result = worker_thread(compositor, source, sink, &producer);
        producer.close();
        result
    });

    monitor(latest);

    let summary = worker
        .join()
        .map_err(|_| anyhow!("compose thread panicked"))??;

    info!(
        "{} frames written to {} ({} composited, {} without face, {} blend failures)",
        summary.frames,
        config.output_path.display(),
        summary.composited,
        summary.missed,
        summary.failed
    );

    Ok(())
}
