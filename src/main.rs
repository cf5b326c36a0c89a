//! glyphline - text line and glyph segmentation
//!
//! Command line front end: segment a still image, replay a directory of
//! images through the live capture worker, or print the effective config.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use glyphline::config::{self, DiagnosticsConfig, EngineConfig};
use glyphline::shared::SessionEvent;
use glyphline::storage;
use glyphline::vision::{annotate_lines, extract_glyphs, glyphs, pad_to_block, Segmenter};
use glyphline::{CaptureSession, Frame};

/// Text line and glyph segmentation for scanned forms and camera frames
#[derive(Parser, Debug)]
#[command(name = "glyphline")]
#[command(about = "Segment images into text lines and glyph boxes")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment a single image
    Segment {
        /// Input image
        image: PathBuf,

        /// Write an annotated copy of the input
        #[arg(long)]
        annotate: Option<PathBuf>,

        /// Write one padded crop per glyph into this directory
        #[arg(long)]
        glyph_dir: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Dump every pipeline stage (defaults to the data directory)
        #[arg(long, num_args = 0..=1)]
        diagnostics: Option<Option<PathBuf>>,
    },

    /// Replay a directory of images as a live frame source
    Stream {
        /// Directory of images, played in name order
        dir: PathBuf,

        /// Frames per second
        #[arg(long, default_value = "10")]
        fps: u32,

        /// Save the annotated result of every run into this directory
        #[arg(long)]
        annotate_dir: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    PrintConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for results
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_or_default_config(args.config.as_deref())?;

    match args.command {
        Command::Segment {
            image,
            annotate,
            glyph_dir,
            json,
            diagnostics,
        } => run_segment(config, &image, annotate, glyph_dir, json, diagnostics),
        Command::Stream { dir, fps, annotate_dir } => run_stream(config, &dir, fps, annotate_dir),
        Command::PrintConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Load configuration from the given path, the default location, or fall back to defaults
fn load_or_default_config(path: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = path {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }
    if let Ok(config_path) = storage::default_config_path() {
        if config_path.exists() {
            let config = config::load_config(&config_path)?;
            info!("Loaded configuration from {:?}", config_path);
            return Ok(config);
        }
    }
    info!("Using default configuration");
    Ok(EngineConfig::default())
}

fn load_gray(path: &Path) -> Result<image::GrayImage> {
    Ok(image::open(path)
        .with_context(|| format!("Failed to open image {:?}", path))?
        .to_luma8())
}

fn run_segment(
    mut config: EngineConfig,
    image: &Path,
    annotate: Option<PathBuf>,
    glyph_dir: Option<PathBuf>,
    json: bool,
    diagnostics: Option<Option<PathBuf>>,
) -> Result<()> {
    if let Some(dir) = diagnostics {
        let dir = match dir {
            Some(dir) => dir,
            None => storage::get_data_dir()?.join("diagnostics"),
        };
        info!("Writing stage diagnostics to {:?}", dir);
        config.vision.diagnostics = DiagnosticsConfig {
            enabled: true,
            output_dir: Some(dir),
        };
    }
    config.validate()?;

    let gray = load_gray(image)?;
    let segmenter = Segmenter::new(config.vision);
    let result = segmenter.segment(&gray);
    info!(
        "Found {} lines with {} chars in {:?}",
        result.lines.len(),
        result.char_count(),
        result.timings.total
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for (index, line) in result.lines.iter().enumerate() {
            let r = line.bounding_rect();
            println!("line {:>3}: {} chars at ({}, {}) {}x{}", index, line.len(), r.x, r.y, r.w, r.h);
        }
    }

    if let Some(path) = annotate {
        annotate_lines(&gray, &result.lines)
            .save(&path)
            .with_context(|| format!("Failed to write {:?}", path))?;
        info!("Annotated image saved to {:?}", path);
    }

    if let Some(dir) = glyph_dir {
        std::fs::create_dir_all(&dir)?;
        let crops = extract_glyphs(&gray, &result.lines);
        for (index, crop) in crops.iter().enumerate() {
            let (padded, _) = pad_to_block(&crop.image, glyphs::CLASSIFIER_BLOCK);
            let path = dir.join(format!("line{:03}-{:04}.png", crop.line, index));
            padded
                .save(&path)
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
        info!("Saved {} glyph crops to {:?}", crops.len(), dir);
    }

    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff"))
        .unwrap_or(false)
}

fn run_stream(mut config: EngineConfig, dir: &Path, fps: u32, annotate_dir: Option<PathBuf>) -> Result<()> {
    if let Some(out) = &annotate_dir {
        std::fs::create_dir_all(out)?;
        config.capture.publish_visualization = true;
    }
    config.validate()?;

    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_image(path))
        .collect();
    frames.sort();
    info!("Replaying {} frames from {:?} at {} fps", frames.len(), dir, fps);

    let mut session = CaptureSession::new(Segmenter::new(config.vision), config.capture)?;
    let events = session.subscribe();
    let sink = session.frame_sink();
    session.start()?;

    let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    for path in &frames {
        match load_gray(path) {
            Ok(gray) => {
                sink.submit(Frame::from_gray(gray));
            }
            Err(e) => warn!("Skipping {:?}: {:#}", path, e),
        }
        std::thread::sleep(interval);
        drain_events(&events, annotate_dir.as_deref());
    }

    // Let the last frame finish before shutting down
    while sink.is_dirty() {
        std::thread::sleep(interval);
    }
    session.stop()?;
    drain_events(&events, annotate_dir.as_deref());

    let stats = session.stats();
    info!(
        "Stream finished: {} submitted, {} dropped, {} runs, {} published",
        stats.frames_submitted, stats.frames_dropped, stats.runs_completed, stats.results_published
    );
    Ok(())
}

fn drain_events(events: &Receiver<SessionEvent>, annotate_dir: Option<&Path>) {
    for event in events.try_iter() {
        match event {
            SessionEvent::ResultPublished(result) => {
                println!(
                    "#{:05}: {} lines, {} chars in {:?}",
                    result.sequence,
                    result.lines.len(),
                    result.lines.iter().map(|l| l.len()).sum::<usize>(),
                    result.timings.total
                );
                if let (Some(dir), Some(image)) = (annotate_dir, &result.visualization) {
                    let path = dir.join(format!("{:05}.png", result.sequence));
                    if let Err(e) = image.save(&path) {
                        warn!("Failed to write {:?}: {}", path, e);
                    }
                }
            }
            SessionEvent::FrameFailed(reason) => warn!("Frame failed: {}", reason),
            SessionEvent::StateChanged(state) => info!("Capture session {:?}", state),
            SessionEvent::WorkerStopped => info!("Capture worker stopped"),
        }
    }
}
