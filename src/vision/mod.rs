//! Vision Layer
//!
//! Text line segmentation. A grayscale image goes through:
//! - stable region detection
//! - size histogram filtering
//! - greedy line seeding
//! - guided tightening of every seeded char
//! - sideways line growth
//!
//! and comes out as lines of glyph boxes ready to be cropped for a classifier.

pub mod annotate;
pub mod detection;
pub mod geometry;
pub mod glyphs;
pub mod growth;
pub mod histogram;
pub mod preprocess;
pub mod refine;
pub mod seeding;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::capture::frame::Frame;
use crate::config::DiagnosticsConfig;
use crate::error::FrameError;

pub use annotate::{annotate_lines, Stage, StageDump};
pub use detection::{DetectorConfig, Polarity, RegionDetector};
pub use geometry::{Line, Rect};
pub use glyphs::{extract_glyphs, pad_to_block, GlyphCrop};
pub use growth::{GrowthConfig, LineGrower};
pub use histogram::{HistogramConfig, SizeHistogram};
pub use refine::{CharacterRefiner, Direction, RefineMode, RefinerConfig, Refinement};
pub use seeding::{LineSeeder, SeedingConfig};

/// Configuration for the segmentation pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Stable region detection
    pub detector: DetectorConfig,
    /// Size filter
    pub histogram: HistogramConfig,
    /// Line seeding
    pub seeding: SeedingConfig,
    /// Glyph refinement
    pub refiner: RefinerConfig,
    /// Line growth
    pub growth: GrowthConfig,
    /// Per-stage image dumps
    pub diagnostics: DiagnosticsConfig,
}

/// Wall time spent in each stage of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    pub detect: Duration,
    pub filter: Duration,
    pub seed: Duration,
    pub tighten: Duration,
    pub grow: Duration,
    pub total: Duration,
}

/// Output of one pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SegmentationResult {
    /// Committed lines in seeding order
    pub lines: Vec<Line>,
    /// Considered regions not covered by any line
    pub leftover: BTreeSet<Rect>,
    /// Per-stage timings
    pub timings: StageTimings,
}

impl SegmentationResult {
    pub fn char_count(&self) -> usize {
        self.lines.iter().map(Line::len).sum()
    }
}

/// The full segmentation pipeline
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: VisionConfig,
    detector: RegionDetector,
    seeder: LineSeeder,
    refiner: CharacterRefiner,
    grower: LineGrower,
    dump: Option<StageDump>,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(VisionConfig::default())
    }
}

impl Segmenter {
    pub fn new(config: VisionConfig) -> Self {
        let refiner = CharacterRefiner::new(config.refiner.clone());
        Self {
            detector: RegionDetector::new(config.detector.clone()),
            seeder: LineSeeder::new(config.seeding.clone()),
            grower: LineGrower::new(config.growth.clone(), refiner.clone()),
            refiner,
            dump: StageDump::from_config(&config.diagnostics),
            config,
        }
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Replace the configuration, rebuilding every stage
    pub fn set_config(&mut self, config: VisionConfig) {
        *self = Self::new(config);
    }

    /// Segment a frame after converting it to grayscale
    pub fn segment_frame(&self, frame: &Frame) -> Result<SegmentationResult, FrameError> {
        let gray = frame.to_gray()?;
        Ok(self.segment(&gray))
    }

    /// Run every stage on `gray`
    pub fn segment(&self, gray: &GrayImage) -> SegmentationResult {
        let start = Instant::now();
        let mut timings = StageTimings::default();

        let regions = self.detector.detect(gray);
        timings.detect = start.elapsed();

        let stage = Instant::now();
        let histogram = SizeHistogram::from_regions(&regions);
        let ratio = self.config.histogram.consider_ratio;
        let considered = histogram.considered(&regions, ratio);
        timings.filter = stage.elapsed();

        if let Some(dump) = &self.dump {
            dump.save(
                Stage::Regions,
                &annotate::annotate_regions(gray, &regions, annotate::BOUNDING_COLOR),
            );
            dump.save(
                Stage::Considered,
                &annotate::annotate_regions(gray, &considered, annotate::CONSIDERED_COLOR),
            );
            dump.save(
                Stage::Histogram,
                &annotate::render_histogram(&histogram, histogram.consider_min(ratio)),
            );
        }

        let stage = Instant::now();
        let mut lines = self.seeder.seed(&considered);
        timings.seed = stage.elapsed();
        if let Some(dump) = &self.dump {
            dump.save_lines(Stage::Seeded, gray, &lines);
        }

        let stage = Instant::now();
        for index in 0..lines.len() {
            let others: Vec<Rect> = lines
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .flat_map(|(_, other)| other.chars().iter().copied())
                .collect();
            self.refiner.tighten_line(gray, &mut lines[index], &others);
        }
        timings.tighten = stage.elapsed();
        if let Some(dump) = &self.dump {
            dump.save_lines(Stage::Tightened, gray, &lines);
        }

        let stage = Instant::now();
        self.grower.grow_lines(gray, &mut lines);
        timings.grow = stage.elapsed();
        if let Some(dump) = &self.dump {
            dump.save_lines(Stage::Grown, gray, &lines);
        }

        let leftover: BTreeSet<Rect> = considered
            .into_iter()
            .filter(|r| !lines.iter().any(|line| line.bounding_rect().overlaps(r)))
            .collect();

        timings.total = start.elapsed();
        debug!(
            "Segmented {}x{} image: {} regions, {} lines, {} leftover in {:?} \
             (detect {:?}, filter {:?}, seed {:?}, tighten {:?}, grow {:?})",
            gray.width(),
            gray.height(),
            regions.len(),
            lines.len(),
            leftover.len(),
            timings.total,
            timings.detect,
            timings.filter,
            timings.seed,
            timings.tighten,
            timings.grow
        );

        SegmentationResult {
            lines,
            leftover,
            timings,
        }
    }
}
