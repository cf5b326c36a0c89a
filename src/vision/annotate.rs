//! Visualisation of segmentation results and per-stage diagnostic dumps

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::geometry::{Line, Rect};
use super::histogram::SizeHistogram;
use crate::config::DiagnosticsConfig;

/// Char outline colours, cycled by line index
pub const LINE_PALETTE: [Rgb<u8>; 9] = [
    Rgb([0, 0, 0]),
    Rgb([255, 255, 255]),
    Rgb([255, 0, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 255, 0]),
    Rgb([0, 255, 255]),
    Rgb([255, 0, 255]),
    Rgb([119, 119, 119]),
];

/// Line bounding rects are always drawn in white
pub const BOUNDING_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
/// Regions that survived the size filter
pub const CONSIDERED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const HISTOGRAM_BAR_WIDTH: u32 = 16;
const HISTOGRAM_UNIT_HEIGHT: u32 = 24;

pub fn line_color(index: usize) -> Rgb<u8> {
    LINE_PALETTE[index % LINE_PALETTE.len()]
}

/// Outline `rect`, silently skipping empty ones
pub fn draw_rect(canvas: &mut RgbImage, rect: &Rect, color: Rgb<u8>) {
    if rect.is_empty() {
        return;
    }
    let outline = imageproc::rect::Rect::at(rect.x, rect.y).of_size(rect.w as u32, rect.h as u32);
    draw_hollow_rect_mut(canvas, outline, color);
}

fn to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    })
}

/// Chars in their line's palette colour, bounding rects in white
pub fn annotate_lines(gray: &GrayImage, lines: &[Line]) -> RgbImage {
    let mut canvas = to_rgb(gray);
    for (index, line) in lines.iter().enumerate() {
        let color = line_color(index);
        for rect in line.chars() {
            draw_rect(&mut canvas, rect, color);
        }
        draw_rect(&mut canvas, &line.bounding_rect(), BOUNDING_COLOR);
    }
    canvas
}

/// Every region outlined in one colour
pub fn annotate_regions(gray: &GrayImage, regions: &BTreeSet<Rect>, color: Rgb<u8>) -> RgbImage {
    let mut canvas = to_rgb(gray);
    for rect in regions {
        draw_rect(&mut canvas, rect, color);
    }
    canvas
}

/// Bar chart of the size buckets in key order with the consider cut-off in red.
///
/// Every 10th/50th/100th bar is tinted so bucket positions can be read off.
pub fn render_histogram(histogram: &SizeHistogram, consider_min: usize) -> RgbImage {
    let Some((_, max)) = histogram.dominant() else {
        return RgbImage::new(1, 1);
    };
    let buckets = histogram.buckets();
    let width = buckets.len() as u32 * HISTOGRAM_BAR_WIDTH;
    let height = max as u32 * HISTOGRAM_UNIT_HEIGHT;
    let mut canvas = RgbImage::new(width, height);

    for (at, &count) in buckets.values().enumerate() {
        let color = match at {
            0 => Rgb([255, 255, 255]),
            n if n % 100 == 0 => Rgb([0, 0, 255]),
            n if n % 50 == 0 => Rgb([0, 255, 0]),
            n if n % 10 == 0 => Rgb([255, 0, 0]),
            _ => Rgb([255, 255, 255]),
        };
        let bar = count as u32 * HISTOGRAM_UNIT_HEIGHT;
        let outline = imageproc::rect::Rect::at((at as u32 * HISTOGRAM_BAR_WIDTH) as i32, (height - bar) as i32)
            .of_size(HISTOGRAM_BAR_WIDTH, bar);
        draw_hollow_rect_mut(&mut canvas, outline, color);
    }

    let cut = max.saturating_sub(consider_min) as f32 * HISTOGRAM_UNIT_HEIGHT as f32;
    draw_line_segment_mut(&mut canvas, (0.0, cut), ((width - 1) as f32, cut), Rgb([255, 0, 0]));
    canvas
}

/// Pipeline stages that can be dumped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Regions,
    Considered,
    Histogram,
    Seeded,
    Tightened,
    Grown,
}

impl Stage {
    pub fn file_name(&self) -> &'static str {
        match self {
            Stage::Regions => "0-regions.png",
            Stage::Considered => "1-considered.png",
            Stage::Histogram => "2-histogram.png",
            Stage::Seeded => "3-seeded.png",
            Stage::Tightened => "4-tightened.png",
            Stage::Grown => "5-grown.png",
        }
    }
}

/// Writes stage images to the diagnostics directory.
///
/// Diagnostics are a side channel: failures are logged and never abort a run.
#[derive(Debug, Clone)]
pub struct StageDump {
    dir: PathBuf,
}

impl StageDump {
    /// `None` when diagnostics are disabled or have no directory
    pub fn from_config(config: &DiagnosticsConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let dir = config.output_dir.clone()?;
        Some(Self { dir })
    }

    pub fn save(&self, stage: Stage, image: &RgbImage) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("Failed to create diagnostics directory {:?}: {}", self.dir, e);
            return;
        }
        let path = self.dir.join(stage.file_name());
        match image.save(&path) {
            Ok(()) => debug!("Saved {:?} diagnostics to {:?}", stage, path),
            Err(e) => warn!("Failed to save {:?} diagnostics to {:?}: {}", stage, path, e),
        }
    }

    pub fn save_lines(&self, stage: Stage, gray: &GrayImage, lines: &[Line]) {
        self.save(stage, &annotate_lines(gray, lines));
    }
}
