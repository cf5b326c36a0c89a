//! Stable region detection
//!
//! Finds blobs of roughly uniform intensity that keep the same extent across
//! a sweep of binarization levels, in the spirit of MSER. Only the bounding
//! boxes are kept; downstream stages never look at the region pixels.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::geometry::Rect;
use crate::config::policy;

/// Which intensity polarity counts as ink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Dark glyphs on a light background (printed forms)
    #[default]
    DarkOnLight,
    /// Light glyphs on a dark background
    LightOnDark,
    /// Sweep both polarities
    Both,
}

/// Configuration for the region detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Intensity polarity of the text
    pub polarity: Polarity,
    /// Distance between consecutive binarization levels
    pub threshold_step: u8,
    /// Consecutive levels a box must survive to count as stable
    pub stable_levels: usize,
    /// Smallest region area in pixels
    pub min_area: u32,
    /// Largest region area as a fraction of the image area
    pub max_area_ratio: f32,
    /// Regions narrower than this are dropped
    pub min_glyph_width: i32,
    /// Regions shorter than this are dropped
    pub min_glyph_height: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            polarity: Polarity::DarkOnLight,
            threshold_step: policy::DETECTOR_THRESHOLD_STEP,
            stable_levels: policy::DETECTOR_STABLE_LEVELS,
            min_area: policy::DETECTOR_MIN_AREA,
            max_area_ratio: policy::DETECTOR_MAX_AREA_RATIO,
            min_glyph_width: policy::MIN_GLYPH_WIDTH,
            min_glyph_height: policy::MIN_GLYPH_HEIGHT,
        }
    }
}

/// Per-label accumulator for one binarization level
#[derive(Debug, Clone, Copy)]
struct Component {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    area: u32,
}

impl Component {
    fn new(x: i32, y: i32) -> Self {
        Self {
            left: x,
            top: y,
            right: x,
            bottom: y,
            area: 0,
        }
    }

    fn add(&mut self, x: i32, y: i32) {
        self.left = self.left.min(x);
        self.top = self.top.min(y);
        self.right = self.right.max(x);
        self.bottom = self.bottom.max(y);
        self.area += 1;
    }

    fn rect(&self) -> Rect {
        Rect::new(
            self.left,
            self.top,
            self.right - self.left + 1,
            self.bottom - self.top + 1,
        )
    }
}

/// Candidate glyph detector
#[derive(Debug, Clone, Default)]
pub struct RegionDetector {
    config: DetectorConfig,
}

impl RegionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Stable regions that pass the minimum glyph size filter
    pub fn detect(&self, gray: &GrayImage) -> BTreeSet<Rect> {
        let raw = self.detect_raw(gray);
        let total = raw.len();
        let filtered: BTreeSet<Rect> = raw
            .into_iter()
            .filter(|r| r.w >= self.config.min_glyph_width && r.h >= self.config.min_glyph_height)
            .collect();
        debug!(
            "Region detector: {} stable regions, {} after {}x{} size filter",
            total,
            filtered.len(),
            self.config.min_glyph_width,
            self.config.min_glyph_height
        );
        filtered
    }

    /// All stable regions regardless of size
    pub fn detect_raw(&self, gray: &GrayImage) -> BTreeSet<Rect> {
        let mut regions = BTreeSet::new();
        match self.config.polarity {
            Polarity::DarkOnLight => self.sweep(gray, false, &mut regions),
            Polarity::LightOnDark => self.sweep(gray, true, &mut regions),
            Polarity::Both => {
                self.sweep(gray, false, &mut regions);
                self.sweep(gray, true, &mut regions);
            }
        }
        regions
    }

    fn sweep(&self, gray: &GrayImage, inverted: bool, regions: &mut BTreeSet<Rect>) {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let image_area = width as f64 * height as f64;
        let max_area = (self.config.max_area_ratio as f64 * image_area) as u32;
        let step = self.config.threshold_step.max(1) as u16;
        let needed = self.config.stable_levels.max(1);

        // Boxes seen at the previous level and how many levels in a row they lasted
        let mut runs: BTreeMap<Rect, usize> = BTreeMap::new();

        let mut level = step;
        while level <= 255 {
            let components = self.components_at(gray, level as u8, inverted);
            let mut next_runs = BTreeMap::new();
            for component in components {
                let rect = component.rect();
                let run = runs.get(&rect).copied().unwrap_or(0) + 1;
                if run >= needed && component.area >= self.config.min_area && component.area <= max_area {
                    regions.insert(rect);
                }
                next_runs.insert(rect, run);
            }
            runs = next_runs;
            level += step;
        }
    }

    /// 8-connected components of the ink at one binarization level
    fn components_at(&self, gray: &GrayImage, level: u8, inverted: bool) -> Vec<Component> {
        let mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let value = gray.get_pixel(x, y).0[0];
            let ink = if inverted {
                value > 255 - level
            } else {
                value < level
            };
            Luma([if ink { 255 } else { 0 }])
        });

        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));
        let mut components: BTreeMap<u32, Component> = BTreeMap::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0];
            if label == 0 {
                continue;
            }
            let (x, y) = (x as i32, y as i32);
            components
                .entry(label)
                .or_insert_with(|| Component::new(x, y))
                .add(x, y);
        }
        components.into_values().collect()
    }
}
