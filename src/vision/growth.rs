//! Line growth
//!
//! Extends seeded lines sideways to recover glyphs the detector missed or the
//! size filter dropped. Each line is grown to the right (including the gaps
//! between its own chars) and then to the left, probing windows one average
//! glyph wide through the refiner in estimate mode.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::geometry::{Line, Rect};
use super::refine::{crop_gray, CharacterRefiner, Direction, RefineMode, Refinement};
use crate::config::policy;

/// Configuration for line growth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Probe window width as a multiple of the average glyph width
    pub probe_width_ratio: f32,
    /// A gap narrower than `avg_width / divisor` has no room for a glyph
    pub min_estimate_divisor: i32,
    /// Rows added above and below the average rect
    pub vertical_pad: i32,
    /// Gap kept between a found glyph and the next probe
    pub char_margin: i32,
    /// Growth stops once this many average widths pass without a glyph
    pub max_bridge_ratio: f32,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            probe_width_ratio: policy::PROBE_WIDTH_RATIO,
            min_estimate_divisor: policy::MIN_ESTIMATE_WIDTH_DIVISOR,
            vertical_pad: policy::PROBE_VERTICAL_PAD,
            char_margin: policy::CHAR_MARGIN,
            max_bridge_ratio: policy::MAX_GAP_WIDTH_RATIO,
        }
    }
}

/// Per-line probe geometry, fixed for both passes
#[derive(Debug, Clone)]
struct Probe {
    /// Rows every window spans
    band: Rect,
    /// Chars of other lines sharing the band
    obstacles: Vec<Rect>,
    width: i32,
    min_estimate: i32,
    bridge: i32,
    image_width: i32,
}

/// Grows lines with the character refiner
#[derive(Debug, Clone, Default)]
pub struct LineGrower {
    config: GrowthConfig,
    refiner: CharacterRefiner,
}

impl LineGrower {
    pub fn new(config: GrowthConfig, refiner: CharacterRefiner) -> Self {
        Self { config, refiner }
    }

    /// Grow every line in place, right pass first. Returns the number of
    /// inserted chars.
    pub fn grow_lines(&self, gray: &GrayImage, lines: &mut [Line]) -> usize {
        let mut inserted = 0;
        for index in 0..lines.len() {
            let Some(probe) = self.probe_for(gray, lines, index) else {
                continue;
            };
            let line = &mut lines[index];
            let right = self.grow_right(gray, line, &probe);
            let left = self.grow_left(gray, line, &probe);
            if right + left > 0 {
                trace!(
                    "Line grower: line {} gained {} right, {} left -> {:?}",
                    index,
                    right,
                    left,
                    line.bounding_rect()
                );
            }
            inserted += right + left;
        }
        debug!("Line grower: {} chars added over {} lines", inserted, lines.len());
        inserted
    }

    fn probe_for(&self, gray: &GrayImage, lines: &[Line], index: usize) -> Option<Probe> {
        let line = &lines[index];
        let average = line.average_rect();
        let image = Rect::new(0, 0, gray.width() as i32, gray.height() as i32);
        let pad = self.config.vertical_pad;
        let band = Rect::new(0, average.y - pad, image.w, average.h + 2 * pad).clamp_to(&image)?;

        let obstacles = lines
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .flat_map(|(_, other)| other.chars().iter())
            .filter(|r| r.overlaps_rows(&band))
            .copied()
            .collect();

        let divisor = self.config.min_estimate_divisor.max(1);
        Some(Probe {
            band,
            obstacles,
            width: ((average.w as f32 * self.config.probe_width_ratio) as i32).max(1),
            min_estimate: (average.w / divisor).max(1),
            bridge: (average.w as f32 * self.config.max_bridge_ratio) as i32,
            image_width: image.w,
        })
    }

    fn locate(&self, gray: &GrayImage, window: Rect, probe: &Probe, direction: Direction) -> Refinement {
        let crop = crop_gray(gray, &window);
        self.refiner.locate_character(
            &crop,
            RefineMode::Estimate {
                min_width: probe.min_estimate,
                direction,
            },
        )
    }

    fn grow_right(&self, gray: &GrayImage, line: &mut Line, probe: &Probe) -> usize {
        let margin = self.config.char_margin;
        let first = line.first_char();
        let mut cursor = first.right() + margin;
        let mut last_edge = first.right();
        let mut inserted = 0;

        loop {
            let next_inline = line.chars().iter().find(|c| c.right() > cursor).copied();

            // Already at or inside the next own char: step over it
            if let Some(next) = next_inline {
                if next.x <= cursor {
                    cursor = next.right() + margin;
                    last_edge = next.right();
                    continue;
                }
            }

            let obstacle = probe
                .obstacles
                .iter()
                .filter(|r| r.right() > cursor)
                .map(|r| r.x)
                .chain(next_inline.map(|r| r.x))
                .fold(probe.image_width, i32::min);
            let room = obstacle - cursor;
            let blocked_by_inline = next_inline.is_some_and(|r| r.x == obstacle);

            if cursor - last_edge > probe.bridge || room < probe.min_estimate {
                match next_inline {
                    Some(next) if blocked_by_inline || cursor - last_edge > probe.bridge => {
                        cursor = next.right() + margin;
                        last_edge = next.right();
                        continue;
                    }
                    _ => break,
                }
            }

            let width = probe.width.min(room);
            let window = Rect::new(cursor, probe.band.y, width, probe.band.h);
            match self.locate(gray, window, probe, Direction::Right) {
                Refinement::Found(found) => {
                    let mut found = found.translate(window.x, window.y);
                    // Glyph cut by the probe width: look again from its left edge
                    if width < room && found.right() == window.right() && found.x > window.x {
                        let restart = Rect::new(found.x, window.y, probe.width.min(obstacle - found.x), window.h);
                        if let Refinement::Found(again) = self.locate(gray, restart, probe, Direction::Right) {
                            found = again.translate(restart.x, restart.y);
                        }
                    }
                    line.insert_char(found);
                    inserted += 1;
                    cursor = found.right() + margin;
                    last_edge = found.right();
                }
                Refinement::Empty { searched } => {
                    cursor = (window.x + searched.right()).max(cursor + 1);
                }
            }
        }
        inserted
    }

    fn grow_left(&self, gray: &GrayImage, line: &mut Line, probe: &Probe) -> usize {
        let margin = self.config.char_margin;
        let first = line.first_char();
        // Exclusive right edge of the free space
        let mut limit = first.x - margin;
        let mut last_edge = first.x;
        let mut inserted = 0;

        loop {
            let floor = probe
                .obstacles
                .iter()
                .filter(|r| r.x < limit)
                .map(|r| r.right())
                .fold(0, i32::max);
            let room = limit - floor;
            if last_edge - limit > probe.bridge || room < probe.min_estimate {
                break;
            }

            let width = probe.width.min(room);
            let window = Rect::new(limit - width, probe.band.y, width, probe.band.h);
            match self.locate(gray, window, probe, Direction::Left) {
                Refinement::Found(found) => {
                    let mut found = found.translate(window.x, window.y);
                    if width < room && found.x == window.x && found.right() < window.right() {
                        let right = found.right();
                        let span = probe.width.min(right - floor);
                        let restart = Rect::new(right - span, window.y, span, window.h);
                        if let Refinement::Found(again) = self.locate(gray, restart, probe, Direction::Left) {
                            found = again.translate(restart.x, restart.y);
                        }
                    }
                    line.insert_char(found);
                    inserted += 1;
                    limit = found.x - margin;
                    last_edge = found.x;
                }
                Refinement::Empty { searched } => {
                    limit = (window.x + searched.x).min(limit - 1);
                }
            }
        }
        inserted
    }
}
