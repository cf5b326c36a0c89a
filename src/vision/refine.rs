//! Glyph boundary refinement
//!
//! `locate_character` turns a grayscale crop into a tight glyph box. It runs in
//! one of two modes:
//!
//! - **Estimate**: no prior box. Used by line growth to probe empty space next
//!   to a line; the growth direction decides which edge is trusted.
//! - **Guided**: a detector box known to lie inside the crop. The box is only
//!   ever grown, never shrunk, towards neighbouring ink.
//!
//! Both modes share the same steps: Otsu binarization, isolated pixel removal,
//! a coarse column bound, a 3x3 opening and a fine bound on the opened image.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, trace};

use super::geometry::{Line, Rect};
use super::preprocess::{
    binarize_otsu, crop_columns, erase_isolated_pixels, expand_from_guide, foreground_span,
    open_square, Projection,
};
use crate::config::policy;

/// Side of the line a probe window extends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

/// How `locate_character` should search the crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineMode {
    /// Unconstrained search; `min_width` columns from the near edge are always kept
    Estimate { min_width: i32, direction: Direction },
    /// Grow from a known box lying fully inside the crop
    Guided(Rect),
}

/// Outcome of a refinement, in crop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refinement {
    /// Tight glyph box
    Found(Rect),
    /// No glyph; `searched` is the part of the crop that can be skipped
    Empty { searched: Rect },
}

impl Refinement {
    pub fn found(&self) -> Option<Rect> {
        match self {
            Refinement::Found(rect) => Some(*rect),
            Refinement::Empty { .. } => None,
        }
    }
}

/// Configuration for the character refiner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Rows/columns with fewer ink pixels are noise
    pub noise_threshold: u32,
    /// Crops narrower than this are rejected before the opening
    pub min_opening_width: i32,
    /// Refined glyphs shorter than this are rejected
    pub min_char_height: i32,
    /// Radius of the square structuring element
    pub opening_radius: u8,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            noise_threshold: policy::NOISE_PIXEL_THRESHOLD,
            min_opening_width: policy::MIN_OPENING_WIDTH,
            min_char_height: policy::MIN_CHAR_HEIGHT,
            opening_radius: policy::OPENING_RADIUS,
        }
    }
}

/// Tightens glyph boxes against the actual ink
#[derive(Debug, Clone, Default)]
pub struct CharacterRefiner {
    config: RefinerConfig,
}

impl CharacterRefiner {
    pub fn new(config: RefinerConfig) -> Self {
        Self { config }
    }

    /// Locate the glyph inside `crop`
    pub fn locate_character(&self, crop: &GrayImage, mode: RefineMode) -> Refinement {
        let (cols, rows) = (crop.width() as i32, crop.height() as i32);
        let whole = Rect::new(0, 0, cols, rows);
        assert!(!whole.is_empty(), "cannot refine an empty crop");

        match mode {
            RefineMode::Estimate { min_width, .. } => {
                assert!(min_width > 0, "estimate mode needs a positive minimum width");
            }
            RefineMode::Guided(guide) => {
                assert!(
                    whole.contains(&guide) && !guide.is_empty(),
                    "guide {:?} must lie inside the {}x{} crop",
                    guide,
                    cols,
                    rows
                );
            }
        }

        let mut binary = binarize_otsu(crop);
        erase_isolated_pixels(&mut binary);
        let projection = Projection::of(&binary);

        // Coarse column bound
        let (coarse_x, coarse_w) = match mode {
            RefineMode::Estimate { min_width, direction } => {
                match self.estimate_columns(&binary, &projection, min_width, direction) {
                    Some(columns) => columns,
                    None => return Refinement::Empty { searched: whole },
                }
            }
            RefineMode::Guided(guide) => {
                let grown = expand_from_guide(&projection, guide, self.config.noise_threshold);
                (grown.x, grown.w)
            }
        };

        let coarse = Rect::new(coarse_x, 0, coarse_w, rows);
        let binary = if coarse_w != cols {
            crop_columns(&binary, coarse_x as u32, coarse_w as u32)
        } else {
            binary
        };
        if coarse_w < self.config.min_opening_width {
            trace!("Refiner: coarse width {} below opening minimum", coarse_w);
            return Refinement::Empty { searched: coarse };
        }

        let opened = open_square(&binary, self.config.opening_radius);
        let projection = Projection::of(&opened);

        // Fine bound on the opened image
        let fine = match mode {
            RefineMode::Estimate { .. } => match self.estimate_rows(&opened, &projection) {
                Some(fine) => fine,
                None => return Refinement::Empty { searched: coarse },
            },
            RefineMode::Guided(guide) => {
                let shifted = guide.translate(-coarse_x, 0);
                expand_from_guide(&projection, shifted, self.config.noise_threshold)
            }
        };

        if fine.h < self.config.min_char_height {
            trace!("Refiner: glyph height {} below minimum", fine.h);
            return Refinement::Empty { searched: whole };
        }

        let result = fine.translate(coarse_x, 0);
        assert!(
            !result.is_empty() && whole.contains(&result),
            "refiner produced {:?} outside the {}x{} crop",
            result,
            cols,
            rows
        );
        Refinement::Found(result)
    }

    /// Column range of the glyph nearest the growth origin
    fn estimate_columns(
        &self,
        binary: &GrayImage,
        projection: &Projection,
        min_width: i32,
        direction: Direction,
    ) -> Option<(i32, i32)> {
        let span = foreground_span(binary, projection, 1)?;
        let cols = &projection.cols;
        let (mut x0, mut x1) = (span.x0, span.x1);

        match direction {
            Direction::Right => {
                // a lone leading column is noise
                let mut col = x0 + 1;
                while col < x1 && cols[col as usize] == 0 {
                    x0 = col + 1;
                    col += 1;
                }
                let mut col = x0 + min_width;
                while col < x1 {
                    if cols[col as usize] < self.config.noise_threshold {
                        x1 = col - 1;
                        break;
                    }
                    col += 1;
                }
            }
            Direction::Left => {
                let mut col = x1 - min_width;
                while col >= x0 {
                    if cols[col as usize] < self.config.noise_threshold {
                        x0 = col + 1;
                        break;
                    }
                    col -= 1;
                }
            }
        }

        assert!(x1 >= x0, "coarse column bound inverted: {}..{}", x0, x1);
        Some((x0, x1 - x0 + 1))
    }

    /// Row band of the opened glyph with stray leading/trailing rows trimmed
    fn estimate_rows(&self, opened: &GrayImage, projection: &Projection) -> Option<Rect> {
        let mut span = foreground_span(opened, projection, self.config.noise_threshold)?;
        let rows = &projection.rows;

        let mut row = span.y0 + 1;
        while row < span.y1 && rows[row as usize] == 0 {
            span.y0 = row + 1;
            row += 1;
        }
        let mut row = span.y1 - 1;
        while row > span.y0 && rows[row as usize] == 0 {
            span.y1 = row - 1;
            row -= 1;
        }

        assert!(span.y1 >= span.y0, "fine row bound inverted: {:?}", span);
        Some(Rect::new(span.x0, span.y0, span.width(), span.height()))
    }

    /// Re-fit every seeded char of `line` against the image in guided mode.
    ///
    /// Each crop starts at the previous refined char's right edge, stops at
    /// the next seed and is cut back from `others` (the chars of every other
    /// line), so refined chars stay disjoint within and across lines.
    pub fn tighten_line(&self, gray: &GrayImage, line: &mut Line, others: &[Rect]) {
        let seeds: Vec<Rect> = line.chars().iter().copied().collect();
        let count = seeds.len() as i32;
        let image_w = gray.width() as i32;
        let image_h = gray.height() as i32;

        let (mut sum_y, mut sum_h) = seeds.iter().fold((0, 0), |(y, h), r| (y + r.y, h + r.h));
        let mut average = Rect::new(0, sum_y / count, 0, sum_h / count);

        let mut refined = BTreeSet::new();
        let mut next_min_x = 0;
        for (i, rect) in seeds.iter().enumerate() {
            let next_x = seeds.get(i + 1).map_or(image_w, |next| next.x);

            let clip_x = (rect.x - rect.w / 4).max(next_min_x).max(0).min(rect.x);
            let clip_right = (rect.x + rect.w * 5 / 4).min(next_x).max(rect.right());

            let mut clip_y = average.y - average.h / 4;
            if clip_y > rect.y {
                clip_y = rect.y - 2;
            }
            clip_y = clip_y.max(0);
            let extra = if rect.h < average.h {
                average.h * 5 / 4
            } else {
                rect.h + (rect.y - clip_y)
            };
            let clip_bottom = (rect.y + extra).max(rect.bottom()).min(image_h);

            let clip = clear_of(
                Rect::new(clip_x, clip_y, clip_right - clip_x, clip_bottom - clip_y),
                rect,
                others,
            );
            let guide = rect.translate(-clip.x, -clip.y);
            let crop = crop_gray(gray, &clip);

            let tightened = match self.locate_character(&crop, RefineMode::Guided(guide)) {
                Refinement::Found(found) => found.translate(clip.x, clip.y),
                Refinement::Empty { .. } => {
                    debug!("Refiner: guided refinement of {:?} found nothing, keeping seed", rect);
                    *rect
                }
            };

            sum_y += tightened.y - rect.y;
            sum_h += tightened.h - rect.h;
            average.y = sum_y / count;
            average.h = sum_h / count;

            next_min_x = tightened.right();
            refined.insert(tightened);
        }

        line.replace_chars(refined);
    }
}

/// Shrink `clip` until it no longer reaches into any of `others`. Each
/// intruder is cut off on the side of `seed` it lies on, so `clip` keeps
/// containing `seed`.
fn clear_of(clip: Rect, seed: &Rect, others: &[Rect]) -> Rect {
    let (mut left, mut top, mut right, mut bottom) = (clip.x, clip.y, clip.right(), clip.bottom());
    for other in others {
        let current = Rect::new(left, top, right - left, bottom - top);
        if !current.overlaps(other) || other.overlaps(seed) {
            continue;
        }
        if other.y >= seed.bottom() {
            bottom = other.y;
        } else if other.bottom() <= seed.y {
            top = other.bottom();
        } else if other.x >= seed.right() {
            right = other.x;
        } else {
            left = other.right();
        }
    }
    Rect::new(left, top, right - left, bottom - top)
}

/// Owned copy of `rect` from `gray`; `rect` must lie inside the image
pub fn crop_gray(gray: &GrayImage, rect: &Rect) -> GrayImage {
    image::imageops::crop_imm(gray, rect.x as u32, rect.y as u32, rect.w as u32, rect.h as u32)
        .to_image()
}
