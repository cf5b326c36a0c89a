//! Binary image helpers used by the character refiner
//!
//! Binary images follow the scanner convention: background is 255 and
//! foreground (ink) is 0.

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

use super::geometry::Rect;

pub const FOREGROUND: u8 = 0;
pub const BACKGROUND: u8 = 255;

/// Binarize with a global Otsu level; pixels at or below the level become ink
pub fn binarize_otsu(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    binarize(gray, level)
}

/// Binarize with an explicit level
pub fn binarize(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = if pixel.0[0] <= level { FOREGROUND } else { BACKGROUND };
    }
    out
}

/// Clear ink pixels that have no ink among their 8 neighbours
pub fn erase_isolated_pixels(binary: &mut GrayImage) {
    let (width, height) = binary.dimensions();
    let mut isolated = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if binary.get_pixel(x, y).0[0] != FOREGROUND {
                continue;
            }
            let has_neighbour = neighbours(x, y, width, height)
                .any(|(nx, ny)| binary.get_pixel(nx, ny).0[0] == FOREGROUND);
            if !has_neighbour {
                isolated.push((x, y));
            }
        }
    }

    for (x, y) in isolated {
        binary.put_pixel(x, y, Luma([BACKGROUND]));
    }
}

fn neighbours(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let (x, y) = (x as i64, y as i64);
    (-1i64..=1)
        .flat_map(move |dy| (-1i64..=1).map(move |dx| (x + dx, y + dy)))
        .filter(move |&(nx, ny)| {
            (nx, ny) != (x, y) && nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64
        })
        .map(|(nx, ny)| (nx as u32, ny as u32))
}

/// Square opening of the background-bright binary image.
///
/// Eroding the bright background first grows the ink, so the net effect seals
/// hairline breaks inside strokes without shrinking them.
pub fn open_square(binary: &GrayImage, radius: u8) -> GrayImage {
    morphology::open(binary, Norm::LInf, radius)
}

/// Copy a column band `[x, x + width)` spanning all rows
pub fn crop_columns(binary: &GrayImage, x: u32, width: u32) -> GrayImage {
    image::imageops::crop_imm(binary, x, 0, width, binary.height()).to_image()
}

/// Ink pixel counts per row and per column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub rows: Vec<u32>,
    pub cols: Vec<u32>,
}

impl Projection {
    pub fn of(binary: &GrayImage) -> Self {
        let (width, height) = binary.dimensions();
        let mut rows = vec![0u32; height as usize];
        let mut cols = vec![0u32; width as usize];
        for (x, y, pixel) in binary.enumerate_pixels() {
            if pixel.0[0] == FOREGROUND {
                rows[y as usize] += 1;
                cols[x as usize] += 1;
            }
        }
        Self { rows, cols }
    }
}

/// Inclusive pixel span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Span {
    pub fn width(&self) -> i32 {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> i32 {
        self.y1 - self.y0 + 1
    }

    fn include(&mut self, x: i32, y: i32) {
        self.x0 = self.x0.min(x);
        self.x1 = self.x1.max(x);
        self.y0 = self.y0.min(y);
        self.y1 = self.y1.max(y);
    }
}

/// Extent of the ink, ignoring leading and trailing rows with fewer than
/// `min_row_pixels` ink pixels.
///
/// Rows before the first qualifying row are discarded entirely, including
/// the columns they contributed.
pub fn foreground_span(binary: &GrayImage, projection: &Projection, min_row_pixels: u32) -> Option<Span> {
    let mut span: Option<Span> = None;
    let mut validated = false;

    for (y, row) in binary.rows().enumerate() {
        for (x, pixel) in row.enumerate() {
            if pixel.0[0] != FOREGROUND {
                continue;
            }
            let (x, y) = (x as i32, y as i32);
            match span.as_mut() {
                Some(span) => span.include(x, y),
                None => span = Some(Span { x0: x, y0: y, x1: x, y1: y }),
            }
        }
        if !validated && span.is_some() {
            if projection.rows[y] >= min_row_pixels {
                validated = true;
            } else {
                span = None;
            }
        }
    }

    if !validated {
        return None;
    }
    let mut span = span?;
    while span.y1 > span.y0 && projection.rows[span.y1 as usize] < min_row_pixels {
        span.y1 -= 1;
    }
    Some(span)
}

/// Grow `guide` outward while the neighbouring column or row holds at least
/// `min_pixels` ink pixels. The result always contains `guide`.
pub fn expand_from_guide(projection: &Projection, guide: Rect, min_pixels: u32) -> Rect {
    let (left, right) = expand_axis(&projection.cols, guide.x, guide.right(), min_pixels);
    let (top, bottom) = expand_axis(&projection.rows, guide.y, guide.bottom(), min_pixels);
    Rect::new(left, top, right - left, bottom - top)
}

fn expand_axis(counts: &[u32], start: i32, end: i32, min_pixels: u32) -> (i32, i32) {
    let len = counts.len() as i32;
    let mut lo = start;
    while lo > 0 && counts[(lo - 1) as usize] >= min_pixels {
        lo -= 1;
    }
    let mut hi = end;
    while hi < len && counts[hi as usize] >= min_pixels {
        hi += 1;
    }
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_from_rows(rows: &[&str]) -> GrayImage {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        GrayImage::from_fn(width, height, |x, y| {
            let c = rows[y as usize].as_bytes()[x as usize];
            Luma([if c == b'#' { FOREGROUND } else { BACKGROUND }])
        })
    }

    #[test]
    fn test_binarize_otsu_two_level() {
        let gray = GrayImage::from_fn(4, 1, |x, _| Luma([if x < 2 { 20 } else { 230 }]));
        let binary = binarize_otsu(&gray);
        assert_eq!(binary.get_pixel(0, 0).0[0], FOREGROUND);
        assert_eq!(binary.get_pixel(1, 0).0[0], FOREGROUND);
        assert_eq!(binary.get_pixel(2, 0).0[0], BACKGROUND);
    }

    #[test]
    fn test_binarize_uniform_background_has_no_ink() {
        let gray = GrayImage::from_pixel(6, 6, Luma([255]));
        let binary = binarize_otsu(&gray);
        assert!(binary.pixels().all(|p| p.0[0] == BACKGROUND));
    }

    #[test]
    fn test_erase_isolated_pixels() {
        let mut binary = binary_from_rows(&[
            "#.....",
            "......",
            "...##.",
            "......",
            ".....#",
        ]);
        erase_isolated_pixels(&mut binary);
        assert_eq!(binary.get_pixel(0, 0).0[0], BACKGROUND);
        assert_eq!(binary.get_pixel(5, 4).0[0], BACKGROUND);
        assert_eq!(binary.get_pixel(3, 2).0[0], FOREGROUND);
        assert_eq!(binary.get_pixel(4, 2).0[0], FOREGROUND);
    }

    #[test]
    fn test_projection_counts() {
        let binary = binary_from_rows(&["#.#", "##.", "..."]);
        let projection = Projection::of(&binary);
        assert_eq!(projection.rows, vec![2, 2, 0]);
        assert_eq!(projection.cols, vec![2, 1, 1]);
    }

    #[test]
    fn test_foreground_span_discards_weak_leading_rows() {
        let binary = binary_from_rows(&[
            "#.......",
            "........",
            "..####..",
            "..####..",
            "...#....",
        ]);
        let projection = Projection::of(&binary);

        let span = foreground_span(&binary, &projection, 2).unwrap();
        assert_eq!(span, Span { x0: 2, y0: 2, x1: 5, y1: 3 });

        let loose = foreground_span(&binary, &projection, 1).unwrap();
        assert_eq!(loose, Span { x0: 0, y0: 0, x1: 5, y1: 4 });
    }

    #[test]
    fn test_foreground_span_empty() {
        let binary = binary_from_rows(&["....", "...."]);
        let projection = Projection::of(&binary);
        assert!(foreground_span(&binary, &projection, 1).is_none());
    }

    #[test]
    fn test_expand_from_guide() {
        let binary = binary_from_rows(&[
            "........",
            ".#####..",
            ".#####..",
            ".#####..",
            "........",
        ]);
        let projection = Projection::of(&binary);
        let grown = expand_from_guide(&projection, Rect::new(2, 2, 2, 1), 2);
        assert_eq!(grown, Rect::new(1, 1, 5, 3));
    }

    #[test]
    fn test_opening_keeps_solid_block() {
        let binary = binary_from_rows(&[
            "........",
            "........",
            "..####..",
            "..####..",
            "..####..",
            "........",
            "........",
        ]);
        let opened = open_square(&binary, 1);
        assert_eq!(Projection::of(&opened), Projection::of(&binary));
    }
}
