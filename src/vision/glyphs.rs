//! Glyph crops handed to the downstream classifier

use image::{GrayImage, Luma};

use super::geometry::{Line, Rect};
use super::refine::crop_gray;

/// Block size the classifier input is padded to
pub const CLASSIFIER_BLOCK: u32 = 72;
/// Mid-gray fill around a padded image
pub const PAD_FILL: u8 = 0x80;

/// One cropped glyph
#[derive(Debug, Clone)]
pub struct GlyphCrop {
    /// Index of the line in the segmentation result
    pub line: usize,
    /// Glyph box in image coordinates
    pub rect: Rect,
    pub image: GrayImage,
}

/// Crop every char of every line, in line then x order.
///
/// Chars partially outside the image are clipped; chars entirely outside are
/// skipped.
pub fn extract_glyphs(gray: &GrayImage, lines: &[Line]) -> Vec<GlyphCrop> {
    let bounds = Rect::new(0, 0, gray.width() as i32, gray.height() as i32);
    lines
        .iter()
        .enumerate()
        .flat_map(|(index, line)| line.chars().iter().map(move |rect| (index, *rect)))
        .filter_map(|(index, rect)| {
            let clipped = rect.clamp_to(&bounds)?;
            Some(GlyphCrop {
                line: index,
                rect: clipped,
                image: crop_gray(gray, &clipped),
            })
        })
        .collect()
}

/// Centre `image` on a canvas whose sides are multiples of `block`.
///
/// Returns the padded image and the offset of the original inside it.
pub fn pad_to_block(image: &GrayImage, block: u32) -> (GrayImage, (u32, u32)) {
    assert!(block > 0, "block size must be positive");
    let width = image.width().div_ceil(block).max(1) * block;
    let height = image.height().div_ceil(block).max(1) * block;
    let offset = ((width - image.width()) / 2, (height - image.height()) / 2);

    let mut padded = GrayImage::from_pixel(width, height, Luma([PAD_FILL]));
    image::imageops::replace(&mut padded, image, offset.0 as i64, offset.1 as i64);
    (padded, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_block_centres_image() {
        let image = GrayImage::from_pixel(100, 30, Luma([0]));
        let (padded, offset) = pad_to_block(&image, CLASSIFIER_BLOCK);

        assert_eq!(padded.dimensions(), (144, 72));
        assert_eq!(offset, (22, 21));
        assert_eq!(padded.get_pixel(0, 0).0[0], PAD_FILL);
        assert_eq!(padded.get_pixel(22, 21).0[0], 0);
        assert_eq!(padded.get_pixel(121, 50).0[0], 0);
        assert_eq!(padded.get_pixel(122, 50).0[0], PAD_FILL);
    }

    #[test]
    fn test_pad_exact_multiple_is_unchanged() {
        let image = GrayImage::from_pixel(72, 144, Luma([7]));
        let (padded, offset) = pad_to_block(&image, CLASSIFIER_BLOCK);
        assert_eq!(padded, image);
        assert_eq!(offset, (0, 0));
    }

    #[test]
    fn test_extract_glyphs_in_line_order() {
        let mut gray = GrayImage::from_pixel(60, 20, Luma([200]));
        gray.put_pixel(12, 3, Luma([1]));
        let lines = vec![
            Line::new([Rect::new(10, 2, 5, 8), Rect::new(20, 2, 5, 8)].into_iter().collect()),
            Line::new([Rect::new(55, 15, 10, 10)].into_iter().collect()),
        ];

        let glyphs = extract_glyphs(&gray, &lines);
        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[0].rect, Rect::new(10, 2, 5, 8));
        assert_eq!(glyphs[0].image.get_pixel(2, 1).0[0], 1);
        assert_eq!(glyphs[1].line, 0);
        // clipped to the image
        assert_eq!(glyphs[2].line, 1);
        assert_eq!(glyphs[2].rect, Rect::new(55, 15, 5, 5));
        assert_eq!(glyphs[2].image.dimensions(), (5, 5));
    }
}
