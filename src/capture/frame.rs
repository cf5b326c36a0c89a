//! Frame data structures for incoming camera or scanner content

use image::GrayImage;
use std::time::Instant;

use crate::error::FrameError;

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One byte per pixel
    Gray8,
    /// Red, green, blue, alpha
    Rgba8,
    /// Blue, green, red, alpha (typical capture APIs)
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }
}

/// A frame delivered by a frame source
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data, `stride` bytes per row
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Bytes per row, including padding
    pub stride: usize,
    /// Pixel layout
    pub format: PixelFormat,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Create a tightly packed frame
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self, FrameError> {
        let stride = width as usize * format.bytes_per_pixel();
        Self::with_stride(data, width, height, stride, format)
    }

    /// Create a frame whose rows are `stride` bytes apart
    pub fn with_stride(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self, FrameError> {
        let frame = Self {
            data,
            width,
            height,
            stride,
            format,
            timestamp: Instant::now(),
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Wrap a grayscale image
    pub fn from_gray(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            stride: width as usize,
            format: PixelFormat::Gray8,
            timestamp: Instant::now(),
        }
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        let row_bytes = self.width as usize * self.format.bytes_per_pixel();
        if self.stride < row_bytes {
            return Err(FrameError::InvalidStride {
                stride: self.stride,
                row_bytes,
            });
        }
        // the last row needs no padding
        let expected = self.stride * (self.height as usize - 1) + row_bytes;
        if self.data.len() < expected {
            return Err(FrameError::BufferTooSmall {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Convert to single-channel luma (0.299 R + 0.587 G + 0.114 B)
    pub fn to_gray(&self) -> Result<GrayImage, FrameError> {
        self.validate()?;
        let width = self.width as usize;
        let bpp = self.format.bytes_per_pixel();
        let mut gray = Vec::with_capacity(width * self.height as usize);

        for row in self.data.chunks(self.stride).take(self.height as usize) {
            let pixels = &row[..width * bpp];
            match self.format {
                PixelFormat::Gray8 => gray.extend_from_slice(pixels),
                PixelFormat::Rgba8 => gray.extend(pixels.chunks_exact(4).map(|p| luma(p[0], p[1], p[2]))),
                PixelFormat::Bgra8 => gray.extend(pixels.chunks_exact(4).map(|p| luma(p[2], p[1], p[0]))),
            }
        }

        let actual = gray.len();
        GrayImage::from_raw(self.width, self.height, gray).ok_or(FrameError::BufferTooSmall {
            expected: width * self.height as usize,
            actual,
        })
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round().min(255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_geometry() {
        assert!(matches!(
            Frame::new(vec![], 0, 4, PixelFormat::Gray8),
            Err(FrameError::Empty { .. })
        ));
        assert!(matches!(
            Frame::with_stride(vec![0; 64], 4, 4, 8, PixelFormat::Rgba8),
            Err(FrameError::InvalidStride { stride: 8, row_bytes: 16 })
        ));
        assert!(matches!(
            Frame::new(vec![0; 10], 4, 4, PixelFormat::Gray8),
            Err(FrameError::BufferTooSmall { expected: 16, actual: 10 })
        ));
    }

    #[test]
    fn test_gray_passthrough_with_stride() {
        // 2x2 gray with one padding byte per row; the last row is unpadded
        let frame = Frame::with_stride(vec![1, 2, 99, 3, 4], 2, 2, 3, PixelFormat::Gray8).unwrap();
        let gray = frame.to_gray().unwrap();
        assert_eq!(gray.into_raw(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_color_conversion_respects_channel_order() {
        let red_rgba = Frame::new(vec![255, 0, 0, 255], 1, 1, PixelFormat::Rgba8).unwrap();
        let red_bgra = Frame::new(vec![0, 0, 255, 255], 1, 1, PixelFormat::Bgra8).unwrap();
        assert_eq!(red_rgba.to_gray().unwrap().get_pixel(0, 0).0[0], 76);
        assert_eq!(red_bgra.to_gray().unwrap().get_pixel(0, 0).0[0], 76);

        let white = Frame::new(vec![255; 4], 1, 1, PixelFormat::Rgba8).unwrap();
        assert_eq!(white.to_gray().unwrap().get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn test_from_gray_round_trip() {
        let image = GrayImage::from_raw(3, 1, vec![5, 6, 7]).unwrap();
        let frame = Frame::from_gray(image.clone());
        assert_eq!(frame.dimensions(), (3, 1));
        assert_eq!(frame.to_gray().unwrap(), image);
    }
}
