//! glyphline - text line and glyph segmentation
//!
//! Turns scanned forms or live camera frames into lines of glyph boxes for a
//! downstream character classifier. See [`vision::Segmenter`] for still
//! images and [`capture::CaptureSession`] for live frame sources.

pub mod capture;
pub mod config;
pub mod error;
pub mod shared;
pub mod storage;
pub mod vision;

pub use capture::frame::{Frame, PixelFormat};
pub use capture::{CaptureConfig, CaptureSession, FramePipeline, FrameSink, PublishedResult};
pub use config::EngineConfig;
pub use error::{CaptureError, ConfigError, FrameError};
pub use vision::{Line, Rect, SegmentationResult, Segmenter};
