//! Error types
//!
//! Recoverable failures only. Geometry invariant violations are programming
//! errors and panic at the point of detection instead of flowing through here.

use thiserror::Error;

use crate::shared::SessionState;

/// Errors raised while interpreting a pixel buffer
#[derive(Debug, Error)]
pub enum FrameError {
    /// Width or height is zero
    #[error("frame has an empty dimension ({width}x{height})")]
    Empty { width: u32, height: u32 },

    /// Row stride cannot hold a full row of pixels
    #[error("stride {stride} is smaller than a row of {row_bytes} bytes")]
    InvalidStride { stride: usize, row_bytes: usize },

    /// Buffer is shorter than the declared geometry requires
    #[error("frame buffer holds {actual} bytes, expected at least {expected}")]
    BufferTooSmall { expected: usize, actual: usize },
}

/// Errors raised by configuration validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value the engine cannot work with
    #[error("invalid value for `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Errors raised by the live capture session
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Requested state change is not allowed from the current state
    #[error("cannot move capture session from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// The worker thread could not be spawned
    #[error("failed to spawn capture worker")]
    Spawn(#[source] std::io::Error),

    /// The worker thread panicked while running the pipeline
    #[error("capture worker panicked")]
    WorkerPanicked,
}
