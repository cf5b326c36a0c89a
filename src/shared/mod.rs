//! Shared state and messaging between the capture worker and its owner
//!
//! The capture session publishes its lifecycle state and per-run events
//! through these types.

pub mod state;
pub mod messages;

pub use state::{SessionState, RuntimeStats};
pub use messages::SessionEvent;
