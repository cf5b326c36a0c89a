//! Events emitted by the capture worker

use std::sync::Arc;

use super::state::SessionState;
use crate::capture::PublishedResult;

/// Messages sent from the capture worker to subscribers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Session state changed
    StateChanged(SessionState),
    /// A new result replaced the previous one
    ResultPublished(Arc<PublishedResult>),
    /// A frame could not be processed
    FrameFailed(String),
    /// The worker thread has exited
    WorkerStopped,
}
