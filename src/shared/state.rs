//! Capture session lifecycle state

use serde::Serialize;

/// Lifecycle of a live capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, worker not yet running frames
    #[default]
    Idle,
    /// Worker picks up new frames
    Capturing,
    /// Owner is changing the pipeline; no new run starts
    Reconfiguring,
    /// Terminal; the worker has been asked to exit
    Stopped,
}

impl SessionState {
    /// Whether `self -> next` is an allowed transition
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Capturing)
                | (Capturing, Reconfiguring)
                | (Reconfiguring, Capturing)
                | (Idle, Stopped)
                | (Capturing, Stopped)
                | (Reconfiguring, Stopped)
        )
    }

    /// The worker only starts a run in this state
    pub fn accepts_frames(self) -> bool {
        self == SessionState::Capturing
    }

    pub fn is_stopped(self) -> bool {
        self == SessionState::Stopped
    }
}

/// Counters kept by the capture worker (not persisted)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Frames handed to the session
    pub frames_submitted: u64,
    /// Frames overwritten before the worker picked them up
    pub frames_dropped: u64,
    /// Completed pipeline runs
    pub runs_completed: u64,
    /// Frames that could not be converted to grayscale
    pub frames_failed: u64,
    /// Results published to consumers
    pub results_published: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use SessionState::*;
        assert!(Idle.can_transition_to(Capturing));
        assert!(Capturing.can_transition_to(Reconfiguring));
        assert!(Reconfiguring.can_transition_to(Capturing));
        assert!(Capturing.can_transition_to(Stopped));

        assert!(!Stopped.can_transition_to(Capturing));
        assert!(!Stopped.can_transition_to(Stopped));
        assert!(!Idle.can_transition_to(Reconfiguring));
        assert!(!Capturing.can_transition_to(Capturing));
    }

    #[test]
    fn test_only_capturing_accepts_frames() {
        assert!(SessionState::Capturing.accepts_frames());
        assert!(!SessionState::Idle.accepts_frames());
        assert!(!SessionState::Reconfiguring.accepts_frames());
        assert!(SessionState::Stopped.is_stopped());
    }
}
