//! Live Capture Layer
//!
//! Runs the segmentation pipeline on a worker thread against the newest frame
//! delivered by an external frame source. Frames are double buffered: the
//! source overwrites a pending slot, the worker swaps it out and works on its
//! own copy. Only complete results are ever published.

pub mod frame;

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::{GrayImage, RgbImage};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::CaptureError;
use crate::shared::{RuntimeStats, SessionEvent, SessionState};
use crate::vision::{annotate_lines, Line, Rect, SegmentationResult, Segmenter, StageTimings};
use frame::Frame;

/// Live capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Longest the worker sleeps before re-checking its state
    pub poll_interval_ms: u64,
    /// Also publish an annotated image with every result
    pub publish_visualization: bool,
    /// Keep showing the previous lines when a frame yields none
    pub keep_previous_on_empty: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            publish_visualization: false,
            keep_previous_on_empty: false,
        }
    }
}

/// What the capture worker runs on every frame
pub trait FramePipeline: Send + 'static {
    fn run(&self, gray: &GrayImage) -> SegmentationResult;
}

impl FramePipeline for Segmenter {
    fn run(&self, gray: &GrayImage) -> SegmentationResult {
        self.segment(gray)
    }
}

/// One complete pipeline result as seen by consumers
#[derive(Debug, Clone)]
pub struct PublishedResult {
    /// Increments with every publication
    pub sequence: u64,
    pub lines: Vec<Line>,
    pub leftover: BTreeSet<Rect>,
    pub timings: StageTimings,
    /// Capture time of the source frame
    pub frame_timestamp: Instant,
    /// Annotated source frame, when enabled
    pub visualization: Option<Arc<RgbImage>>,
}

/// State guarded by the variable mutex
#[derive(Debug, Default)]
struct Slots {
    state: SessionState,
    pending: Option<Frame>,
    dirty: bool,
    latest: Option<Arc<PublishedResult>>,
    sequence: u64,
    stats: RuntimeStats,
}

struct Shared {
    slots: Mutex<Slots>,
    wake: Condvar,
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
    config: CaptureConfig,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Move to `Stopped` from any state. Returns whether the state changed.
    fn mark_stopped(&self) -> bool {
        let changed = {
            let mut slots = self.slots.lock();
            let changed = !slots.state.is_stopped();
            slots.state = SessionState::Stopped;
            changed
        };
        if changed {
            self.wake.notify_all();
            self.emit(SessionEvent::StateChanged(SessionState::Stopped));
        }
        changed
    }
}

/// Handle used by a frame source to deliver frames
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<Shared>,
}

impl FrameSink {
    /// Replace the pending frame. Returns `false` once the session has stopped.
    pub fn submit(&self, frame: Frame) -> bool {
        let mut slots = self.shared.slots.lock();
        if slots.state.is_stopped() {
            return false;
        }
        if slots.pending.replace(frame).is_some() {
            slots.stats.frames_dropped += 1;
        }
        slots.dirty = true;
        slots.stats.frames_submitted += 1;
        drop(slots);
        self.shared.wake.notify_all();
        true
    }

    /// Whether a frame is waiting for the worker
    pub fn is_dirty(&self) -> bool {
        self.shared.slots.lock().dirty
    }
}

/// A live capture session owning the pipeline worker thread
pub struct CaptureSession<P: FramePipeline = Segmenter> {
    shared: Arc<Shared>,
    /// Held by the worker for the whole duration of a run
    pipeline: Arc<Mutex<P>>,
    worker: Option<JoinHandle<()>>,
}

impl<P: FramePipeline> CaptureSession<P> {
    /// Spawn the worker. The session starts `Idle`; call [`start`](Self::start)
    /// to begin processing frames.
    pub fn new(pipeline: P, config: CaptureConfig) -> Result<Self, CaptureError> {
        let shared = Arc::new(Shared {
            slots: Mutex::new(Slots::default()),
            wake: Condvar::new(),
            subscribers: Mutex::new(Vec::new()),
            config,
        });
        let pipeline = Arc::new(Mutex::new(pipeline));

        let worker_shared = shared.clone();
        let worker_pipeline = pipeline.clone();
        let worker = std::thread::Builder::new()
            .name("glyphline-capture".into())
            .spawn(move || run_worker(worker_shared, worker_pipeline))
            .map_err(CaptureError::Spawn)?;

        Ok(Self {
            shared,
            pipeline,
            worker: Some(worker),
        })
    }

    pub fn start(&self) -> Result<(), CaptureError> {
        self.transition(SessionState::Capturing)?;
        info!("Capture session started");
        Ok(())
    }

    pub fn frame_sink(&self) -> FrameSink {
        FrameSink {
            shared: self.shared.clone(),
        }
    }

    /// Most recent complete result
    pub fn latest(&self) -> Option<Arc<PublishedResult>> {
        self.shared.slots.lock().latest.clone()
    }

    /// Annotated image of the most recent result, when enabled
    pub fn visualization(&self) -> Option<Arc<RgbImage>> {
        self.latest().and_then(|result| result.visualization.clone())
    }

    pub fn state(&self) -> SessionState {
        self.shared.slots.lock().state
    }

    pub fn stats(&self) -> RuntimeStats {
        self.shared.slots.lock().stats
    }

    /// Receive session events from now on
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Change the pipeline. Waits for an in-flight run to finish first.
    pub fn reconfigure<F>(&self, apply: F) -> Result<(), CaptureError>
    where
        F: FnOnce(&mut P),
    {
        let state = self.state();
        if state == SessionState::Idle {
            apply(&mut *self.pipeline.lock());
            return Ok(());
        }

        self.transition(SessionState::Reconfiguring)?;
        {
            let mut pipeline = self.pipeline.lock();
            apply(&mut *pipeline);
        }
        debug!("Capture pipeline reconfigured");
        self.transition(SessionState::Capturing)
    }

    /// Stop the worker and wait for it. The in-flight run always completes.
    ///
    /// Fails with [`CaptureError::WorkerPanicked`] when the worker died on a
    /// broken invariant; the session is stopped either way.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        // a panicking worker may have stopped the session already
        self.shared.mark_stopped();
        worker.join().map_err(|_| CaptureError::WorkerPanicked)?;
        info!("Capture session stopped");
        Ok(())
    }

    fn transition(&self, to: SessionState) -> Result<(), CaptureError> {
        {
            let mut slots = self.shared.slots.lock();
            let from = slots.state;
            if !from.can_transition_to(to) {
                return Err(CaptureError::InvalidTransition { from, to });
            }
            slots.state = to;
        }
        self.shared.wake.notify_all();
        self.shared.emit(SessionEvent::StateChanged(to));
        Ok(())
    }
}

impl<P: FramePipeline> Drop for CaptureSession<P> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Capture session did not stop cleanly: {}", e);
        }
    }
}

/// Runs when the worker exits, normally or by unwinding. A panic in the
/// pipeline stops the session so frame sources and consumers see it.
struct WorkerExit<'a> {
    shared: &'a Shared,
}

impl Drop for WorkerExit<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("Capture worker panicked, stopping session");
            self.shared.mark_stopped();
            let mut slots = self.shared.slots.lock();
            slots.pending = None;
            slots.dirty = false;
        }
        info!("Capture worker exiting");
        self.shared.emit(SessionEvent::WorkerStopped);
    }
}

/// Wait for a frame while capturing. `None` once stopped.
fn next_frame(shared: &Shared) -> Option<Frame> {
    let poll = Duration::from_millis(shared.config.poll_interval_ms.max(1));
    let mut slots = shared.slots.lock();
    loop {
        if slots.state.is_stopped() {
            return None;
        }
        if slots.state.accepts_frames() && slots.dirty {
            slots.dirty = false;
            if let Some(frame) = slots.pending.take() {
                return Some(frame);
            }
        }
        shared.wake.wait_for(&mut slots, poll);
    }
}

fn run_worker<P: FramePipeline>(shared: Arc<Shared>, pipeline: Arc<Mutex<P>>) {
    info!("Capture worker starting");
    let _exit = WorkerExit { shared: &shared };

    while let Some(frame) = next_frame(&shared) {
        let pipeline = pipeline.lock();

        // The owner may have started a reconfiguration while we waited. A stop
        // still lets this frame finish.
        {
            let mut slots = shared.slots.lock();
            if slots.state == SessionState::Reconfiguring {
                if slots.pending.is_none() {
                    slots.pending = Some(frame);
                    slots.dirty = true;
                }
                continue;
            }
        }

        let gray = match frame.to_gray() {
            Ok(gray) => gray,
            Err(e) => {
                warn!("Skipping frame: {}", e);
                shared.slots.lock().stats.frames_failed += 1;
                shared.emit(SessionEvent::FrameFailed(e.to_string()));
                continue;
            }
        };

        let result = pipeline.run(&gray);
        let visualization = shared
            .config
            .publish_visualization
            .then(|| Arc::new(annotate_lines(&gray, &result.lines)));

        let published = {
            let mut slots = shared.slots.lock();
            slots.stats.runs_completed += 1;
            let keep = shared.config.keep_previous_on_empty
                && result.lines.is_empty()
                && slots.latest.is_some();
            if keep {
                None
            } else {
                slots.sequence += 1;
                let published = Arc::new(PublishedResult {
                    sequence: slots.sequence,
                    lines: result.lines,
                    leftover: result.leftover,
                    timings: result.timings,
                    frame_timestamp: frame.timestamp,
                    visualization,
                });
                slots.latest = Some(published.clone());
                slots.stats.results_published += 1;
                Some(published)
            }
        };
        drop(pipeline);

        if let Some(published) = published {
            debug!(
                "Published result #{} with {} lines in {:?}",
                published.sequence,
                published.lines.len(),
                published.timings.total
            );
            shared.emit(SessionEvent::ResultPublished(published));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::VisionConfig;
    use image::{GrayImage, Luma};

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Segmenter that signals when a run starts and blocks until released
    struct Gated {
        started: Sender<()>,
        release: Receiver<()>,
        inner: Segmenter,
    }

    impl FramePipeline for Gated {
        fn run(&self, gray: &GrayImage) -> SegmentationResult {
            self.started.send(()).unwrap();
            self.release.recv_timeout(TIMEOUT).unwrap();
            self.inner.segment(gray)
        }
    }

    fn gated() -> (Gated, Receiver<()>, Sender<()>) {
        let (started_tx, started_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        let pipeline = Gated {
            started: started_tx,
            release: release_rx,
            inner: Segmenter::default(),
        };
        (pipeline, started_rx, release_tx)
    }

    /// Release the gate from another thread once the caller is blocked
    fn release_later(release: Sender<()>) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            release.send(()).unwrap();
        })
    }

    struct Exploding;

    impl FramePipeline for Exploding {
        fn run(&self, _gray: &GrayImage) -> SegmentationResult {
            panic!("char overlaps an existing member");
        }
    }

    fn glyph_frame(xs: &[i32]) -> Frame {
        let mut img = GrayImage::from_pixel(160, 48, Luma([255]));
        for &x in xs {
            for y in 16..32 {
                for dx in 0..10 {
                    img.put_pixel((x + dx) as u32, y, Luma([0]));
                }
            }
        }
        Frame::from_gray(img)
    }

    fn next_result(events: &Receiver<SessionEvent>) -> Arc<PublishedResult> {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(SessionEvent::ResultPublished(result)) => return result,
                Ok(_) => continue,
                Err(e) => panic!("no result published: {}", e),
            }
        }
    }

    fn wait_for_runs(session: &CaptureSession, runs: u64) {
        let deadline = Instant::now() + TIMEOUT;
        while session.stats().runs_completed < runs {
            assert!(Instant::now() < deadline, "worker did not complete {} runs", runs);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_publishes_results() {
        let session = CaptureSession::new(Segmenter::default(), CaptureConfig::default()).unwrap();
        let events = session.subscribe();
        session.start().unwrap();

        assert!(session.frame_sink().submit(glyph_frame(&[20, 42, 64])));
        let result = next_result(&events);

        assert_eq!(result.sequence, 1);
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].len(), 3);
        assert_eq!(session.latest().unwrap().sequence, 1);
        assert!(!session.frame_sink().is_dirty());
    }

    #[test]
    fn test_idle_session_holds_latest_frame_only() {
        let session = CaptureSession::new(Segmenter::default(), CaptureConfig::default()).unwrap();
        let events = session.subscribe();
        let sink = session.frame_sink();

        sink.submit(glyph_frame(&[20, 42]));
        sink.submit(glyph_frame(&[20, 42, 64]));
        std::thread::sleep(Duration::from_millis(50));
        assert!(sink.is_dirty());
        assert!(session.latest().is_none());
        assert_eq!(session.stats().frames_dropped, 1);
        assert_eq!(session.stats().frames_submitted, 2);

        session.start().unwrap();
        let result = next_result(&events);
        assert_eq!(result.lines.len(), 1);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut session = CaptureSession::new(Segmenter::default(), CaptureConfig::default()).unwrap();
        session.start().unwrap();
        assert!(matches!(
            session.start(),
            Err(CaptureError::InvalidTransition {
                from: SessionState::Capturing,
                to: SessionState::Capturing
            })
        ));

        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(matches!(
            session.reconfigure(|_| {}),
            Err(CaptureError::InvalidTransition { .. })
        ));
        // stopping twice is a no-op
        session.stop().unwrap();
    }

    #[test]
    fn test_reconfigure_applies_to_next_run() {
        let session = CaptureSession::new(Segmenter::default(), CaptureConfig::default()).unwrap();
        let events = session.subscribe();
        session.start().unwrap();
        let sink = session.frame_sink();

        sink.submit(glyph_frame(&[20, 42]));
        let before = next_result(&events);
        assert!(before.lines.is_empty());

        session
            .reconfigure(|segmenter| {
                let mut config: VisionConfig = segmenter.config().clone();
                config.seeding.min_line_chars = 2;
                segmenter.set_config(config);
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::Capturing);

        sink.submit(glyph_frame(&[20, 42]));
        let after = next_result(&events);
        assert_eq!(after.lines.len(), 1);
        assert_eq!(after.lines[0].len(), 2);
    }

    #[test]
    fn test_keep_previous_on_empty() {
        let config = CaptureConfig {
            keep_previous_on_empty: true,
            ..Default::default()
        };
        let session = CaptureSession::new(Segmenter::default(), config).unwrap();
        let events = session.subscribe();
        session.start().unwrap();
        let sink = session.frame_sink();

        sink.submit(glyph_frame(&[20, 42, 64]));
        let first = next_result(&events);

        sink.submit(glyph_frame(&[]));
        wait_for_runs(&session, 2);
        let latest = session.latest().unwrap();
        assert_eq!(latest.sequence, first.sequence);
        assert_eq!(latest.lines.len(), 1);
    }

    #[test]
    fn test_visualization_published() {
        let config = CaptureConfig {
            publish_visualization: true,
            ..Default::default()
        };
        let session = CaptureSession::new(Segmenter::default(), config).unwrap();
        let events = session.subscribe();
        session.start().unwrap();

        session.frame_sink().submit(glyph_frame(&[20, 42, 64]));
        next_result(&events);
        let image = session.visualization().unwrap();
        assert_eq!(image.dimensions(), (160, 48));
    }

    #[test]
    fn test_visualization_travels_with_its_result() {
        let config = CaptureConfig {
            publish_visualization: true,
            ..Default::default()
        };
        let session = CaptureSession::new(Segmenter::default(), config).unwrap();
        let events = session.subscribe();
        session.start().unwrap();
        let sink = session.frame_sink();

        sink.submit(glyph_frame(&[20, 42, 64]));
        let first = next_result(&events);
        sink.submit(glyph_frame(&[20, 42]));
        let second = next_result(&events);

        // the first result still carries the image of its own frame
        let first_image = first.visualization.clone().unwrap();
        let second_image = second.visualization.clone().unwrap();
        assert_ne!(first_image.as_raw(), second_image.as_raw());
        assert!(Arc::ptr_eq(&session.visualization().unwrap(), &second_image));
    }

    #[test]
    fn test_stop_rejects_frames_and_notifies() {
        let mut session = CaptureSession::new(Segmenter::default(), CaptureConfig::default()).unwrap();
        let events = session.subscribe();
        let sink = session.frame_sink();
        session.start().unwrap();
        session.stop().unwrap();

        assert!(!sink.submit(glyph_frame(&[20, 42, 64])));
        let stopped = events
            .iter()
            .any(|event| matches!(event, SessionEvent::WorkerStopped));
        assert!(stopped);
    }

    #[test]
    fn test_stop_waits_for_in_flight_run() {
        let (pipeline, started, release) = gated();
        let mut session = CaptureSession::new(pipeline, CaptureConfig::default()).unwrap();
        let events = session.subscribe();
        session.start().unwrap();

        session.frame_sink().submit(glyph_frame(&[20, 42, 64]));
        started.recv_timeout(TIMEOUT).unwrap();

        let releaser = release_later(release);
        session.stop().unwrap();
        releaser.join().unwrap();

        // the run that was in flight when stop was requested still published
        let latest = session.latest().unwrap();
        assert_eq!(latest.lines.len(), 1);
        assert_eq!(session.stats().results_published, 1);

        let order: Vec<SessionEvent> = events.try_iter().collect();
        let published = order
            .iter()
            .position(|e| matches!(e, SessionEvent::ResultPublished(_)))
            .unwrap();
        let stopped = order
            .iter()
            .position(|e| matches!(e, SessionEvent::WorkerStopped))
            .unwrap();
        assert!(published < stopped);
    }

    #[test]
    fn test_reconfigure_waits_for_in_flight_run() {
        let (pipeline, started, release) = gated();
        let session = CaptureSession::new(pipeline, CaptureConfig::default()).unwrap();
        let events = session.subscribe();
        session.start().unwrap();

        session.frame_sink().submit(glyph_frame(&[20, 42]));
        started.recv_timeout(TIMEOUT).unwrap();

        let releaser = release_later(release.clone());
        let mut published_before_apply = None;
        session
            .reconfigure(|gated| {
                published_before_apply = Some(session.stats().results_published);
                let mut config = gated.inner.config().clone();
                config.seeding.min_line_chars = 2;
                gated.inner.set_config(config);
            })
            .unwrap();
        releaser.join().unwrap();
        assert_eq!(published_before_apply, Some(1));
        assert!(next_result(&events).lines.is_empty());

        // the next frame runs with the new configuration
        release.send(()).unwrap();
        session.frame_sink().submit(glyph_frame(&[20, 42]));
        let after = next_result(&events);
        assert_eq!(after.lines.len(), 1);
        assert_eq!(after.lines[0].len(), 2);
    }

    #[test]
    fn test_worker_panic_stops_session() {
        let mut session = CaptureSession::new(Exploding, CaptureConfig::default()).unwrap();
        let events = session.subscribe();
        let sink = session.frame_sink();
        session.start().unwrap();

        assert!(sink.submit(glyph_frame(&[20, 42, 64])));
        let deadline = Instant::now() + TIMEOUT;
        let mut saw_stopped_state = false;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(SessionEvent::StateChanged(SessionState::Stopped)) => saw_stopped_state = true,
                Ok(SessionEvent::WorkerStopped) => break,
                Ok(_) => continue,
                Err(e) => panic!("worker did not report its exit: {}", e),
            }
        }

        assert!(saw_stopped_state);
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!sink.submit(glyph_frame(&[20, 42, 64])));
        assert!(session.latest().is_none());
        assert!(matches!(session.stop(), Err(CaptureError::WorkerPanicked)));
        // already torn down
        session.stop().unwrap();
    }
}
