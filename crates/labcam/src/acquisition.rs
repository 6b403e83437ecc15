//! Acquisition state machine types and caller-side polling helpers.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::frame::Frame;
use crate::sdk::Backend;
use crate::{Camera, CameraError};

/// Default circular-buffer depth of a live acquisition.
pub const DEFAULT_BUFFER_FRAMES: usize = 16;
/// Default time [`Camera::poll_frame`] waits for a frame.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);
/// Longest poll timeout a camera accepts; larger values are capped.
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

const EWMA_ALPHA: f64 = 0.2;

/// State of the camera's acquisition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Nothing running; initial state and the end of a completed sequence.
    Idle,
    /// Continuous circular-buffer capture.
    LiveRunning,
    /// Bounded capture of a fixed number of frames.
    SequenceRunning,
    /// Explicitly stopped; behaves like `Idle`.
    Stopped,
}

impl AcquisitionState {
    pub fn is_running(self) -> bool {
        matches!(
            self,
            AcquisitionState::LiveRunning | AcquisitionState::SequenceRunning
        )
    }

    /// Whether a new acquisition may start or settings may change.
    pub fn is_idle(self) -> bool {
        !self.is_running()
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::LiveRunning => "live",
            AcquisitionState::SequenceRunning => "sequence",
            AcquisitionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why [`Camera::poll_frame`] returned without a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoFrameReason {
    /// The driver had no frame ready before the timeout.
    Timeout(Duration),
    /// Every frame of the last sequence has already been delivered.
    SequenceComplete { frames: u32 },
}

impl fmt::Display for NoFrameReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoFrameReason::Timeout(after) => write!(f, "timed out after {after:?}"),
            NoFrameReason::SequenceComplete { frames } => {
                write!(f, "sequence of {frames} frames already delivered")
            }
        }
    }
}

/// Exponentially smoothed frame rate derived from driver timestamps.
#[derive(Debug, Clone, Default)]
pub struct FpsEstimator {
    last: Option<Instant>,
    fps: f64,
}

impl FpsEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame timestamp and return the updated estimate.
    pub fn record(&mut self, timestamp: Instant) -> f64 {
        if let Some(last) = self.last {
            let dt = timestamp.saturating_duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let inst = 1.0 / dt;
                self.fps = if self.fps == 0.0 {
                    inst
                } else {
                    EWMA_ALPHA * inst + (1.0 - EWMA_ALPHA) * self.fps
                };
            }
        }
        self.last = Some(timestamp);
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionKind {
    Live,
    Sequence { frames: u32 },
}

/// Bookkeeping of the running acquisition.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub(crate) kind: SessionKind,
    pub(crate) delivered: u32,
    pub(crate) fps: FpsEstimator,
}

impl Session {
    pub(crate) fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            delivered: 0,
            fps: FpsEstimator::new(),
        }
    }

    /// Whether a sequence session has handed out its last frame.
    pub(crate) fn is_exhausted(&self) -> bool {
        match self.kind {
            SessionKind::Live => false,
            SessionKind::Sequence { frames } => self.delivered >= frames,
        }
    }
}

/// Poll until `count` frames have been received.
///
/// `NoFrameAvailable` timeouts are retried up to `max_retries` consecutive
/// times; any other error, or an exhausted sequence, ends the collection.
/// This is the caller-side retry policy; the camera itself never retries.
pub fn collect_frames<B: Backend>(
    camera: &mut Camera<B>,
    count: usize,
    max_retries: u32,
) -> Result<Vec<Frame>, CameraError> {
    let mut frames = Vec::with_capacity(count);
    let mut retries = 0;
    while frames.len() < count {
        match camera.poll_frame() {
            Ok(frame) => {
                debug!(
                    count = frame.frame_count,
                    fps = frame.fps,
                    first_pixel = ?frame.pixel(0, 0),
                    "frame received"
                );
                retries = 0;
                frames.push(frame);
            }
            Err(CameraError::NoFrameAvailable(NoFrameReason::Timeout(after)))
                if retries < max_retries =>
            {
                retries += 1;
                warn!(?after, retries, "no frame ready, polling again");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_estimate_tracks_frame_interval() {
        let mut fps = FpsEstimator::new();
        let start = Instant::now();
        assert_eq!(fps.record(start), 0.0);
        let first = fps.record(start + Duration::from_millis(10));
        assert!((first - 100.0).abs() < 1e-6);
        for i in 2..50 {
            fps.record(start + Duration::from_millis(10 * i));
        }
        assert!((fps.fps() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn only_live_and_sequence_are_running() {
        assert!(AcquisitionState::LiveRunning.is_running());
        assert!(AcquisitionState::SequenceRunning.is_running());
        assert!(AcquisitionState::Idle.is_idle());
        assert!(AcquisitionState::Stopped.is_idle());
    }

    #[test]
    fn sequence_session_exhausts_after_budget() {
        let mut session = Session::new(SessionKind::Sequence { frames: 2 });
        assert!(!session.is_exhausted());
        session.delivered = 2;
        assert!(session.is_exhausted());
        let live = Session::new(SessionKind::Live);
        assert!(!live.is_exhausted());
    }
}
