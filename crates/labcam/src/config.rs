//! Settings applied to a camera right after it is opened.

use std::time::Duration;

use camparam::TriggerMode;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::acquisition::{DEFAULT_BUFFER_FRAMES, DEFAULT_POLL_TIMEOUT, MAX_POLL_TIMEOUT};
use crate::geometry::Roi;

/// Initial device configuration.
///
/// The defaults reproduce a freshly opened camera: no binning, internal
/// trigger, 1 ms exposure, standard readout port, unit gain, full sensor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct CameraDefaults {
    pub binning: u32,
    pub exposure_ms: u32,
    pub readout_port: u32,
    pub gain: u32,
    pub trigger_mode: TriggerMode,
    /// `None` selects the full sensor.
    pub roi: Option<Roi>,
    /// Circular-buffer depth used by live acquisitions.
    pub buffer_frames: usize,
    /// How long a single poll may block, in milliseconds.
    pub poll_timeout_ms: u64,
}

impl CameraDefaults {
    /// Poll timeout, capped at [`MAX_POLL_TIMEOUT`].
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms).min(MAX_POLL_TIMEOUT)
    }
}

impl Default for CameraDefaults {
    fn default() -> Self {
        Self {
            binning: 1,
            exposure_ms: 1,
            readout_port: 0,
            gain: 1,
            trigger_mode: TriggerMode::InternalTrigger,
            roi: None,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_poll_timeout_is_capped() {
        let defaults = CameraDefaults {
            poll_timeout_ms: u64::MAX,
            ..CameraDefaults::default()
        };
        assert_eq!(defaults.poll_timeout(), MAX_POLL_TIMEOUT);
        assert_eq!(CameraDefaults::default().poll_timeout(), DEFAULT_POLL_TIMEOUT);
    }
}
