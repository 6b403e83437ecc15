//! Seam between the acquisition core and a vendor camera SDK.
//!
//! A [`Backend`] models the process-wide driver library (init, enumerate,
//! open); each opened camera is a [`CameraSdk`] handle. The core never calls
//! the vendor library directly, so any PVCAM-like SDK can sit behind these
//! two traits. [`crate::sim`] provides a simulated implementation.

use std::time::{Duration, Instant};

use bytes::Bytes;
use camparam::{ParamId, Value};
use thiserror::Error;

use crate::geometry::Roi;

/// Failure reported by the SDK layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SdkError {
    /// The driver library has not been initialised (or was released).
    #[error("camera library not initialised")]
    NotInitialized,
    /// No camera with this name is attached.
    #[error("camera not found: {0}")]
    NotFound(String),
    /// No frame became ready within the poll timeout.
    #[error("no frame ready after {0:?}")]
    Timeout(Duration),
    /// Any other driver-reported failure.
    #[error("camera fault: {0}")]
    Fault(String),
}

impl SdkError {
    pub fn fault<S: Into<String>>(msg: S) -> Self {
        SdkError::Fault(msg.into())
    }
}

/// Static identity of an opened camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    /// Product name reported by the driver.
    pub name: String,
    pub sensor_width: u32,
    pub sensor_height: u32,
}

/// Frame as handed over by the driver.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Row-major little-endian 16-bit pixels.
    pub data: Bytes,
    /// Binned columns.
    pub width: u32,
    /// Binned rows.
    pub height: u32,
    /// Driver frame counter, 1 for the first frame of an acquisition.
    pub frame_number: u64,
    /// End of exposure as tracked by the driver.
    pub timestamp: Instant,
}

/// Operations on one opened camera.
///
/// Subarray fields are transferred as whole rectangles through
/// [`roi`](CameraSdk::roi)/[`set_roi`](CameraSdk::set_roi); the hardware
/// has no per-axis ROI call.
pub trait CameraSdk: Send {
    /// Identity and sensor size.
    fn info(&mut self) -> Result<CameraInfo, SdkError>;
    /// Read the current value of a hardware setting.
    fn read_param(&mut self, id: ParamId) -> Result<Value, SdkError>;
    /// Write a hardware setting that has already been validated.
    fn write_param(&mut self, id: ParamId, value: &Value) -> Result<(), SdkError>;
    /// Current ROI in unbinned sensor pixels.
    fn roi(&mut self) -> Result<Roi, SdkError>;
    /// Replace the whole ROI rectangle.
    fn set_roi(&mut self, roi: Roi) -> Result<(), SdkError>;
    /// Restore the full-sensor ROI.
    fn reset_roi(&mut self) -> Result<(), SdkError>;
    /// Begin continuous capture into a circular buffer of `buffer_frames`.
    fn start_live(&mut self, buffer_frames: usize) -> Result<(), SdkError>;
    /// Begin a bounded capture of exactly `frames` frames.
    fn start_sequence(&mut self, frames: u32) -> Result<(), SdkError>;
    /// Block until the next frame is ready or `timeout` elapses.
    fn poll_frame(&mut self, timeout: Duration) -> Result<RawFrame, SdkError>;
    /// End the running acquisition, discarding unread frames.
    fn finish(&mut self) -> Result<(), SdkError>;
    /// Release the camera handle.
    fn close(&mut self) -> Result<(), SdkError>;
}

/// The process-wide driver library.
pub trait Backend: Send + 'static {
    type Sdk: CameraSdk + 'static;

    fn init(&mut self) -> Result<(), SdkError>;
    fn uninit(&mut self) -> Result<(), SdkError>;
    /// Names of the attached cameras, in driver order.
    fn camera_names(&mut self) -> Result<Vec<String>, SdkError>;
    fn open(&mut self, name: &str) -> Result<Self::Sdk, SdkError>;
}
