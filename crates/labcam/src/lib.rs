#![cfg_attr(docsrs, feature(doc_cfg))]
//! Acquisition-device core for scientific cameras.
//!
//! A [`Camera`] owns one opened camera handle, validates every setting write
//! through a [`ParameterStore`] before it reaches the driver, keeps the
//! subarray rectangle consistent, and runs the live/sequence acquisition
//! state machine. The driver itself sits behind the [`sdk`] traits;
//! [`sim`] implements them without hardware.
//!
//! ```rust,no_run
//! use labcam::sim::{SimBackend, SimConfig};
//! use labcam::{CameraDefaults, CameraError, Library, TriggerMode};
//!
//! # fn run() -> Result<(), CameraError> {
//! let library = Library::init(SimBackend::new(SimConfig::default()))?;
//! let mut camera = library.open_first(&CameraDefaults::default())?;
//! camera.set_trigger_mode(TriggerMode::EdgeTrigger)?;
//! camera.start_sequence(5)?;
//! for _ in 0..5 {
//!     let frame = camera.poll_frame()?;
//!     println!("frame {} at {:.1} fps", frame.frame_count, frame.fps);
//! }
//! camera.stop()?;
//! camera.disconnect()?;
//! # Ok(())
//! # }
//! ```

pub use camparam;

pub mod acquisition;
pub mod config;
pub mod frame;
pub mod geometry;
pub mod library;
pub mod sdk;
pub mod settings;
pub mod sim;

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::acquisition::{Session, SessionKind};

pub use acquisition::{collect_frames, AcquisitionState, FpsEstimator, NoFrameReason};
pub use camparam::{
    AcquisitionMode, Limits, ParamError, ParamId, ParameterStore, SettingDescriptor, TriggerMode,
    Value,
};
pub use config::CameraDefaults;
pub use frame::Frame;
pub use geometry::{Geometry, GeometryError, Roi};
pub use library::Library;
pub use sdk::{Backend, CameraInfo, CameraSdk, RawFrame, SdkError};
pub use settings::{CameraSettings, Setting, SharedCamera};

/// Error type produced by camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// A setting value was rejected before any hardware call.
    #[error(transparent)]
    Validation(#[from] ParamError),
    /// The requested ROI does not fit the sensor or binning.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    /// The operation is not valid in the current acquisition state.
    #[error("{operation} is not allowed while acquisition is {state}")]
    InvalidState {
        operation: &'static str,
        state: AcquisitionState,
    },
    /// A poll returned without a frame.
    #[error("no frame available: {0}")]
    NoFrameAvailable(NoFrameReason),
    /// The driver reported a failure.
    #[error("hardware fault: {0}")]
    Hardware(#[from] SdkError),
    /// The camera is already held by another [`Camera`].
    #[error("camera {0} is already open")]
    DeviceBusy(String),
    /// The driver reports no attached camera.
    #[error("no camera detected")]
    NoCamera,
    /// The camera handle has been released.
    #[error("camera is disconnected")]
    Disconnected,
    /// A lock around shared camera state was poisoned by a panic.
    #[error("camera lock poisoned")]
    Poisoned,
}

/// One opened camera.
///
/// All mutating operations take `&mut self`, so every ROI update and
/// acquisition transition flows through a single serialized path. The handle
/// is released on [`disconnect`](Camera::disconnect) or, best effort, on drop.
pub struct Camera<B: Backend> {
    library: Library<B>,
    name: String,
    info: CameraInfo,
    sdk: Option<B::Sdk>,
    store: ParameterStore,
    geometry: Geometry,
    state: AcquisitionState,
    session: Option<Session>,
    completed: Option<u32>,
    buffer_frames: usize,
    poll_timeout: Duration,
}

impl<B: Backend> Camera<B> {
    pub(crate) fn attach(
        library: Library<B>,
        name: String,
        sdk: B::Sdk,
        defaults: &CameraDefaults,
    ) -> Result<Self, CameraError> {
        let limits = Limits::default();
        let mut camera = Self {
            info: CameraInfo {
                name: name.clone(),
                sensor_width: limits.sensor_width,
                sensor_height: limits.sensor_height,
            },
            library,
            name,
            sdk: Some(sdk),
            store: ParameterStore::new(limits),
            geometry: Geometry::new(&limits),
            state: AcquisitionState::Idle,
            session: None,
            completed: None,
            buffer_frames: defaults.buffer_frames.max(1),
            poll_timeout: defaults.poll_timeout(),
        };
        let info = camera.sdk()?.info()?;
        let limits = Limits {
            sensor_width: info.sensor_width,
            sensor_height: info.sensor_height,
            ..limits
        };
        camera.store = ParameterStore::new(limits);
        camera.geometry = Geometry::new(&limits);
        camera.info = info;
        camera.refresh()?;
        camera.apply_defaults(defaults)?;
        Ok(camera)
    }

    /// Driver name of the camera.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity and sensor size reported at open.
    pub fn info(&self) -> &CameraInfo {
        &self.info
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn limits(&self) -> &Limits {
        self.store.limits()
    }

    /// Cached setting values as of the last hardware read or write.
    pub fn settings(&self) -> &ParameterStore {
        &self.store
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Cached ROI as of the last hardware read or write.
    pub fn roi(&self) -> Roi {
        self.geometry.roi()
    }

    /// Binned `(columns, rows)` of the frames the current settings produce.
    pub fn image_size(&self) -> (u32, u32) {
        self.geometry.image_size()
    }

    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    /// Change the circular-buffer depth used by the next live acquisition.
    pub fn set_buffer_frames(&mut self, frames: usize) -> Result<(), CameraError> {
        self.ensure_idle("set_buffer_frames")?;
        self.buffer_frames = frames.max(1);
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Change how long [`poll_frame`](Camera::poll_frame) blocks, capped at
    /// [`MAX_POLL_TIMEOUT`](acquisition::MAX_POLL_TIMEOUT).
    pub fn set_poll_timeout(&mut self, timeout: Duration) {
        self.poll_timeout = timeout.min(acquisition::MAX_POLL_TIMEOUT);
    }

    /// Re-read every hardware setting and the ROI into the cache.
    pub fn refresh(&mut self) -> Result<(), CameraError> {
        for id in ParamId::ALL {
            if id.is_hardware() && !id.is_subarray() {
                self.get_parameter(id)?;
            }
        }
        self.read_roi()?;
        Ok(())
    }

    /// Read a setting. Hardware settings are read from the driver.
    pub fn get_parameter(&mut self, id: ParamId) -> Result<Value, CameraError> {
        if !id.is_hardware() {
            return Ok(self.store.get(id).clone());
        }
        if id.is_subarray() {
            let roi = self.read_roi()?;
            return Ok(Value::from(roi.field(id).unwrap_or_default()));
        }
        let value = self.sdk()?.read_param(id)?;
        self.store.record(id, value.clone());
        if id == ParamId::Binning {
            self.geometry.set_binning(self.store.binning());
        }
        Ok(value)
    }

    /// Validate and write a setting, returning the value read back afterwards.
    ///
    /// Invalid values fail without any driver call. Hardware settings can
    /// only change while no acquisition is running.
    pub fn set_parameter(
        &mut self,
        id: ParamId,
        value: impl Into<Value>,
    ) -> Result<Value, CameraError> {
        if !id.is_hardware() {
            return Ok(self.store.set(id, value)?);
        }
        let value = self.store.validate(id, value.into())?;
        self.ensure_idle(id.name())?;
        if id.is_subarray() {
            self.set_subarray_field(id, unsigned(&value))?;
            return self.get_parameter(id);
        }
        if id == ParamId::Binning {
            self.geometry.validate(self.geometry.roi(), unsigned(&value))?;
        }
        debug!(camera = %self.name, setting = %id, %value, "write setting");
        self.sdk()?.write_param(id, &value)?;
        self.get_parameter(id)
    }

    /// Read a setting addressed by its host-facing name.
    pub fn get_parameter_by_name(&mut self, name: &str) -> Result<Value, CameraError> {
        let id: ParamId = name.parse()?;
        self.get_parameter(id)
    }

    /// Parse `text` for the named setting and write it.
    pub fn set_parameter_by_name(&mut self, name: &str, text: &str) -> Result<Value, CameraError> {
        let id: ParamId = name.parse()?;
        let value = self.store.parse(id, text)?;
        self.set_parameter(id, value)
    }

    pub fn exposure_ms(&self) -> u32 {
        self.store.exposure_ms()
    }

    pub fn set_exposure_ms(&mut self, exposure_ms: u32) -> Result<(), CameraError> {
        self.set_parameter(ParamId::ExposureTime, exposure_ms)
            .map(drop)
    }

    pub fn binning(&self) -> u32 {
        self.store.binning()
    }

    pub fn set_binning(&mut self, binning: u32) -> Result<(), CameraError> {
        self.set_parameter(ParamId::Binning, binning).map(drop)
    }

    pub fn gain(&self) -> u32 {
        self.store.gain()
    }

    pub fn set_gain(&mut self, gain: u32) -> Result<(), CameraError> {
        self.set_parameter(ParamId::Gain, gain).map(drop)
    }

    pub fn readout_port(&self) -> u32 {
        self.store.readout_port()
    }

    pub fn set_readout_port(&mut self, port: u32) -> Result<(), CameraError> {
        self.set_parameter(ParamId::ReadoutPort, port).map(drop)
    }

    pub fn trigger_mode(&self) -> TriggerMode {
        self.store.trigger_mode()
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), CameraError> {
        self.set_parameter(ParamId::TriggerMode, mode).map(drop)
    }

    /// Sensor temperature in °C, read from the camera.
    pub fn temperature(&mut self) -> Result<f64, CameraError> {
        self.read_float(ParamId::Temperature)
    }

    /// Cooler setpoint in °C, read from the camera.
    pub fn temperature_setpoint(&mut self) -> Result<f64, CameraError> {
        self.read_float(ParamId::TemperatureSetpoint)
    }

    /// Replace the whole ROI rectangle. On error the device ROI is unchanged.
    pub fn apply_roi(&mut self, roi: Roi) -> Result<Roi, CameraError> {
        self.ensure_idle("apply_roi")?;
        self.geometry.validate(roi, self.geometry.binning())?;
        debug!(camera = %self.name, %roi, "write ROI");
        self.sdk()?.set_roi(roi)?;
        self.read_roi()
    }

    /// Set the subarray width, keeping the other three fields.
    pub fn set_subarray_hsize(&mut self, width: u32) -> Result<Roi, CameraError> {
        self.set_subarray(ParamId::SubarrayHSize, width)
    }

    /// Set the subarray height, keeping the other three fields.
    pub fn set_subarray_vsize(&mut self, height: u32) -> Result<Roi, CameraError> {
        self.set_subarray(ParamId::SubarrayVSize, height)
    }

    /// Set the subarray horizontal offset, keeping the other three fields.
    pub fn set_subarray_hpos(&mut self, h0: u32) -> Result<Roi, CameraError> {
        self.set_subarray(ParamId::SubarrayHPos, h0)
    }

    /// Set the subarray vertical offset, keeping the other three fields.
    pub fn set_subarray_vpos(&mut self, v0: u32) -> Result<Roi, CameraError> {
        self.set_subarray(ParamId::SubarrayVPos, v0)
    }

    /// Restore the full-sensor ROI.
    pub fn reset_roi(&mut self) -> Result<Roi, CameraError> {
        self.ensure_idle("reset_roi")?;
        self.sdk()?.reset_roi()?;
        self.read_roi()
    }

    /// Start continuous capture into the circular buffer.
    pub fn start_live(&mut self) -> Result<(), CameraError> {
        self.ensure_idle("start_live")?;
        let depth = self.buffer_frames;
        self.sdk()?.start_live(depth)?;
        self.begin(AcquisitionState::LiveRunning, SessionKind::Live);
        info!(
            camera = %self.name,
            buffer_frames = depth,
            roi = %self.geometry.roi(),
            binning = self.geometry.binning(),
            "live acquisition started"
        );
        Ok(())
    }

    /// Start a bounded capture of exactly `frames` frames.
    pub fn start_sequence(&mut self, frames: u32) -> Result<(), CameraError> {
        if frames == 0 {
            return Err(ParamError::Validation {
                param: ParamId::NumberFrames,
                reason: "a sequence needs at least one frame".into(),
            }
            .into());
        }
        self.ensure_idle("start_sequence")?;
        self.sdk()?.start_sequence(frames)?;
        self.begin(
            AcquisitionState::SequenceRunning,
            SessionKind::Sequence { frames },
        );
        info!(
            camera = %self.name,
            frames,
            roi = %self.geometry.roi(),
            binning = self.geometry.binning(),
            "sequence acquisition started"
        );
        Ok(())
    }

    /// Start live capture for [`AcquisitionMode::Continuous`] or a sequence of
    /// `frames` for [`AcquisitionMode::MultiFrame`].
    pub fn start_acquisition(
        &mut self,
        mode: AcquisitionMode,
        frames: u32,
    ) -> Result<(), CameraError> {
        match mode {
            AcquisitionMode::Continuous => self.start_live(),
            AcquisitionMode::MultiFrame => self.start_sequence(frames),
        }
    }

    /// Block until the next frame arrives or the poll timeout elapses.
    ///
    /// Once a sequence has delivered its last frame the camera returns to
    /// [`AcquisitionState::Idle`] and further polls fail with
    /// [`NoFrameReason::SequenceComplete`] instead of blocking.
    pub fn poll_frame(&mut self) -> Result<Frame, CameraError> {
        if !self.state.is_running() {
            if let Some(frames) = self.completed {
                return Err(CameraError::NoFrameAvailable(
                    NoFrameReason::SequenceComplete { frames },
                ));
            }
            return Err(CameraError::InvalidState {
                operation: "poll_frame",
                state: self.state,
            });
        }
        let timeout = self.poll_timeout;
        let raw = match self.sdk()?.poll_frame(timeout) {
            Ok(raw) => raw,
            Err(SdkError::Timeout(after)) => {
                return Err(CameraError::NoFrameAvailable(NoFrameReason::Timeout(after)))
            }
            Err(err) => return Err(err.into()),
        };
        let session = self.session.as_mut().ok_or(CameraError::InvalidState {
            operation: "poll_frame",
            state: self.state,
        })?;
        session.delivered += 1;
        let fps = session.fps.record(raw.timestamp);
        let exhausted = session.is_exhausted();
        let frame = Frame {
            data: raw.data,
            width: raw.width,
            height: raw.height,
            frame_count: raw.frame_number,
            fps,
            roi: self.geometry.roi(),
            binning: self.geometry.binning(),
            timestamp: raw.timestamp,
        };
        if exhausted {
            self.complete_sequence();
        }
        Ok(frame)
    }

    /// End the running acquisition and discard unread frames.
    ///
    /// Calling `stop` while nothing runs is a no-op.
    pub fn stop(&mut self) -> Result<(), CameraError> {
        self.completed = None;
        if !self.state.is_running() {
            return Ok(());
        }
        let delivered = self.session.take().map(|s| s.delivered).unwrap_or_default();
        self.state = AcquisitionState::Stopped;
        info!(camera = %self.name, delivered, "acquisition stopped");
        self.sdk()?.finish()?;
        Ok(())
    }

    /// Stop any acquisition and release the camera handle.
    ///
    /// Release is attempted even when stopping fails; the first error is
    /// returned. Closing an already closed camera is a no-op.
    pub fn close(&mut self) -> Result<(), CameraError> {
        let Some(mut sdk) = self.sdk.take() else {
            return Ok(());
        };
        let mut first_err = None;
        if self.state.is_running() {
            self.state = AcquisitionState::Stopped;
            self.session = None;
            if let Err(err) = sdk.finish() {
                warn!(camera = %self.name, error = %err, "failed to stop acquisition during close");
                first_err = Some(err);
            }
        }
        if let Err(err) = sdk.close() {
            warn!(camera = %self.name, error = %err, "failed to close camera");
            if first_err.is_none() {
                first_err = Some(err);
            }
        }
        self.library.release(&self.name);
        info!(camera = %self.name, "camera closed");
        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Release the camera; see [`close`](Camera::close).
    pub fn disconnect(mut self) -> Result<(), CameraError> {
        self.close()
    }

    fn apply_defaults(&mut self, defaults: &CameraDefaults) -> Result<(), CameraError> {
        // Gain 1 and a port-compatible exposure are legal on every port, so
        // the port switch cannot trip over the camera's previous settings.
        self.set_parameter(ParamId::Gain, 1u32)?;
        let port_max = self.limits().max_exposure_ms(defaults.readout_port);
        if self.store.exposure_ms() > port_max {
            self.set_parameter(ParamId::ExposureTime, defaults.exposure_ms.min(port_max))?;
        }
        self.set_parameter(ParamId::ReadoutPort, defaults.readout_port)?;
        self.set_parameter(ParamId::Gain, defaults.gain)?;
        self.set_parameter(ParamId::ExposureTime, defaults.exposure_ms)?;
        self.set_parameter(ParamId::Binning, defaults.binning)?;
        self.set_parameter(ParamId::TriggerMode, defaults.trigger_mode)?;
        match defaults.roi {
            Some(roi) => self.apply_roi(roi)?,
            None => self.reset_roi()?,
        };
        debug!(camera = %self.name, ?defaults, "defaults applied");
        Ok(())
    }

    fn set_subarray(&mut self, id: ParamId, value: u32) -> Result<Roi, CameraError> {
        self.store.validate(id, Value::from(value))?;
        self.set_subarray_field(id, value)
    }

    /// Read the authoritative rectangle, replace one field, write it whole.
    fn set_subarray_field(&mut self, id: ParamId, value: u32) -> Result<Roi, CameraError> {
        self.ensure_idle(id.name())?;
        let current = self.read_roi()?;
        self.apply_roi(current.with_field(id, value))
    }

    fn read_roi(&mut self) -> Result<Roi, CameraError> {
        let roi = self.sdk()?.roi()?;
        for id in [
            ParamId::SubarrayHSize,
            ParamId::SubarrayVSize,
            ParamId::SubarrayHPos,
            ParamId::SubarrayVPos,
        ] {
            self.store
                .record(id, Value::from(roi.field(id).unwrap_or_default()));
        }
        self.geometry.set_roi(roi);
        Ok(roi)
    }

    fn read_float(&mut self, id: ParamId) -> Result<f64, CameraError> {
        let value = self.get_parameter(id)?;
        value.as_float().ok_or_else(|| {
            ParamError::Type {
                param: id,
                expected: camparam::ValueKind::Float,
            }
            .into()
        })
    }

    fn begin(&mut self, state: AcquisitionState, kind: SessionKind) {
        self.state = state;
        self.session = Some(Session::new(kind));
        self.completed = None;
    }

    fn complete_sequence(&mut self) {
        let frames = match self.session.take().map(|s| s.kind) {
            Some(SessionKind::Sequence { frames }) => frames,
            _ => 0,
        };
        self.state = AcquisitionState::Idle;
        self.completed = Some(frames);
        info!(camera = %self.name, frames, "sequence complete");
        if let Some(sdk) = self.sdk.as_mut() {
            if let Err(err) = sdk.finish() {
                warn!(camera = %self.name, error = %err, "failed to finish completed sequence");
            }
        }
    }

    fn ensure_idle(&self, operation: &'static str) -> Result<(), CameraError> {
        if self.state.is_running() {
            return Err(CameraError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn sdk(&mut self) -> Result<&mut B::Sdk, CameraError> {
        self.sdk.as_mut().ok_or(CameraError::Disconnected)
    }
}

impl<B: Backend> Drop for Camera<B> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(camera = %self.name, error = %err, "camera release on drop failed");
        }
    }
}

impl<B: Backend> std::fmt::Debug for Camera<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("roi", &self.geometry.roi())
            .field("binning", &self.geometry.binning())
            .field("connected", &self.sdk.is_some())
            .finish()
    }
}

/// Integer settings are range-checked before this is reached.
fn unsigned(value: &Value) -> u32 {
    value
        .as_int()
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBackend, SimConfig, TriggerLine};

    fn open() -> Camera<SimBackend> {
        open_with(SimConfig::fast()).1
    }

    fn open_with(config: SimConfig) -> (Library<SimBackend>, Camera<SimBackend>) {
        let library = Library::init(SimBackend::new(config)).expect("init library");
        let camera = library
            .open_first(&CameraDefaults::default())
            .expect("open camera");
        (library, camera)
    }

    /// Edge-triggered camera fed from a trigger line the test drives.
    fn open_line_triggered(timeout: Duration) -> (TriggerLine, Camera<SimBackend>) {
        let backend = SimBackend::new(SimConfig::fast().line_triggered());
        let line = backend.trigger_line();
        let library = Library::init(backend).expect("init library");
        let mut camera = library
            .open_first(&CameraDefaults::default())
            .expect("open camera");
        camera.set_trigger_mode(TriggerMode::EdgeTrigger).unwrap();
        camera.apply_roi(Roi::new(0, 0, 64, 64)).unwrap();
        camera.set_poll_timeout(timeout);
        (line, camera)
    }

    /// Pulse `line` once now, then once after each of `gaps`.
    fn pulse_after(line: &TriggerLine, gaps: &[u64]) -> std::thread::JoinHandle<()> {
        let line = line.clone();
        let gaps = gaps.to_vec();
        std::thread::spawn(move || {
            line.pulse();
            for gap in gaps {
                std::thread::sleep(Duration::from_millis(gap));
                line.pulse();
            }
        })
    }

    #[test]
    fn open_applies_defaults_and_reads_sensor() {
        let camera = open();
        assert_eq!(camera.binning(), 1);
        assert_eq!(camera.exposure_ms(), 1);
        assert_eq!(camera.trigger_mode(), TriggerMode::InternalTrigger);
        assert_eq!(camera.roi(), Roi::new(0, 0, 3200, 2200));
        assert_eq!(camera.state(), AcquisitionState::Idle);
    }

    #[test]
    fn invalid_binning_is_rejected_without_change() {
        let mut camera = open();
        for candidate in [0i64, 3, 5, 16] {
            let err = camera.set_parameter(ParamId::Binning, candidate).unwrap_err();
            assert!(matches!(err, CameraError::Validation(ParamError::Validation { .. })));
            assert_eq!(camera.get_parameter(ParamId::Binning).unwrap(), Value::Int(1));
        }
    }

    #[test]
    fn invalid_roi_leaves_device_roi_unchanged() {
        let mut camera = open();
        let before = camera.apply_roi(Roi::new(400, 400, 1000, 800)).unwrap();
        for roi in [
            Roi::new(0, 0, 1002, 800),
            Roi::new(0, 0, 1000, 801),
            Roi::new(2400, 0, 1000, 800),
            Roi::new(0, 1600, 1000, 800),
            Roi::new(0, 0, 0, 800),
        ] {
            let err = camera.apply_roi(roi).unwrap_err();
            assert!(matches!(err, CameraError::Geometry(_)), "{roi}");
            assert_eq!(camera.driver_roi(), before);
        }
    }

    #[test]
    fn per_axis_setter_changes_only_its_field() {
        let mut camera = open();
        let before = camera.apply_roi(Roi::new(400, 200, 1000, 800)).unwrap();
        camera
            .set_parameter(ParamId::SubarrayHPos, 800u32)
            .expect("hpos");
        let after = camera.driver_roi();
        assert_eq!(after, Roi { h0: 800, ..before });
        camera.set_subarray_vsize(400).expect("vsize");
        assert_eq!(camera.driver_roi(), Roi::new(800, 200, 1000, 400));
        assert_eq!(
            camera.get_parameter(ParamId::SubarrayVSize).unwrap(),
            Value::Int(400)
        );
    }

    #[test]
    fn per_axis_setter_rejects_rectangle_past_sensor() {
        let mut camera = open();
        camera.apply_roi(Roi::new(0, 0, 3200, 2200)).unwrap();
        let err = camera.set_subarray_hpos(4).unwrap_err();
        assert!(matches!(err, CameraError::Geometry(GeometryError::OutOfBounds { .. })));
        assert_eq!(camera.driver_roi(), Roi::new(0, 0, 3200, 2200));
    }

    #[test]
    fn exposure_round_trips_at_boundaries() {
        let mut camera = open();
        for ms in [50u32, 0] {
            camera.set_parameter(ParamId::ExposureTime, ms).unwrap();
            assert_eq!(
                camera.get_parameter(ParamId::ExposureTime).unwrap(),
                Value::from(ms)
            );
        }
        let err = camera
            .set_parameter(ParamId::ExposureTime, camparam::MAX_EXPOSURE_MS)
            .unwrap_err();
        assert!(matches!(err, CameraError::Validation(ParamError::Range { .. })));
        camera.set_readout_port(1).unwrap();
        camera
            .set_parameter(ParamId::ExposureTime, camparam::MAX_EXPOSURE_MS)
            .unwrap();
        assert_eq!(
            camera.get_parameter(ParamId::ExposureTime).unwrap(),
            Value::from(camparam::MAX_EXPOSURE_MS)
        );
    }

    #[test]
    fn gain_depends_on_readout_port() {
        let mut camera = open();
        let err = camera.set_gain(2).unwrap_err();
        assert!(matches!(err, CameraError::Validation(ParamError::Range { .. })));
        assert_eq!(camera.gain(), 1);
        camera.set_readout_port(2).unwrap();
        camera.set_gain(2).unwrap();
        assert_eq!(camera.get_parameter(ParamId::Gain).unwrap(), Value::Int(2));
    }

    #[test]
    fn second_start_live_is_invalid_state() {
        let mut camera = open();
        camera.start_live().unwrap();
        let err = camera.start_live().unwrap_err();
        assert!(matches!(
            err,
            CameraError::InvalidState {
                state: AcquisitionState::LiveRunning,
                ..
            }
        ));
        assert!(matches!(
            camera.start_sequence(3),
            Err(CameraError::InvalidState { .. })
        ));
        assert_eq!(camera.state(), AcquisitionState::LiveRunning);
    }

    #[test]
    fn stop_then_start_live_succeeds() {
        let mut camera = open();
        camera.start_live().unwrap();
        camera.poll_frame().unwrap();
        camera.stop().unwrap();
        assert_eq!(camera.state(), AcquisitionState::Stopped);
        camera.start_live().unwrap();
        let frame = camera.poll_frame().unwrap();
        assert_eq!(frame.frame_count, 1, "frame count restarts per session");
        camera.stop().unwrap();
    }

    #[test]
    fn sequence_is_exhausted_after_budget() {
        let mut camera = open();
        camera.start_sequence(5).unwrap();
        for expected in 1..=5 {
            let frame = camera.poll_frame().unwrap();
            assert_eq!(frame.frame_count, expected);
        }
        assert_eq!(camera.state(), AcquisitionState::Idle);
        let err = camera.poll_frame().unwrap_err();
        assert!(matches!(
            err,
            CameraError::NoFrameAvailable(NoFrameReason::SequenceComplete { frames: 5 })
        ));
        camera.start_sequence(1).unwrap();
        assert_eq!(camera.poll_frame().unwrap().frame_count, 1);
    }

    #[test]
    fn poll_while_idle_is_invalid_state() {
        let mut camera = open();
        assert!(matches!(
            camera.poll_frame(),
            Err(CameraError::InvalidState { .. })
        ));
        assert!(matches!(
            camera.start_sequence(0),
            Err(CameraError::Validation(_))
        ));
    }

    #[test]
    fn settings_are_locked_while_running() {
        let mut camera = open();
        camera.start_live().unwrap();
        assert!(matches!(
            camera.set_exposure_ms(10),
            Err(CameraError::InvalidState { .. })
        ));
        assert!(matches!(
            camera.apply_roi(Roi::new(0, 0, 400, 400)),
            Err(CameraError::InvalidState { .. })
        ));
        camera.stop().unwrap();
        camera.set_exposure_ms(10).unwrap();
    }

    #[test]
    fn edge_triggered_sequence_end_to_end() {
        let mut camera = open();
        camera.set_trigger_mode(TriggerMode::EdgeTrigger).unwrap();
        camera.set_binning(2).unwrap();
        camera.apply_roi(Roi::new(100, 200, 640, 480)).unwrap();
        camera.start_sequence(5).unwrap();
        let mut last = 0;
        for _ in 0..5 {
            let frame = camera.poll_frame().unwrap();
            assert!(frame.frame_count > last);
            last = frame.frame_count;
            assert_eq!((frame.width, frame.height), (320, 240));
            assert_eq!(frame.row_bytes(), 320 * 2);
            assert_eq!(frame.data.len(), 320 * 240 * 2);
        }
        assert_eq!(last, 5);
        camera.stop().unwrap();
        camera.disconnect().unwrap();
    }

    #[test]
    fn same_camera_cannot_be_opened_twice() {
        let library = Library::init(SimBackend::new(SimConfig::fast())).unwrap();
        let camera = library.open_first(&CameraDefaults::default()).unwrap();
        let name = camera.name().to_string();
        assert!(matches!(
            library.open(&name, &CameraDefaults::default()),
            Err(CameraError::DeviceBusy(_))
        ));
        camera.disconnect().unwrap();
        assert!(!library.is_open(&name));
        let again = library.open(&name, &CameraDefaults::default()).unwrap();
        drop(again);
        assert!(!library.is_open(&name));
    }

    #[test]
    fn host_names_dispatch_to_typed_settings() {
        let mut camera = open();
        camera
            .set_parameter_by_name("trigger_mode", "Edge Trigger")
            .unwrap();
        assert_eq!(camera.trigger_mode(), TriggerMode::EdgeTrigger);
        assert_eq!(
            camera.get_parameter_by_name("image_width").unwrap(),
            Value::Int(3200)
        );
        assert!(matches!(
            camera.set_parameter_by_name("temperature", "5"),
            Err(CameraError::Validation(ParamError::ReadOnly(_)))
        ));
        assert!(matches!(
            camera.get_parameter_by_name("bogus"),
            Err(CameraError::Validation(ParamError::Unknown(_)))
        ));
        assert!(camera.temperature().unwrap() < 0.0);
    }

    #[test]
    fn oversized_poll_timeout_is_capped() {
        let mut camera = open();
        camera.set_poll_timeout(Duration::MAX);
        assert_eq!(camera.poll_timeout(), acquisition::MAX_POLL_TIMEOUT);
        camera.start_sequence(1).unwrap();
        assert_eq!(camera.poll_frame().unwrap().frame_count, 1);
    }

    #[test]
    fn driver_timeout_surfaces_as_no_frame_available() {
        let (_line, mut camera) = open_line_triggered(Duration::from_millis(20));
        camera.start_sequence(1).unwrap();
        let err = camera.poll_frame().unwrap_err();
        assert!(matches!(
            err,
            CameraError::NoFrameAvailable(NoFrameReason::Timeout(after))
                if after == Duration::from_millis(20)
        ));
        assert_eq!(camera.state(), AcquisitionState::SequenceRunning);
    }

    #[test]
    fn collect_frames_retry_budget_resets_after_each_frame() {
        let (line, mut camera) = open_line_triggered(Duration::from_millis(30));
        camera.start_sequence(3).unwrap();
        // Each 50 ms gap costs one timed-out poll; two gaps need the reset.
        let pulser = pulse_after(&line, &[50, 50]);
        let frames = collect_frames(&mut camera, 3, 1).unwrap();
        pulser.join().unwrap();
        let counts: Vec<u64> = frames.iter().map(|f| f.frame_count).collect();
        assert_eq!(counts, vec![1, 2, 3]);
        assert_eq!(camera.state(), AcquisitionState::Idle);
    }

    #[test]
    fn collect_frames_gives_up_past_retry_budget() {
        let (line, mut camera) = open_line_triggered(Duration::from_millis(10));
        camera.start_sequence(2).unwrap();
        pulse_after(&line, &[]).join().unwrap();
        let err = collect_frames(&mut camera, 2, 2).unwrap_err();
        assert!(matches!(
            err,
            CameraError::NoFrameAvailable(NoFrameReason::Timeout(_))
        ));
    }

    #[test]
    fn close_releases_handle_when_finish_fails() {
        let (library, mut camera) = open_with(SimConfig {
            fail_finish: true,
            ..SimConfig::fast()
        });
        let name = camera.name().to_string();
        camera.start_live().unwrap();
        assert!(matches!(camera.close(), Err(CameraError::Hardware(_))));
        assert!(!library.is_open(&name));
        assert!(matches!(
            camera.get_parameter(ParamId::Binning),
            Err(CameraError::Disconnected)
        ));
        camera.close().unwrap();

        let mut camera = library.open(&name, &CameraDefaults::default()).unwrap();
        camera.start_sequence(2).unwrap();
        assert!(matches!(camera.disconnect(), Err(CameraError::Hardware(_))));
        assert!(!library.is_open(&name));
    }

    #[test]
    fn buffer_depth_changes_only_while_idle() {
        let mut camera = open();
        camera.set_buffer_frames(0).unwrap();
        assert_eq!(camera.buffer_frames(), 1);
        camera.set_buffer_frames(4).unwrap();
        camera.start_live().unwrap();
        assert!(matches!(
            camera.set_buffer_frames(8),
            Err(CameraError::InvalidState { .. })
        ));
        assert_eq!(camera.buffer_frames(), 4);
    }

    impl<B: Backend> Camera<B> {
        /// ROI as reported by the driver, bypassing the cache.
        fn driver_roi(&mut self) -> Roi {
            self.sdk().unwrap().roi().unwrap()
        }
    }
}
