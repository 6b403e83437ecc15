//! Simulated camera driver.
//!
//! [`SimBackend`] behaves like a single attached camera. Frame timing is
//! computed lazily from the acquisition start, the exposure and the readout
//! time, so no background threads are involved. External triggers come either
//! from a fixed synthetic period or from a shared [`TriggerLine`] that another
//! device (a motion stage, a test) pulses.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use camparam::{Limits, ParamId, TriggerMode, Value};
use tracing::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::geometry::{image_size, Geometry, Roi, BYTES_PER_PIXEL};
use crate::sdk::{Backend, CameraInfo, CameraSdk, RawFrame, SdkError};

/// Shortest frame interval the simulated sensor can run at.
const MIN_FRAME_INTERVAL: Duration = Duration::from_micros(100);
const PIXEL_BASELINE: u16 = 100;
const PIXEL_NOISE: u16 = 8;
/// Longest a single poll waits, whatever timeout the caller asks for.
const MAX_POLL_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Behaviour of the simulated camera.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SimConfig {
    pub name: String,
    pub limits: Limits,
    /// Readout time added to every exposure.
    pub readout_ms: u64,
    pub temperature_c: f64,
    pub temperature_setpoint_c: f64,
    /// Period of synthetic trigger pulses. `None` waits for pulses on the
    /// [`TriggerLine`] instead.
    pub external_trigger_period_ms: Option<u64>,
    /// Make every `finish` of a running acquisition fail.
    pub fail_finish: bool,
}

impl SimConfig {
    /// Short readout and trigger period, for tests.
    pub fn fast() -> Self {
        Self {
            readout_ms: 0,
            external_trigger_period_ms: Some(2),
            ..Self::default()
        }
    }

    /// Triggered exposures wait for pulses on the [`TriggerLine`].
    pub fn line_triggered(mut self) -> Self {
        self.external_trigger_period_ms = None;
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "SIM-RetigaE7".to_string(),
            limits: Limits::default(),
            readout_ms: 1,
            temperature_c: -20.0,
            temperature_setpoint_c: -20.0,
            external_trigger_period_ms: Some(10),
            fail_finish: false,
        }
    }
}

/// Trigger input shared between the simulated camera and whatever drives it.
///
/// Every pulse is timestamped; an acquisition consumes the pulses that
/// arrive after it starts.
#[derive(Debug, Clone, Default)]
pub struct TriggerLine {
    inner: Arc<LineState>,
}

#[derive(Debug, Default)]
struct LineState {
    pulses: Mutex<Vec<Instant>>,
    arrived: Condvar,
}

impl TriggerLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit one rising edge now.
    pub fn pulse(&self) {
        self.pulses().push(Instant::now());
        self.inner.arrived.notify_all();
    }

    /// Number of pulses emitted so far.
    pub fn count(&self) -> usize {
        self.pulses().len()
    }

    fn get(&self, index: usize) -> Option<Instant> {
        self.pulses().get(index).copied()
    }

    /// Wait until pulse `index` exists or `deadline` passes.
    fn wait_for(&self, index: usize, deadline: Instant) -> Option<Instant> {
        let mut pulses = self.pulses();
        loop {
            if let Some(at) = pulses.get(index) {
                return Some(*at);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            pulses = self
                .inner
                .arrived
                .wait_timeout(pulses, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    fn pulses(&self) -> MutexGuard<'_, Vec<Instant>> {
        self.inner
            .pulses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Simulated driver library with one attached camera.
#[derive(Debug)]
pub struct SimBackend {
    config: SimConfig,
    line: TriggerLine,
    initialized: bool,
}

impl SimBackend {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            line: TriggerLine::new(),
            initialized: false,
        }
    }

    /// Trigger input of the simulated camera.
    pub fn trigger_line(&self) -> TriggerLine {
        self.line.clone()
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl Backend for SimBackend {
    type Sdk = SimCamera;

    fn init(&mut self) -> Result<(), SdkError> {
        self.initialized = true;
        debug!(camera = %self.config.name, "simulated library initialised");
        Ok(())
    }

    fn uninit(&mut self) -> Result<(), SdkError> {
        self.initialized = false;
        Ok(())
    }

    fn camera_names(&mut self) -> Result<Vec<String>, SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        Ok(vec![self.config.name.clone()])
    }

    fn open(&mut self, name: &str) -> Result<SimCamera, SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        if name != self.config.name {
            return Err(SdkError::NotFound(name.to_string()));
        }
        Ok(SimCamera::new(self.config.clone(), self.line.clone()))
    }
}

#[derive(Debug, Clone, Copy)]
enum RunKind {
    Live { buffer_frames: u64 },
    Sequence { frames: u64 },
}

#[derive(Debug, Clone)]
struct Run {
    kind: RunKind,
    start: Instant,
    /// Line pulses emitted before the start belong to nobody.
    pulse_base: usize,
    interval: Duration,
    trigger: TriggerMode,
    roi: Roi,
    binning: u32,
    /// Number of the last frame handed out.
    delivered: u64,
}

/// One opened simulated camera.
#[derive(Debug)]
pub struct SimCamera {
    config: SimConfig,
    geometry: Geometry,
    line: TriggerLine,
    exposure_ms: u32,
    binning: u32,
    gain: u32,
    readout_port: u32,
    trigger: TriggerMode,
    roi: Roi,
    run: Option<Run>,
    closed: bool,
}

impl SimCamera {
    fn new(config: SimConfig, line: TriggerLine) -> Self {
        let geometry = Geometry::new(&config.limits);
        Self {
            roi: geometry.full_roi(),
            geometry,
            config,
            line,
            exposure_ms: 1,
            binning: 1,
            gain: 1,
            readout_port: 0,
            trigger: TriggerMode::InternalTrigger,
            run: None,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), SdkError> {
        if self.closed {
            return Err(SdkError::fault("camera handle closed"));
        }
        Ok(())
    }

    fn ensure_stopped(&self) -> Result<(), SdkError> {
        self.ensure_open()?;
        if self.run.is_some() {
            return Err(SdkError::fault("acquisition in progress"));
        }
        Ok(())
    }

    fn begin(&mut self, kind: RunKind) -> Result<(), SdkError> {
        self.ensure_stopped()?;
        let exposure = Duration::from_millis(u64::from(self.exposure_ms));
        let readout = Duration::from_millis(self.config.readout_ms);
        self.run = Some(Run {
            kind,
            start: Instant::now(),
            pulse_base: self.line.count(),
            interval: (exposure + readout).max(MIN_FRAME_INTERVAL),
            trigger: self.trigger,
            roi: self.roi,
            binning: self.binning,
            delivered: 0,
        });
        debug!(?kind, trigger = %self.trigger, "simulated acquisition started");
        Ok(())
    }

    /// Timestamp of trigger pulse `index` (0-based) of the run, waiting on
    /// the line until `deadline` when given.
    fn pulse(&self, run: &Run, index: u64, deadline: Option<Instant>) -> Option<Instant> {
        match self.config.external_trigger_period_ms {
            Some(period) => {
                let period = Duration::from_millis(period.max(1));
                Some(run.start + period * u32::try_from(index + 1).ok()?)
            }
            None => {
                let index = run.pulse_base + usize::try_from(index).ok()?;
                match deadline {
                    Some(deadline) => self.line.wait_for(index, deadline),
                    None => self.line.get(index),
                }
            }
        }
    }

    /// End of exposure of frame `number` (1-based), if its trigger has come.
    fn ready_at(&self, run: &Run, number: u64, deadline: Option<Instant>) -> Option<Instant> {
        let k = u32::try_from(number).ok()?;
        if run.trigger.is_per_frame() {
            Some(self.pulse(run, number - 1, deadline)? + run.interval)
        } else if run.trigger.is_triggered() {
            Some(self.pulse(run, 0, deadline)? + run.interval * k)
        } else {
            Some(run.start + run.interval * k)
        }
    }

    /// Next frame number to deliver, skipping frames the circular buffer has
    /// already overwritten.
    fn next_number(&self, run: &Run, now: Instant) -> u64 {
        let next = run.delivered + 1;
        let RunKind::Live { buffer_frames } = run.kind else {
            return next;
        };
        let mut produced = run.delivered;
        while self
            .ready_at(run, produced + 1, None)
            .is_some_and(|at| at <= now)
        {
            produced += 1;
        }
        if produced > run.delivered + buffer_frames {
            let oldest = produced - buffer_frames + 1;
            trace!(skipped = oldest - next, "circular buffer overrun");
            oldest
        } else {
            next
        }
    }

    fn render(&self, run: &Run, number: u64, timestamp: Instant) -> RawFrame {
        let (width, height) = image_size(run.roi, run.binning);
        let mut data = BytesMut::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for y in 0..height {
            for x in 0..width {
                let value = if x == 0 && y == 0 {
                    number as u16
                } else {
                    PIXEL_BASELINE + ((x + y) % 1024) as u16 + fastrand::u16(..PIXEL_NOISE)
                };
                data.put_u16_le(value);
            }
        }
        RawFrame {
            data: data.freeze(),
            width,
            height,
            frame_number: number,
            timestamp,
        }
    }
}

impl CameraSdk for SimCamera {
    fn info(&mut self) -> Result<CameraInfo, SdkError> {
        self.ensure_open()?;
        let (sensor_width, sensor_height) = self.geometry.sensor_size();
        Ok(CameraInfo {
            name: self.config.name.clone(),
            sensor_width,
            sensor_height,
        })
    }

    fn read_param(&mut self, id: ParamId) -> Result<Value, SdkError> {
        self.ensure_open()?;
        let (sensor_width, sensor_height) = self.geometry.sensor_size();
        let value = match id {
            ParamId::Name => Value::from(self.config.name.as_str()),
            ParamId::Temperature => Value::Float(self.config.temperature_c),
            ParamId::TemperatureSetpoint => Value::Float(self.config.temperature_setpoint_c),
            ParamId::ImageWidth => Value::from(sensor_width),
            ParamId::ImageHeight => Value::from(sensor_height),
            ParamId::ExposureTime => Value::from(self.exposure_ms),
            ParamId::Binning => Value::from(self.binning),
            ParamId::Gain => Value::from(self.gain),
            ParamId::ReadoutPort => Value::from(self.readout_port),
            ParamId::TriggerMode => Value::from(self.trigger),
            ParamId::SubarrayHSize
            | ParamId::SubarrayVSize
            | ParamId::SubarrayHPos
            | ParamId::SubarrayVPos => Value::from(self.roi.field(id).unwrap_or_default()),
            ParamId::NumberFrames | ParamId::AcquisitionMode => {
                return Err(SdkError::fault(format!("{id} is not a camera setting")))
            }
        };
        Ok(value)
    }

    fn write_param(&mut self, id: ParamId, value: &Value) -> Result<(), SdkError> {
        self.ensure_stopped()?;
        let mismatch = || SdkError::fault(format!("bad value {value} for {id}"));
        let unsigned = || {
            value
                .as_int()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(mismatch)
        };
        match id {
            ParamId::ExposureTime => self.exposure_ms = unsigned()?,
            ParamId::Binning => self.binning = unsigned()?,
            ParamId::Gain => self.gain = unsigned()?,
            ParamId::ReadoutPort => self.readout_port = unsigned()?,
            ParamId::TriggerMode => self.trigger = value.as_trigger().ok_or_else(mismatch)?,
            ParamId::SubarrayHSize
            | ParamId::SubarrayVSize
            | ParamId::SubarrayHPos
            | ParamId::SubarrayVPos => {
                let roi = self.roi.with_field(id, unsigned()?);
                self.set_roi(roi)?;
            }
            _ => return Err(SdkError::fault(format!("{id} is read-only"))),
        }
        Ok(())
    }

    fn roi(&mut self) -> Result<Roi, SdkError> {
        self.ensure_open()?;
        Ok(self.roi)
    }

    fn set_roi(&mut self, roi: Roi) -> Result<(), SdkError> {
        self.ensure_stopped()?;
        self.geometry
            .validate(roi, 1)
            .map_err(|err| SdkError::fault(err.to_string()))?;
        self.roi = roi;
        Ok(())
    }

    fn reset_roi(&mut self) -> Result<(), SdkError> {
        self.ensure_stopped()?;
        self.roi = self.geometry.full_roi();
        Ok(())
    }

    fn start_live(&mut self, buffer_frames: usize) -> Result<(), SdkError> {
        self.begin(RunKind::Live {
            buffer_frames: buffer_frames.max(1) as u64,
        })
    }

    fn start_sequence(&mut self, frames: u32) -> Result<(), SdkError> {
        if frames == 0 {
            return Err(SdkError::fault("sequence of zero frames"));
        }
        self.begin(RunKind::Sequence {
            frames: u64::from(frames),
        })
    }

    fn poll_frame(&mut self, timeout: Duration) -> Result<RawFrame, SdkError> {
        self.ensure_open()?;
        let timeout = timeout.min(MAX_POLL_WAIT);
        let deadline = Instant::now() + timeout;
        let run = self
            .run
            .clone()
            .ok_or_else(|| SdkError::fault("no acquisition running"))?;
        if let RunKind::Sequence { frames } = run.kind {
            if run.delivered >= frames {
                thread::sleep(timeout);
                return Err(SdkError::Timeout(timeout));
            }
        }
        let number = self.next_number(&run, Instant::now());
        let Some(ready) = self.ready_at(&run, number, Some(deadline)) else {
            return Err(SdkError::Timeout(timeout));
        };
        if ready > deadline {
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
            return Err(SdkError::Timeout(timeout));
        }
        thread::sleep(ready.saturating_duration_since(Instant::now()));
        let frame = self.render(&run, number, ready);
        if let Some(run) = self.run.as_mut() {
            run.delivered = number;
        }
        Ok(frame)
    }

    fn finish(&mut self) -> Result<(), SdkError> {
        self.ensure_open()?;
        let Some(run) = self.run.take() else {
            return Ok(());
        };
        if self.config.fail_finish {
            return Err(SdkError::fault("acquisition abort rejected"));
        }
        debug!(delivered = run.delivered, "simulated acquisition finished");
        Ok(())
    }

    fn close(&mut self) -> Result<(), SdkError> {
        self.ensure_open()?;
        self.run = None;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(config: SimConfig) -> (SimBackend, SimCamera) {
        let mut backend = SimBackend::new(config);
        backend.init().unwrap();
        let name = backend.camera_names().unwrap().remove(0);
        let camera = backend.open(&name).unwrap();
        (backend, camera)
    }

    #[test]
    fn uninitialised_library_has_no_cameras() {
        let mut backend = SimBackend::default();
        assert_eq!(backend.camera_names(), Err(SdkError::NotInitialized));
        backend.init().unwrap();
        assert!(matches!(backend.open("other"), Err(SdkError::NotFound(_))));
    }

    #[test]
    fn internal_trigger_frames_are_numbered_and_shaped() {
        let (_backend, mut cam) = camera(SimConfig::fast());
        cam.write_param(ParamId::Binning, &Value::Int(4)).unwrap();
        cam.set_roi(Roi::new(8, 8, 64, 32)).unwrap();
        cam.start_sequence(3).unwrap();
        for expected in 1..=3u64 {
            let frame = cam.poll_frame(Duration::from_secs(1)).unwrap();
            assert_eq!(frame.frame_number, expected);
            assert_eq!((frame.width, frame.height), (16, 8));
            assert_eq!(frame.data.len(), 16 * 8 * 2);
            assert_eq!(u16::from_le_bytes([frame.data[0], frame.data[1]]), expected as u16);
        }
        cam.finish().unwrap();
    }

    #[test]
    fn live_buffer_overrun_skips_to_oldest_frame() {
        let (_backend, mut cam) = camera(SimConfig::fast());
        cam.write_param(ParamId::ExposureTime, &Value::Int(1)).unwrap();
        cam.set_roi(Roi::new(0, 0, 8, 8)).unwrap();
        cam.start_live(2).unwrap();
        thread::sleep(Duration::from_millis(30));
        let frame = cam.poll_frame(Duration::from_secs(1)).unwrap();
        assert!(frame.frame_number > 2, "got {}", frame.frame_number);
        let next = cam.poll_frame(Duration::from_secs(1)).unwrap();
        assert!(next.frame_number > frame.frame_number);
    }

    #[test]
    fn line_triggered_frames_wait_for_pulses() {
        let (backend, mut cam) = camera(SimConfig::fast().line_triggered());
        let line = backend.trigger_line();
        line.pulse();
        cam.write_param(ParamId::TriggerMode, &Value::Trigger(TriggerMode::EdgeTrigger))
            .unwrap();
        cam.set_roi(Roi::new(0, 0, 8, 8)).unwrap();
        cam.start_sequence(2).unwrap();
        assert_eq!(
            cam.poll_frame(Duration::from_millis(20)).unwrap_err(),
            SdkError::Timeout(Duration::from_millis(20)),
            "pulses before the start are ignored"
        );
        let pulser = {
            let line = line.clone();
            thread::spawn(move || {
                for _ in 0..2 {
                    thread::sleep(Duration::from_millis(5));
                    line.pulse();
                }
            })
        };
        let first = cam.poll_frame(Duration::from_secs(2)).unwrap();
        let second = cam.poll_frame(Duration::from_secs(2)).unwrap();
        pulser.join().unwrap();
        assert_eq!((first.frame_number, second.frame_number), (1, 2));
        assert!(second.timestamp > first.timestamp);
        assert_eq!(line.count(), 3);
    }

    #[test]
    fn oversized_poll_timeout_is_capped() {
        let (_backend, mut cam) = camera(SimConfig::fast());
        cam.set_roi(Roi::new(0, 0, 8, 8)).unwrap();
        cam.start_sequence(1).unwrap();
        let frame = cam.poll_frame(Duration::MAX).unwrap();
        assert_eq!(frame.frame_number, 1);
    }

    #[test]
    fn injected_finish_fault_still_ends_the_run() {
        let config = SimConfig {
            fail_finish: true,
            ..SimConfig::fast()
        };
        let (_backend, mut cam) = camera(config);
        cam.finish().unwrap();
        cam.start_live(2).unwrap();
        assert!(matches!(cam.finish(), Err(SdkError::Fault(_))));
        assert!(cam.poll_frame(Duration::ZERO).is_err());
        cam.start_live(2).unwrap();
    }

    #[test]
    fn handle_rejects_misuse() {
        let (_backend, mut cam) = camera(SimConfig::fast());
        assert!(cam.set_roi(Roi::new(0, 0, 6, 8)).is_err());
        assert!(cam.poll_frame(Duration::ZERO).is_err());
        cam.start_live(4).unwrap();
        assert!(cam.start_live(4).is_err());
        assert!(cam.write_param(ParamId::Gain, &Value::Int(1)).is_err());
        cam.close().unwrap();
        assert!(cam.read_param(ParamId::Gain).is_err());
        assert!(cam.close().is_err());
    }
}
