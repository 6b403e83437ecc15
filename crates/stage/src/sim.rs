//! Simulated velocity-limited stage.
//!
//! Motion is modelled analytically from the start time and velocity. While a
//! move with trigger output is in flight, a helper thread sleeps until each
//! trigger position is crossed and pulses the output.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Stage, StageError, TriggerOutput, TriggerOutputMode, TriggerParams};

/// Travel and speed limits of the simulated axis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SimStageConfig {
    pub serial: String,
    pub axis: String,
    pub min_position: f64,
    pub max_position: f64,
    pub max_velocity: f64,
    /// Velocity before the first `set_velocity`.
    pub velocity: f64,
    /// Position at power-up.
    pub position: f64,
}

impl Default for SimStageConfig {
    fn default() -> Self {
        Self {
            serial: "SIM-C663".to_string(),
            axis: "1".to_string(),
            min_position: 0.0,
            max_position: 25.0,
            max_velocity: 100.0,
            velocity: 1.0,
            position: 0.0,
        }
    }
}

struct Motion {
    from: f64,
    to: f64,
    velocity: f64,
    started: Instant,
    /// Dropping the sender cancels the pulse thread.
    cancel: Option<Sender<()>>,
    pulses: Option<JoinHandle<()>>,
}

impl Motion {
    fn duration(&self) -> Duration {
        Duration::from_secs_f64((self.to - self.from).abs() / self.velocity)
    }

    fn position_at(&self, now: Instant) -> f64 {
        let travelled = now.saturating_duration_since(self.started).as_secs_f64() * self.velocity;
        let distance = (self.to - self.from).abs();
        if travelled >= distance {
            self.to
        } else {
            self.from + travelled.copysign(self.to - self.from)
        }
    }

    /// Stop the pulse thread early, then reap it.
    fn cancel(&mut self) -> Result<(), StageError> {
        self.cancel.take();
        self.join()
    }

    fn join(&mut self) -> Result<(), StageError> {
        match self.pulses.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| StageError::Motion("trigger thread panicked".into())),
            None => Ok(()),
        }
    }
}

/// Simulated single-axis stage.
pub struct SimStage {
    config: SimStageConfig,
    velocity: f64,
    rest: f64,
    motion: Option<Motion>,
    trigger: Option<TriggerParams>,
    output: Option<Arc<dyn TriggerOutput>>,
    closed: bool,
}

impl SimStage {
    pub fn new(config: SimStageConfig) -> Self {
        info!(serial = %config.serial, axis = %config.axis, "simulated stage connected");
        Self {
            velocity: config.velocity,
            rest: config.position,
            config,
            motion: None,
            trigger: None,
            output: None,
            closed: false,
        }
    }

    /// Route trigger pulses to `output`.
    pub fn with_output(mut self, output: Arc<dyn TriggerOutput>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn config(&self) -> &SimStageConfig {
        &self.config
    }

    /// Whether a move is still in progress.
    pub fn is_moving(&self) -> bool {
        self.motion
            .as_ref()
            .is_some_and(|m| m.position_at(Instant::now()) != m.to)
    }

    /// Stop emitting trigger pulses on subsequent moves.
    pub fn disable_trigger(&mut self) {
        self.trigger = None;
    }

    fn ensure_open(&self) -> Result<(), StageError> {
        if self.closed {
            return Err(StageError::Closed);
        }
        Ok(())
    }

    fn current(&self) -> f64 {
        match &self.motion {
            Some(motion) => motion.position_at(Instant::now()),
            None => self.rest,
        }
    }

    /// Abort the current move where the axis is now.
    fn halt(&mut self) -> Result<(), StageError> {
        let position = self.current();
        if let Some(mut motion) = self.motion.take() {
            self.rest = position;
            motion.cancel()?;
        }
        Ok(())
    }

    /// Offsets from the move start at which the output fires.
    fn schedule(&self, from: f64, to: f64) -> Vec<Duration> {
        let Some(params) = self.trigger else {
            return Vec::new();
        };
        let at = |position: f64| Duration::from_secs_f64((position - from).abs() / self.velocity);
        match params.mode {
            TriggerOutputMode::InMotion => vec![Duration::ZERO],
            TriggerOutputMode::OnTarget => vec![at(to)],
            TriggerOutputMode::PositionDistance => {
                let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
                let mut offsets: Vec<Duration> = params
                    .positions()
                    .into_iter()
                    .filter(|p| *p >= lo && *p <= hi && *p != from)
                    .map(at)
                    .collect();
                offsets.sort();
                offsets
            }
        }
    }
}

impl Stage for SimStage {
    fn set_velocity(&mut self, velocity: f64) -> Result<(), StageError> {
        self.ensure_open()?;
        if !(velocity.is_finite() && velocity > 0.0 && velocity <= self.config.max_velocity) {
            return Err(StageError::InvalidVelocity {
                velocity,
                max: self.config.max_velocity,
            });
        }
        self.velocity = velocity;
        debug!(velocity, "stage velocity set");
        Ok(())
    }

    fn velocity(&self) -> f64 {
        self.velocity
    }

    fn move_absolute(&mut self, target: f64) -> Result<(), StageError> {
        self.ensure_open()?;
        let (min, max) = (self.config.min_position, self.config.max_position);
        if !(target.is_finite() && (min..=max).contains(&target)) {
            return Err(StageError::OutOfRange { target, min, max });
        }
        self.halt()?;
        let from = self.rest;
        let schedule = self.schedule(from, target);
        let started = Instant::now();
        let (cancel, pulses) = match (&self.output, self.trigger) {
            (Some(output), Some(params)) if !schedule.is_empty() => {
                let (tx, rx) = mpsc::channel::<()>();
                let output = Arc::clone(output);
                let handle = thread::spawn(move || {
                    for offset in schedule {
                        let wait = (started + offset).saturating_duration_since(Instant::now());
                        match rx.recv_timeout(wait) {
                            Err(RecvTimeoutError::Timeout) => output.pulse(params.line),
                            _ => return,
                        }
                    }
                });
                (Some(tx), Some(handle))
            }
            _ => (None, None),
        };
        debug!(from, to = target, velocity = self.velocity, "stage move started");
        self.motion = Some(Motion {
            from,
            to: target,
            velocity: self.velocity,
            started,
            cancel,
            pulses,
        });
        Ok(())
    }

    fn wait_on_target(&mut self, timeout: Duration) -> Result<(), StageError> {
        self.ensure_open()?;
        let Some(motion) = self.motion.as_mut() else {
            return Ok(());
        };
        let arrival = motion.started + motion.duration();
        let remaining = arrival.saturating_duration_since(Instant::now());
        if remaining > timeout {
            thread::sleep(timeout);
            return Err(StageError::Timeout(timeout));
        }
        thread::sleep(remaining);
        motion.join()?;
        self.rest = motion.to;
        self.motion = None;
        debug!(position = self.rest, "stage on target");
        Ok(())
    }

    fn trigger(&mut self, params: TriggerParams) -> Result<(), StageError> {
        self.ensure_open()?;
        params.validate()?;
        debug!(
            step = params.step,
            start = params.start,
            stop = params.stop,
            line = params.line,
            mode = %params.mode,
            pulses = params.positions().len(),
            "stage trigger configured"
        );
        self.trigger = Some(params);
        Ok(())
    }

    fn position(&self) -> Result<f64, StageError> {
        self.ensure_open()?;
        Ok(self.current())
    }

    fn close(&mut self) -> Result<(), StageError> {
        if self.closed {
            return Ok(());
        }
        let result = self.halt();
        self.closed = true;
        info!(serial = %self.config.serial, position = self.rest, "simulated stage closed");
        result
    }
}

impl Drop for SimStage {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "stage close on drop failed");
        }
    }
}

impl std::fmt::Debug for SimStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimStage")
            .field("serial", &self.config.serial)
            .field("velocity", &self.velocity)
            .field("position", &self.current())
            .field("trigger", &self.trigger)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl TriggerOutput for Counter {
        fn pulse(&self, line: u8) {
            assert_eq!(line, 1);
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stage(counter: &Arc<Counter>) -> SimStage {
        SimStage::new(SimStageConfig::default()).with_output(counter.clone())
    }

    #[test]
    fn move_reaches_target() {
        let mut stage = SimStage::new(SimStageConfig::default());
        stage.set_velocity(50.0).unwrap();
        stage.move_absolute(1.5).unwrap();
        stage.wait_on_target(Duration::from_secs(1)).unwrap();
        assert_eq!(stage.position().unwrap(), 1.5);
        assert!(!stage.is_moving());
    }

    #[test]
    fn crossing_the_window_emits_one_pulse_per_step() {
        let counter = Arc::new(Counter::default());
        let mut stage = stage(&counter);
        stage.set_velocity(50.0).unwrap();
        stage.move_absolute(1.5).unwrap();
        stage.wait_on_target(Duration::from_secs(1)).unwrap();
        stage
            .trigger(TriggerParams::position_distance(0.025, 2.3, 2.4, 1))
            .unwrap();
        stage.move_absolute(4.5).unwrap();
        stage.wait_on_target(Duration::from_secs(1)).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 5);
        stage.move_absolute(0.0).unwrap();
        stage.wait_on_target(Duration::from_secs(1)).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 10, "return pass crosses again");
    }

    #[test]
    fn disabled_trigger_stays_silent() {
        let counter = Arc::new(Counter::default());
        let mut stage = stage(&counter);
        stage.set_velocity(50.0).unwrap();
        stage
            .trigger(TriggerParams::position_distance(0.025, 2.3, 2.4, 1))
            .unwrap();
        stage.disable_trigger();
        stage.move_absolute(4.5).unwrap();
        stage.wait_on_target(Duration::from_secs(1)).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn limits_are_enforced() {
        let mut stage = SimStage::new(SimStageConfig::default());
        assert!(matches!(
            stage.move_absolute(30.0),
            Err(StageError::OutOfRange { .. })
        ));
        assert!(matches!(
            stage.set_velocity(0.0),
            Err(StageError::InvalidVelocity { .. })
        ));
        stage.move_absolute(20.0).unwrap();
        assert!(matches!(
            stage.wait_on_target(Duration::from_millis(5)),
            Err(StageError::Timeout(_))
        ));
        stage.close().unwrap();
        assert_eq!(stage.position(), Err(StageError::Closed));
    }
}
