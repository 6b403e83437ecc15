#![cfg_attr(docsrs, feature(doc_cfg))]
//! Single-axis motion stage with position-based trigger output.
//!
//! The [`Stage`] trait covers what an acquisition script needs from a
//! positioner: velocity, absolute moves, on-target waits and a trigger output
//! that fires while the axis crosses a position window. [`sim::SimStage`]
//! implements it without hardware and forwards its pulses to any
//! [`TriggerOutput`], such as a simulated camera's trigger input.

pub mod sim;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use sim::{SimStage, SimStageConfig};

/// Most pulses a single position-distance window may produce.
pub const MAX_TRIGGER_PULSES: usize = 1_000_000;

/// Error type produced by stage operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    /// Target outside the travel range.
    #[error("target {target} outside travel range [{min}, {max}]")]
    OutOfRange { target: f64, min: f64, max: f64 },
    #[error("velocity {velocity} outside (0, {max}]")]
    InvalidVelocity { velocity: f64, max: f64 },
    #[error("invalid trigger configuration: {0}")]
    InvalidTrigger(String),
    /// The axis did not reach its target in time.
    #[error("axis not on target after {0:?}")]
    Timeout(Duration),
    #[error("stage is closed")]
    Closed,
    /// The motion controller failed while moving.
    #[error("motion fault: {0}")]
    Motion(String),
}

/// When the trigger output fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TriggerOutputMode {
    /// One pulse every `step` between `start` and `stop`, both inclusive.
    #[default]
    PositionDistance,
    /// One pulse when a move reaches its target.
    OnTarget,
    /// One pulse when a move begins.
    InMotion,
}

impl fmt::Display for TriggerOutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerOutputMode::PositionDistance => "position-distance",
            TriggerOutputMode::OnTarget => "on-target",
            TriggerOutputMode::InMotion => "in-motion",
        };
        f.write_str(name)
    }
}

/// Trigger output configuration, positions in stage units (mm).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriggerParams {
    pub step: f64,
    pub start: f64,
    pub stop: f64,
    /// Digital output line, counted from 1.
    pub line: u8,
    pub mode: TriggerOutputMode,
}

impl TriggerParams {
    pub fn position_distance(step: f64, start: f64, stop: f64, line: u8) -> Self {
        Self {
            step,
            start,
            stop,
            line,
            mode: TriggerOutputMode::PositionDistance,
        }
    }

    pub fn validate(&self) -> Result<(), StageError> {
        if self.line == 0 {
            return Err(StageError::InvalidTrigger("output lines start at 1".into()));
        }
        if self.mode != TriggerOutputMode::PositionDistance {
            return Ok(());
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(StageError::InvalidTrigger(format!(
                "step {} must be positive",
                self.step
            )));
        }
        if !(self.start.is_finite() && self.stop.is_finite()) || self.start > self.stop {
            return Err(StageError::InvalidTrigger(format!(
                "window [{}, {}] is empty",
                self.start, self.stop
            )));
        }
        let pulses = (self.stop - self.start) / self.step + 1.0;
        if pulses > MAX_TRIGGER_PULSES as f64 {
            return Err(StageError::InvalidTrigger(format!(
                "step {} yields more than {MAX_TRIGGER_PULSES} pulses",
                self.step
            )));
        }
        Ok(())
    }

    /// Positions at which a position-distance trigger fires.
    pub fn positions(&self) -> Vec<f64> {
        if self.mode != TriggerOutputMode::PositionDistance || self.validate().is_err() {
            return Vec::new();
        }
        let count = ((self.stop - self.start) / self.step + 1e-9).floor() as usize + 1;
        (0..count)
            .map(|k| self.start + k as f64 * self.step)
            .collect()
    }
}

/// Receiver of stage trigger pulses.
pub trait TriggerOutput: Send + Sync {
    /// One rising edge on output `line`.
    fn pulse(&self, line: u8);
}

/// A single-axis positioner.
pub trait Stage {
    fn set_velocity(&mut self, velocity: f64) -> Result<(), StageError>;
    fn velocity(&self) -> f64;
    /// Start moving to `target` and return without waiting.
    fn move_absolute(&mut self, target: f64) -> Result<(), StageError>;
    /// Block until the current move has finished.
    fn wait_on_target(&mut self, timeout: Duration) -> Result<(), StageError>;
    /// Configure the trigger output for subsequent moves.
    fn trigger(&mut self, params: TriggerParams) -> Result<(), StageError>;
    fn position(&self) -> Result<f64, StageError>;
    fn close(&mut self) -> Result<(), StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_window_is_inclusive() {
        let params = TriggerParams::position_distance(0.025, 2.3, 2.4, 1);
        let positions = params.positions();
        assert_eq!(positions.len(), 5);
        assert!((positions[4] - 2.4).abs() < 1e-9);
    }

    #[test]
    fn invalid_trigger_windows_are_rejected() {
        for params in [
            TriggerParams::position_distance(0.0, 1.0, 2.0, 1),
            TriggerParams::position_distance(0.1, 2.0, 1.0, 1),
            TriggerParams::position_distance(0.1, 1.0, 2.0, 0),
            TriggerParams::position_distance(1e-12, 2.3, 2.4, 1),
        ] {
            assert!(matches!(
                params.validate(),
                Err(StageError::InvalidTrigger(_))
            ));
            assert!(params.positions().is_empty());
        }
    }
}
