//! Declarative setting metadata: type, access, range or choices, UI hints.

use crate::limits::{Limits, BINNING_CHOICES, MAX_EXPOSURE_MS, READOUT_PORTS, ROI_STEP};
use crate::value::{AcquisitionMode, TriggerMode, Value, ValueKind};
use crate::{ParamError, ParamId};

/// Access rights of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Domain of legal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Any value of the right kind.
    Any,
    /// Inclusive integer range with an increment measured from `min`.
    Range { min: i64, max: i64, step: i64 },
    /// One of an enumerated set.
    Choices(Vec<Value>),
}

/// Metadata describing one setting.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingDescriptor {
    pub id: ParamId,
    pub kind: ValueKind,
    pub access: Access,
    pub constraint: Constraint,
    /// Optional engineering unit such as "ms".
    pub unit: Option<&'static str>,
    pub description: Option<&'static str>,
    /// Value shown before the hardware has been read.
    pub initial: Value,
}

impl SettingDescriptor {
    /// Build the descriptor of `id` for a camera with the given limits.
    pub fn for_param(id: ParamId, limits: &Limits) -> Self {
        let access = if id.is_read_only() {
            Access::ReadOnly
        } else {
            Access::ReadWrite
        };
        let (constraint, unit, description, initial) = match id {
            ParamId::Name => (Constraint::Any, None, None, Value::Text(String::new())),
            ParamId::Temperature | ParamId::TemperatureSetpoint => {
                (Constraint::Any, Some("°C"), None, Value::Float(0.0))
            }
            ParamId::ImageWidth => (
                Constraint::Any,
                Some("px"),
                Some("Sensor width, not the ROI width"),
                Value::from(limits.sensor_width),
            ),
            ParamId::ImageHeight => (
                Constraint::Any,
                Some("px"),
                Some("Sensor height, not the ROI height"),
                Value::from(limits.sensor_height),
            ),
            ParamId::ExposureTime => (
                Constraint::Range {
                    min: 0,
                    max: i64::from(MAX_EXPOSURE_MS),
                    step: 1,
                },
                Some("ms"),
                Some("Exposures above the standard limit need readout port 1 or 2"),
                Value::Int(20),
            ),
            ParamId::Binning => (
                Constraint::Choices(BINNING_CHOICES.iter().map(|&b| Value::from(b)).collect()),
                None,
                Some("Applied to both axes"),
                Value::Int(1),
            ),
            ParamId::Gain => (
                Constraint::Choices(vec![Value::Int(1), Value::Int(2)]),
                None,
                Some("Readout port 0 only supports gain 1"),
                Value::Int(1),
            ),
            ParamId::ReadoutPort => (
                Constraint::Choices(READOUT_PORTS.iter().map(|&p| Value::from(p)).collect()),
                None,
                None,
                Value::Int(0),
            ),
            ParamId::TriggerMode => (
                Constraint::Choices(TriggerMode::ALL.iter().map(|&m| Value::from(m)).collect()),
                None,
                None,
                Value::Trigger(TriggerMode::InternalTrigger),
            ),
            ParamId::SubarrayHSize => (
                Constraint::Range {
                    min: i64::from(ROI_STEP),
                    max: i64::from(limits.sensor_width),
                    step: i64::from(ROI_STEP),
                },
                Some("px"),
                None,
                Value::from(limits.sensor_width),
            ),
            ParamId::SubarrayVSize => (
                Constraint::Range {
                    min: i64::from(ROI_STEP),
                    max: i64::from(limits.sensor_height),
                    step: i64::from(ROI_STEP),
                },
                Some("px"),
                None,
                Value::from(limits.sensor_height),
            ),
            ParamId::SubarrayHPos => (
                Constraint::Range {
                    min: 0,
                    max: i64::from(limits.max_hpos()),
                    step: i64::from(ROI_STEP),
                },
                Some("px"),
                Some("0 is the first pixel from the left"),
                Value::Int(0),
            ),
            ParamId::SubarrayVPos => (
                Constraint::Range {
                    min: 0,
                    max: i64::from(limits.max_vpos()),
                    step: i64::from(ROI_STEP),
                },
                Some("px"),
                Some("0 is the first pixel from the top"),
                Value::Int(0),
            ),
            ParamId::NumberFrames => (
                Constraint::Range {
                    min: 1,
                    max: i64::from(u32::MAX),
                    step: 1,
                },
                None,
                None,
                Value::Int(200),
            ),
            ParamId::AcquisitionMode => (
                Constraint::Choices(AcquisitionMode::ALL.iter().map(|&m| Value::from(m)).collect()),
                None,
                None,
                Value::Mode(AcquisitionMode::Continuous),
            ),
        };
        SettingDescriptor {
            id,
            kind: id.kind(),
            access,
            constraint,
            unit,
            description,
            initial,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.access == Access::ReadOnly
    }

    /// Coerce `value` to the descriptor's kind and check it against the
    /// declared domain. Cross-setting rules are checked by the store.
    pub fn check(&self, value: Value) -> Result<Value, ParamError> {
        let value = coerce(self.id, self.kind, value)?;
        match &self.constraint {
            Constraint::Any => Ok(value),
            Constraint::Range { min, max, step } => {
                let raw = value.as_int().ok_or(ParamError::Type {
                    param: self.id,
                    expected: self.kind,
                })?;
                if raw < *min || raw > *max {
                    return Err(ParamError::validation(
                        self.id,
                        format!("{raw} outside [{min}, {max}]"),
                    ));
                }
                if *step > 1 && (raw - min) % step != 0 {
                    return Err(ParamError::validation(
                        self.id,
                        format!("{raw} is not a multiple of {step}"),
                    ));
                }
                Ok(value)
            }
            Constraint::Choices(choices) => {
                if choices.contains(&value) {
                    Ok(value)
                } else {
                    let allowed = choices
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    Err(ParamError::validation(
                        self.id,
                        format!("{value} is not one of {{{allowed}}}"),
                    ))
                }
            }
        }
    }
}

fn coerce(id: ParamId, kind: ValueKind, value: Value) -> Result<Value, ParamError> {
    match (kind, value) {
        (ValueKind::Float, Value::Int(v)) => Ok(Value::Float(v as f64)),
        (ValueKind::Trigger, Value::Text(text)) => text
            .parse()
            .map(Value::Trigger)
            .map_err(|_| ParamError::Parse { param: id, value: text }),
        (ValueKind::Mode, Value::Text(text)) => text
            .parse()
            .map(Value::Mode)
            .map_err(|_| ParamError::Parse { param: id, value: text }),
        (kind, value) if value.kind() == kind => Ok(value),
        (expected, _) => Err(ParamError::Type {
            param: id,
            expected,
        }),
    }
}
