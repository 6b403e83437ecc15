//! Setting values and the enumerations they can carry.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type tag of a setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    Text,
    Trigger,
    Mode,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Int => "integer",
            ValueKind::Float => "float",
            ValueKind::Text => "string",
            ValueKind::Trigger => "trigger mode",
            ValueKind::Mode => "acquisition mode",
        };
        f.write_str(name)
    }
}

/// Value of a single setting.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(untagged))]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Trigger(TriggerMode),
    Mode(AcquisitionMode),
}

impl Value {
    /// Type tag of the value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Trigger(_) => ValueKind::Trigger,
            Value::Mode(_) => ValueKind::Mode,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float view; integers widen losslessly for the ranges used here.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_trigger(&self) -> Option<TriggerMode> {
        match self {
            Value::Trigger(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_mode(&self) -> Option<AcquisitionMode> {
        match self {
            Value::Mode(v) => Some(*v),
            _ => None,
        }
    }

    /// Parse a host-supplied string into a value of the requested kind.
    pub fn parse(kind: ValueKind, text: &str) -> Option<Value> {
        let text = text.trim();
        match kind {
            ValueKind::Int => text.parse().ok().map(Value::Int),
            ValueKind::Float => text.parse().ok().map(Value::Float),
            ValueKind::Text => Some(Value::Text(text.to_string())),
            ValueKind::Trigger => text.parse().ok().map(Value::Trigger),
            ValueKind::Mode => text.parse().ok().map(Value::Mode),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:.2}"),
            Value::Text(v) => f.write_str(v),
            Value::Trigger(v) => f.write_str(v.as_str()),
            Value::Mode(v) => f.write_str(v.as_str()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<TriggerMode> for Value {
    fn from(value: TriggerMode) -> Self {
        Value::Trigger(value)
    }
}

impl From<AcquisitionMode> for Value {
    fn from(value: AcquisitionMode) -> Self {
        Value::Mode(value)
    }
}

/// Event that starts each exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TriggerMode {
    /// Exposures are timed by the camera itself.
    #[default]
    InternalTrigger,
    /// Every rising edge on the trigger input starts one exposure.
    EdgeTrigger,
    /// The first edge starts the sequence, subsequent frames are timed internally.
    TriggerFirst,
    /// Every software trigger command starts one exposure.
    SoftwareTriggerEdge,
    /// The first software trigger starts the sequence.
    SoftwareTriggerFirst,
}

impl TriggerMode {
    pub const ALL: [TriggerMode; 5] = [
        TriggerMode::InternalTrigger,
        TriggerMode::EdgeTrigger,
        TriggerMode::TriggerFirst,
        TriggerMode::SoftwareTriggerEdge,
        TriggerMode::SoftwareTriggerFirst,
    ];

    /// Canonical identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            TriggerMode::InternalTrigger => "InternalTrigger",
            TriggerMode::EdgeTrigger => "EdgeTrigger",
            TriggerMode::TriggerFirst => "TriggerFirst",
            TriggerMode::SoftwareTriggerEdge => "SoftwareTriggerEdge",
            TriggerMode::SoftwareTriggerFirst => "SoftwareTriggerFirst",
        }
    }

    /// Label used by the vendor driver ("Edge Trigger", ...).
    pub const fn label(self) -> &'static str {
        match self {
            TriggerMode::InternalTrigger => "Internal Trigger",
            TriggerMode::EdgeTrigger => "Edge Trigger",
            TriggerMode::TriggerFirst => "Trigger First",
            TriggerMode::SoftwareTriggerEdge => "Software Trigger Edge",
            TriggerMode::SoftwareTriggerFirst => "Software Trigger First",
        }
    }

    /// Whether every frame waits for its own trigger event.
    pub const fn is_per_frame(self) -> bool {
        matches!(
            self,
            TriggerMode::EdgeTrigger | TriggerMode::SoftwareTriggerEdge
        )
    }

    /// Whether any exposure waits for an external or software event.
    pub const fn is_triggered(self) -> bool {
        !matches!(self, TriggerMode::InternalTrigger)
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerMode {
    type Err = String;

    /// Accepts both the canonical identifier and the vendor label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        TriggerMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str().to_ascii_lowercase() == folded)
            .ok_or_else(|| format!("unknown trigger mode '{s}'"))
    }
}

/// Acquisition flavour selected by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AcquisitionMode {
    /// Circular-buffer live capture until stopped.
    #[default]
    Continuous,
    /// Bounded capture of `number_frames` frames.
    MultiFrame,
}

impl AcquisitionMode {
    pub const ALL: [AcquisitionMode; 2] = [AcquisitionMode::Continuous, AcquisitionMode::MultiFrame];

    pub const fn as_str(self) -> &'static str {
        match self {
            AcquisitionMode::Continuous => "Continuous",
            AcquisitionMode::MultiFrame => "MultiFrame",
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcquisitionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AcquisitionMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown acquisition mode '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_mode_accepts_vendor_labels() {
        for mode in TriggerMode::ALL {
            assert_eq!(mode.label().parse::<TriggerMode>().unwrap(), mode);
            assert_eq!(mode.as_str().parse::<TriggerMode>().unwrap(), mode);
        }
        assert_eq!(
            "software_trigger_edge".parse::<TriggerMode>().unwrap(),
            TriggerMode::SoftwareTriggerEdge
        );
        assert!("Bulb".parse::<TriggerMode>().is_err());
    }

    #[test]
    fn parse_respects_kind() {
        assert_eq!(Value::parse(ValueKind::Int, " 50 "), Some(Value::Int(50)));
        assert_eq!(Value::parse(ValueKind::Int, "5.5"), None);
        assert_eq!(
            Value::parse(ValueKind::Trigger, "Edge Trigger"),
            Some(Value::Trigger(TriggerMode::EdgeTrigger))
        );
        assert_eq!(
            Value::parse(ValueKind::Mode, "multiframe"),
            Some(Value::Mode(AcquisitionMode::MultiFrame))
        );
    }

    #[test]
    fn float_view_widens_integers() {
        assert_eq!(Value::Int(-20).as_float(), Some(-20.0));
        assert_eq!(Value::Text("x".into()).as_float(), None);
    }
}
