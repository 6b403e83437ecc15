//! Closed set of camera settings addressable by hosts.

use std::fmt;
use std::str::FromStr;

use crate::value::ValueKind;
use crate::ParamError;

/// Identifier of a camera setting.
///
/// Hosts address settings by their string name (see [`ParamId::name`]); the
/// name is parsed into a `ParamId` once at the boundary so every dispatch
/// below is an exhaustive `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamId {
    /// Camera product name.
    Name,
    /// Sensor temperature in degrees Celsius.
    Temperature,
    /// Cooler setpoint in degrees Celsius.
    TemperatureSetpoint,
    /// Full sensor width in pixels.
    ImageWidth,
    /// Full sensor height in pixels.
    ImageHeight,
    /// Exposure time in integer milliseconds.
    ExposureTime,
    /// Uniform binning factor applied to both axes.
    Binning,
    /// Gain index.
    Gain,
    /// Readout port index.
    ReadoutPort,
    /// Exposure trigger mode.
    TriggerMode,
    /// Subarray width in unbinned pixels.
    SubarrayHSize,
    /// Subarray height in unbinned pixels.
    SubarrayVSize,
    /// Subarray horizontal offset in unbinned pixels.
    SubarrayHPos,
    /// Subarray vertical offset in unbinned pixels.
    SubarrayVPos,
    /// Frames requested for a multi-frame acquisition (host side).
    NumberFrames,
    /// Continuous or multi-frame acquisition (host side).
    AcquisitionMode,
}

impl ParamId {
    /// Number of settings.
    pub const COUNT: usize = 16;

    /// Every setting, in display order.
    pub const ALL: [ParamId; ParamId::COUNT] = [
        ParamId::Name,
        ParamId::Temperature,
        ParamId::TemperatureSetpoint,
        ParamId::ImageWidth,
        ParamId::ImageHeight,
        ParamId::ExposureTime,
        ParamId::Binning,
        ParamId::Gain,
        ParamId::ReadoutPort,
        ParamId::TriggerMode,
        ParamId::SubarrayHSize,
        ParamId::SubarrayVSize,
        ParamId::SubarrayHPos,
        ParamId::SubarrayVPos,
        ParamId::NumberFrames,
        ParamId::AcquisitionMode,
    ];

    /// Host-facing setting name.
    pub const fn name(self) -> &'static str {
        match self {
            ParamId::Name => "name",
            ParamId::Temperature => "temperature",
            ParamId::TemperatureSetpoint => "temperature_setpoint",
            ParamId::ImageWidth => "image_width",
            ParamId::ImageHeight => "image_height",
            ParamId::ExposureTime => "exposure_time",
            ParamId::Binning => "binning",
            ParamId::Gain => "gain",
            ParamId::ReadoutPort => "readout",
            ParamId::TriggerMode => "trigger_mode",
            ParamId::SubarrayHSize => "subarray_hsize",
            ParamId::SubarrayVSize => "subarray_vsize",
            ParamId::SubarrayHPos => "subarrayh_pos",
            ParamId::SubarrayVPos => "subarrayv_pos",
            ParamId::NumberFrames => "number_frames",
            ParamId::AcquisitionMode => "acquisition_mode",
        }
    }

    /// Position of the setting inside [`ParamId::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Type of the values carried by this setting.
    pub const fn kind(self) -> ValueKind {
        match self {
            ParamId::Name => ValueKind::Text,
            ParamId::Temperature | ParamId::TemperatureSetpoint => ValueKind::Float,
            ParamId::TriggerMode => ValueKind::Trigger,
            ParamId::AcquisitionMode => ValueKind::Mode,
            ParamId::ImageWidth
            | ParamId::ImageHeight
            | ParamId::ExposureTime
            | ParamId::Binning
            | ParamId::Gain
            | ParamId::ReadoutPort
            | ParamId::SubarrayHSize
            | ParamId::SubarrayVSize
            | ParamId::SubarrayHPos
            | ParamId::SubarrayVPos
            | ParamId::NumberFrames => ValueKind::Int,
        }
    }

    /// Whether hosts may only read the setting.
    pub const fn is_read_only(self) -> bool {
        matches!(
            self,
            ParamId::Name
                | ParamId::Temperature
                | ParamId::TemperatureSetpoint
                | ParamId::ImageWidth
                | ParamId::ImageHeight
        )
    }

    /// Whether the value lives on the camera rather than only in the host.
    pub const fn is_hardware(self) -> bool {
        !matches!(self, ParamId::NumberFrames | ParamId::AcquisitionMode)
    }

    /// Whether the setting is one of the four subarray rectangle fields.
    pub const fn is_subarray(self) -> bool {
        matches!(
            self,
            ParamId::SubarrayHSize
                | ParamId::SubarrayVSize
                | ParamId::SubarrayHPos
                | ParamId::SubarrayVPos
        )
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParamId {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ParamId::ALL
            .iter()
            .copied()
            .find(|id| id.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParamError::Unknown(wanted.to_string()))
    }
}
