//! Hardware limits that parameter validation is checked against.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Alignment of every subarray coordinate and extent, in unbinned pixels.
pub const ROI_STEP: u32 = 4;
/// Longest exposure accepted on any readout port, in milliseconds.
pub const MAX_EXPOSURE_MS: u32 = 3_600_000;
/// Supported binning factors.
pub const BINNING_CHOICES: [u32; 3] = [1, 2, 4];
/// Readout port indices.
pub const READOUT_PORTS: [u32; 3] = [0, 1, 2];

/// Gain indices available on a readout port.
///
/// Port 0 only exposes gain 1; the long-exposure ports 1 and 2 add gain 2.
pub fn gain_choices(port: u32) -> &'static [u32] {
    match port {
        0 => &[1],
        _ => &[1, 2],
    }
}

/// Whether the port unlocks exposures above [`Limits::standard_max_exposure_ms`].
pub fn is_long_exposure_port(port: u32) -> bool {
    matches!(port, 1 | 2)
}

/// Sensor geometry and exposure bounds of a camera model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Limits {
    /// Sensor width in pixels.
    pub sensor_width: u32,
    /// Sensor height in pixels.
    pub sensor_height: u32,
    /// Longest exposure allowed on the standard readout port (port 0), in ms.
    pub standard_max_exposure_ms: u32,
}

impl Limits {
    /// Largest legal horizontal subarray offset.
    pub fn max_hpos(&self) -> u32 {
        self.sensor_width.saturating_sub(ROI_STEP)
    }

    /// Largest legal vertical subarray offset.
    pub fn max_vpos(&self) -> u32 {
        self.sensor_height.saturating_sub(ROI_STEP)
    }

    /// Maximum exposure for the given readout port.
    pub fn max_exposure_ms(&self, port: u32) -> u32 {
        if is_long_exposure_port(port) {
            MAX_EXPOSURE_MS
        } else {
            self.standard_max_exposure_ms.min(MAX_EXPOSURE_MS)
        }
    }
}

impl Default for Limits {
    /// Retiga E7 class sensor: 3200 x 2200 pixels.
    fn default() -> Self {
        Self {
            sensor_width: 3200,
            sensor_height: 2200,
            standard_max_exposure_ms: 60_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_zero_only_has_unit_gain() {
        assert_eq!(gain_choices(0), &[1]);
        assert_eq!(gain_choices(1), &[1, 2]);
        assert_eq!(gain_choices(2), &[1, 2]);
    }

    #[test]
    fn long_exposure_requires_port_one_or_two() {
        let limits = Limits::default();
        assert_eq!(limits.max_exposure_ms(0), 60_000);
        assert_eq!(limits.max_exposure_ms(1), MAX_EXPOSURE_MS);
        assert_eq!(limits.max_exposure_ms(2), MAX_EXPOSURE_MS);
        assert_eq!(limits.max_hpos(), 3196);
        assert_eq!(limits.max_vpos(), 2196);
    }
}
