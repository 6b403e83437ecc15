//! Subarray (ROI) rectangles and the image dimensions they produce.

use std::fmt;

use camparam::{Limits, ParamId, ROI_STEP};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bytes per pixel of the 16-bit frames delivered by the camera.
pub const BYTES_PER_PIXEL: usize = 2;

/// Region of interest in unbinned sensor pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Roi {
    /// Horizontal offset of the left column.
    pub h0: u32,
    /// Vertical offset of the top row.
    pub v0: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub const fn new(h0: u32, v0: u32, width: u32, height: u32) -> Self {
        Self {
            h0,
            v0,
            width,
            height,
        }
    }

    /// Rectangle covering the whole sensor.
    pub const fn full(sensor_width: u32, sensor_height: u32) -> Self {
        Self::new(0, 0, sensor_width, sensor_height)
    }

    /// Value of the subarray field addressed by `id`.
    pub fn field(&self, id: ParamId) -> Option<u32> {
        match id {
            ParamId::SubarrayHSize => Some(self.width),
            ParamId::SubarrayVSize => Some(self.height),
            ParamId::SubarrayHPos => Some(self.h0),
            ParamId::SubarrayVPos => Some(self.v0),
            _ => None,
        }
    }

    /// Copy of the rectangle with one subarray field replaced.
    ///
    /// Non-subarray ids return the rectangle unchanged.
    pub fn with_field(mut self, id: ParamId, value: u32) -> Self {
        match id {
            ParamId::SubarrayHSize => self.width = value,
            ParamId::SubarrayVSize => self.height = value,
            ParamId::SubarrayHPos => self.h0 = value,
            ParamId::SubarrayVPos => self.v0 = value,
            _ => {}
        }
        self
    }

    /// Exclusive right edge; saturates instead of overflowing.
    pub fn right(&self) -> u32 {
        self.h0.saturating_add(self.width)
    }

    /// Exclusive bottom edge; saturates instead of overflowing.
    pub fn bottom(&self) -> u32 {
        self.v0.saturating_add(self.height)
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) {}x{}",
            self.h0, self.v0, self.width, self.height
        )
    }
}

/// Reasons a rectangle cannot be applied to the sensor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("ROI {roi} has zero extent")]
    Empty { roi: Roi },
    #[error("ROI {roi}: {field} = {value} is not a multiple of {step}")]
    Misaligned {
        roi: Roi,
        field: &'static str,
        value: u32,
        step: u32,
    },
    #[error("ROI {roi} extends past the {sensor_width}x{sensor_height} sensor")]
    OutOfBounds {
        roi: Roi,
        sensor_width: u32,
        sensor_height: u32,
    },
    #[error("ROI {roi} is not divisible by binning {binning}")]
    Binning { roi: Roi, binning: u32 },
}

/// Sensor extent together with the active ROI and binning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    sensor_width: u32,
    sensor_height: u32,
    roi: Roi,
    binning: u32,
}

impl Geometry {
    /// Full-sensor geometry without binning.
    pub fn new(limits: &Limits) -> Self {
        Self {
            sensor_width: limits.sensor_width,
            sensor_height: limits.sensor_height,
            roi: Roi::full(limits.sensor_width, limits.sensor_height),
            binning: 1,
        }
    }

    pub fn sensor_size(&self) -> (u32, u32) {
        (self.sensor_width, self.sensor_height)
    }

    pub fn roi(&self) -> Roi {
        self.roi
    }

    pub fn binning(&self) -> u32 {
        self.binning
    }

    pub fn full_roi(&self) -> Roi {
        Roi::full(self.sensor_width, self.sensor_height)
    }

    /// Check `roi` against the sensor bounds, the 4-pixel step and `binning`.
    pub fn validate(&self, roi: Roi, binning: u32) -> Result<(), GeometryError> {
        if roi.width == 0 || roi.height == 0 {
            return Err(GeometryError::Empty { roi });
        }
        for (field, value) in [
            ("h0", roi.h0),
            ("v0", roi.v0),
            ("width", roi.width),
            ("height", roi.height),
        ] {
            if value % ROI_STEP != 0 {
                return Err(GeometryError::Misaligned {
                    roi,
                    field,
                    value,
                    step: ROI_STEP,
                });
            }
        }
        if roi.right() > self.sensor_width || roi.bottom() > self.sensor_height {
            return Err(GeometryError::OutOfBounds {
                roi,
                sensor_width: self.sensor_width,
                sensor_height: self.sensor_height,
            });
        }
        if binning == 0 || roi.width % binning != 0 || roi.height % binning != 0 {
            return Err(GeometryError::Binning { roi, binning });
        }
        Ok(())
    }

    /// Binned image size `(columns, rows)` of the active ROI.
    pub fn image_size(&self) -> (u32, u32) {
        image_size(self.roi, self.binning)
    }

    /// Payload length in bytes of one frame.
    pub fn frame_bytes(&self) -> usize {
        let (cols, rows) = self.image_size();
        cols as usize * rows as usize * BYTES_PER_PIXEL
    }

    pub(crate) fn set_roi(&mut self, roi: Roi) {
        self.roi = roi;
    }

    pub(crate) fn set_binning(&mut self, binning: u32) {
        self.binning = binning;
    }
}

/// Binned `(columns, rows)` for a rectangle; zero binning yields zero.
pub fn image_size(roi: Roi, binning: u32) -> (u32, u32) {
    roi.width
        .checked_div(binning)
        .zip(roi.height.checked_div(binning))
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> Geometry {
        Geometry::new(&Limits::default())
    }

    #[test]
    fn full_sensor_is_valid_for_every_binning() {
        let geo = geometry();
        for binning in camparam::BINNING_CHOICES {
            geo.validate(geo.full_roi(), binning).expect("full sensor");
        }
    }

    #[test]
    fn misaligned_or_oversized_rectangles_are_rejected() {
        let geo = geometry();
        let cases = [
            Roi::new(0, 0, 1002, 1000),
            Roi::new(0, 0, 1000, 998),
            Roi::new(2, 0, 1000, 1000),
            Roi::new(0, 0, 0, 1000),
            Roi::new(3000, 0, 400, 1000),
            Roi::new(0, 2000, 1000, 204),
            Roi::new(u32::MAX - 3, 0, 8, 8),
        ];
        for roi in cases {
            assert!(geo.validate(roi, 1).is_err(), "{roi} should be rejected");
        }
        assert!(matches!(
            geo.validate(Roi::new(3000, 0, 400, 1000), 1),
            Err(GeometryError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn image_size_accounts_for_binning() {
        let mut geo = geometry();
        geo.set_roi(Roi::new(500, 500, 1000, 800));
        geo.set_binning(4);
        assert_eq!(geo.image_size(), (250, 200));
        assert_eq!(geo.frame_bytes(), 250 * 200 * 2);
        assert_eq!(image_size(Roi::new(0, 0, 8, 8), 0), (0, 0));
    }

    #[test]
    fn with_field_changes_only_that_field() {
        let roi = Roi::new(100, 200, 1000, 800);
        assert_eq!(
            roi.with_field(ParamId::SubarrayHPos, 40),
            Roi::new(40, 200, 1000, 800)
        );
        assert_eq!(
            roi.with_field(ParamId::SubarrayVSize, 4),
            Roi::new(100, 200, 1000, 4)
        );
        assert_eq!(roi.with_field(ParamId::Gain, 2), roi);
        assert_eq!(roi.field(ParamId::SubarrayHSize), Some(1000));
    }
}
