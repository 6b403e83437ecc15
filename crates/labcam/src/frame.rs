//! Frame representation handed to callers by [`Camera::poll_frame`](crate::Camera::poll_frame).

use std::time::Instant;

use bytes::Bytes;

use crate::geometry::{Roi, BYTES_PER_PIXEL};

/// 16-bit monochrome image plus acquisition bookkeeping.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Row-major little-endian pixels, `width * height * 2` bytes.
    pub data: Bytes,
    /// Binned columns.
    pub width: u32,
    /// Binned rows.
    pub height: u32,
    /// Frame counter of the session, starting at 1.
    pub frame_count: u64,
    /// Smoothed frame-rate estimate at the time of this frame.
    pub fps: f64,
    /// ROI that produced the frame, in unbinned sensor pixels.
    pub roi: Roi,
    pub binning: u32,
    /// End of exposure as reported by the driver.
    pub timestamp: Instant,
}

impl Frame {
    /// Length in bytes of one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Pixel at column `x`, row `y`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.row_bytes() + x as usize * BYTES_PER_PIXEL;
        let bytes = self.data.get(offset..offset + BYTES_PER_PIXEL)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Decode the payload into native 16-bit pixels.
    pub fn to_pixels(&self) -> Vec<u16> {
        self.data
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|px| u16::from_le_bytes([px[0], px[1]]))
            .collect()
    }

    /// Split into `(pixel buffer, fps, frame count)`.
    pub fn into_parts(self) -> (Bytes, f64, u64) {
        (self.data, self.fps, self.frame_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, pixels: &[u16]) -> Frame {
        let data: Vec<u8> = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
        Frame {
            data: Bytes::from(data),
            width,
            height,
            frame_count: 1,
            fps: 0.0,
            roi: Roi::new(0, 0, width, height),
            binning: 1,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn pixel_lookup_is_row_major() {
        let frame = frame(3, 2, &[1, 2, 3, 4, 5, 0xBEEF]);
        assert_eq!(frame.row_bytes(), 6);
        assert_eq!(frame.pixel(0, 0), Some(1));
        assert_eq!(frame.pixel(2, 0), Some(3));
        assert_eq!(frame.pixel(0, 1), Some(4));
        assert_eq!(frame.pixel(2, 1), Some(0xBEEF));
        assert_eq!(frame.pixel(3, 0), None);
        assert_eq!(frame.pixel(0, 2), None);
        assert_eq!(frame.to_pixels(), vec![1, 2, 3, 4, 5, 0xBEEF]);
    }

    #[test]
    fn into_parts_yields_buffer_fps_and_count() {
        let mut frame = frame(2, 1, &[7, 9]);
        frame.fps = 12.5;
        frame.frame_count = 4;
        let (data, fps, count) = frame.into_parts();
        assert_eq!(&data[..], &[7, 0, 9, 0]);
        assert_eq!(fps, 12.5);
        assert_eq!(count, 4);
    }
}
