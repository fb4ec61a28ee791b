//! Reusable frame buffers.
//!
//! - `Frame`: pixel buffer with width/height/stride, owned by exactly one receiver.
//! - `PixelFormat`: the packed layouts transports may deliver.
//!
//! A receiver allocates its `Frame` once and transports refill it in place on every
//! capture. Pixel bytes are private; readers go through `pixels`, `row` or `luma_at`.

use anyhow::{anyhow, Result};

/// Packed pixel layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit R, G, B.
    #[default]
    Rgb8,
    /// 8-bit B, G, R, padding (the common capture-card layout).
    Bgrx8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Bgrx8 => 4,
        }
    }
}

// ----------------------------------------------------------------------------
// Frame: one receiver's buffer
// ----------------------------------------------------------------------------

/// Pixel buffer owned by a single receiver.
///
/// Explicitly not `Clone`: a frame is never shared across receivers.
#[derive(Debug, Default)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    filled: bool,
}

impl Frame {
    /// An empty buffer. Transports size it on the first capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preallocate for a known geometry.
    pub fn with_capacity(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            data: Vec::with_capacity(stride * height as usize),
            width,
            height,
            stride,
            format,
            filled: false,
        }
    }

    /// Resize the buffer for an incoming picture and hand the bytes to the writer.
    ///
    /// The allocation is reused when the new picture fits in the old capacity.
    pub fn refill(
        &mut self,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Result<&mut [u8]> {
        let min_stride = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .ok_or_else(|| anyhow!("frame width overflow"))?;
        if stride < min_stride {
            return Err(anyhow!(
                "stride {} is smaller than a {}px {:?} row ({} bytes)",
                stride,
                width,
                format,
                min_stride
            ));
        }
        let len = stride
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        self.data.clear();
        self.data.resize(len, 0);
        self.width = width;
        self.height = height;
        self.stride = stride;
        self.format = format;
        self.filled = true;
        Ok(&mut self.data)
    }

    /// Mark the contents as consumed. The allocation is kept for the next capture.
    pub(crate) fn recycle(&mut self) {
        self.filled = false;
    }

    /// True between a successful capture and the matching release.
    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw bytes, including any row padding.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Bytes capacity currently held (for stats).
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// One row of pixels without stride padding.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        let len = self.width as usize * self.format.bytes_per_pixel();
        self.data.get(start..start + len)
    }

    /// Rec. 601 luma of one pixel.
    pub fn luma_at(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width {
            return None;
        }
        let row = self.row(y)?;
        let idx = x as usize * self.format.bytes_per_pixel();
        let (r, g, b) = match self.format {
            PixelFormat::Rgb8 => (row[idx], row[idx + 1], row[idx + 2]),
            PixelFormat::Bgrx8 => (row[idx + 2], row[idx + 1], row[idx]),
        };
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
        Some(luma as u8)
    }

    /// Tightly packed RGB copy (for backends that need a fixed layout).
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            let Some(row) = self.row(y) else {
                break;
            };
            match self.format {
                PixelFormat::Rgb8 => out.extend_from_slice(row),
                PixelFormat::Bgrx8 => {
                    for px in row.chunks_exact(4) {
                        out.extend_from_slice(&[px[2], px[1], px[0]]);
                    }
                }
            }
        }
        out
    }

    /// Check geometry against the buffer.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("frame has no pixels"));
        }
        let min_stride = self.width as usize * self.format.bytes_per_pixel();
        if self.stride < min_stride {
            return Err(anyhow!("stride {} below row size {}", self.stride, min_stride));
        }
        if self.data.len() < self.stride * self.height as usize {
            return Err(anyhow!(
                "buffer holds {} bytes, geometry needs {}",
                self.data.len(),
                self.stride * self.height as usize
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refill_reuses_allocation() {
        let mut frame = Frame::with_capacity(4, 4, PixelFormat::Rgb8);
        frame.refill(4, 4, 12, PixelFormat::Rgb8).unwrap().fill(7);
        let cap = frame.capacity();
        frame.recycle();
        frame.refill(2, 2, 6, PixelFormat::Rgb8).unwrap();
        assert_eq!(frame.capacity(), cap);
        assert_eq!(frame.pixels().len(), 12);
        assert!(frame.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn refill_rejects_short_stride() {
        let mut frame = Frame::new();
        assert!(frame.refill(10, 2, 20, PixelFormat::Bgrx8).is_err());
        assert!(!frame.is_filled());
    }

    #[test]
    fn row_skips_stride_padding() {
        let mut frame = Frame::new();
        let buf = frame.refill(2, 2, 8, PixelFormat::Rgb8).unwrap();
        buf.copy_from_slice(&[1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12, 0, 0]);
        assert_eq!(frame.row(1).unwrap(), &[7, 8, 9, 10, 11, 12]);
        assert!(frame.row(2).is_none());
        assert_eq!(frame.to_rgb(), vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        frame.validate().unwrap();
    }

    #[test]
    fn bgrx_luma_swaps_channels() {
        let mut frame = Frame::new();
        let buf = frame.refill(1, 1, 4, PixelFormat::Bgrx8).unwrap();
        buf.copy_from_slice(&[0, 0, 255, 0]);
        // pure red
        assert_eq!(frame.luma_at(0, 0), Some(76));
        assert_eq!(frame.to_rgb(), vec![255, 0, 0]);
    }
}
