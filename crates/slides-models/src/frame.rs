//! Decoded video frames.

use crate::error::{ModelError, ModelResult};

/// A decoded RGBA pixel buffer.
///
/// Frames are ephemeral: the detector consumes one per tick and either
/// drops it or promotes it to a [`crate::Slide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Bytes per pixel (RGBA).
    pub const CHANNELS: usize = 4;

    /// Wrap an RGBA buffer, checking that its length matches the dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> ModelResult<Self> {
        if width == 0 || height == 0 {
            return Err(ModelError::invalid_frame(format!(
                "dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }

        let expected = width as usize * height as usize * Self::CHANNELS;
        if data.len() != expected {
            return Err(ModelError::invalid_frame(format!(
                "expected {} bytes for {}x{} RGBA, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }

        Ok(Self { width, height, data })
    }

    /// A frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> ModelResult<Self> {
        let pixels = width as usize * height as usize;
        let data = rgba.iter().copied().cycle().take(pixels * Self::CHANNELS).collect();
        Self::from_rgba(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Number of pixels in the frame.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// RGBA value at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        Some([
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ])
    }
}
