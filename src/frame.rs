//! Frame data model.
//!
//! - `Frame`: one decoded RGB24 raster with its index in the source stream.
//! - `StreamInfo`: width/height/fps metadata read once at source open.
//!
//! Frames are produced by the ingest layer and consumed by the processor.
//! Processing never mutates a frame in place; annotation returns a new copy.

use anyhow::{anyhow, Result};

/// Fallback frame rate when a container reports fps == 0.
///
/// Timestamps divide the frame index by fps, so a zero rate would be
/// undefined. 30 is the common container default.
pub const DEFAULT_FPS: u32 = 30;

/// Bytes per pixel for RGB24 frames.
pub const RGB_CHANNELS: usize = 3;

/// One decoded frame from a video or camera stream.
///
/// Pixel data is tightly packed RGB24, row-major, no stride padding.
/// The `index` is the zero-based position within the source stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: u64,
}

impl Frame {
    /// Create a frame from a packed RGB24 buffer.
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} RGB24",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Zero-based position within the source stream.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Read-only pixel access for inference and encoding.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Consume the frame, returning the packed pixel buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }

    /// Copy this frame's pixels under the same dimensions and index.
    pub(crate) fn with_pixels(&self, data: Vec<u8>) -> Result<Self> {
        Self::new(data, self.width, self.height, self.index)
    }
}

/// Stream metadata read once from a source at open time.
///
/// Dimensions and fps are truncated to integers at read time; the sink is
/// constructed from these same values so output geometry matches input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamInfo {
    /// Substitute `DEFAULT_FPS` when the container reports fps == 0.
    ///
    /// Some files carry no usable rate metadata; timestamp arithmetic needs
    /// a nonzero divisor either way.
    pub fn normalized(self) -> Self {
        if self.fps == 0 {
            log::warn!(
                "stream reports 0 fps, falling back to {} fps for timestamps",
                DEFAULT_FPS
            );
            return Self {
                fps: DEFAULT_FPS,
                ..self
            };
        }
        self
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_validates_buffer_length() {
        let ok = Frame::new(vec![0u8; 4 * 2 * 3], 4, 2, 0);
        assert!(ok.is_ok());

        let short = Frame::new(vec![0u8; 10], 4, 2, 0);
        assert!(short.is_err());
    }

    #[test]
    fn frame_exposes_index_and_dimensions() {
        let frame = Frame::new(vec![7u8; 2 * 2 * 3], 2, 2, 41).unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.index(), 41);
        assert_eq!(frame.pixels().len(), 12);
    }

    #[test]
    fn zero_fps_normalizes_to_default() {
        let info = StreamInfo {
            width: 640,
            height: 480,
            fps: 0,
        };
        assert_eq!(info.normalized().fps, DEFAULT_FPS);

        let intact = StreamInfo {
            width: 640,
            height: 480,
            fps: 5,
        };
        assert_eq!(intact.normalized().fps, 5);
    }
}
