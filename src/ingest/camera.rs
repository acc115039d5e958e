//! Live camera source.
//!
//! `CameraSource` captures frames from a local camera device for the live
//! feed loop. `stub://` devices produce an unbounded synthetic scene for
//! tests; real devices capture through V4L2 behind the `ingest-v4l2` feature.
//!
//! A camera handle is exclusively owned by the active live loop and released
//! on drop, on every exit path.

use anyhow::Result;

use crate::frame::{Frame, StreamInfo};
#[cfg(not(feature = "ingest-v4l2"))]
use crate::SourceOpenError;

use super::file::synthetic_frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0"), or `stub://` for a synthetic scene.
    pub device: String,
    /// Target frame rate (frames per second). The device may negotiate down.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl CameraConfig {
    /// Camera by platform device index; index 0 is the default webcam.
    pub fn from_index(index: u32) -> Self {
        Self {
            device: format!("/dev/video{index}"),
            ..Self::default()
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Live camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(v4l2::DeviceCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
            });
        }

        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(v4l2::DeviceCamera::new(config)?),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(SourceOpenError::new(
                &config.device,
                "camera capture requires the ingest-v4l2 feature",
            )
            .into())
        }
    }

    /// Connect to the camera device.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.connect(),
        }
    }

    /// Stream metadata with the device-negotiated dimensions.
    pub fn stream_info(&self) -> StreamInfo {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.stream_info(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.stream_info(),
        }
    }

    /// Capture the next frame; `Ok(None)` means the feed ended and the loop
    /// should stop.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.next_frame(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.is_healthy(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.stats(),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("CameraSource: connected to {} (synthetic)", self.config.device);
        Ok(())
    }

    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            width: self.config.width,
            height: self.config.height,
            fps: self.config.target_fps,
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let index = self.frame_count;
        self.frame_count += 1;
        Ok(Some(synthetic_frame(
            self.config.width,
            self.config.height,
            index,
        )?))
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// V4L2 camera capture
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
mod v4l2 {
    use std::time::{Duration, Instant};

    use anyhow::{Context, Result};
    use ouroboros::self_referencing;

    use crate::frame::{Frame, StreamInfo};

    use super::{CameraConfig, CameraStats};

    pub(super) struct DeviceCamera {
        config: CameraConfig,
        state: Option<DeviceState>,
        frame_count: u64,
        last_frame_at: Option<Instant>,
        last_error: Option<String>,
        active_width: u32,
        active_height: u32,
    }

    #[self_referencing]
    struct DeviceState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceCamera {
        pub(super) fn new(config: CameraConfig) -> Result<Self> {
            Ok(Self {
                active_width: config.width,
                active_height: config.height,
                config,
                state: None,
                frame_count: 0,
                last_frame_at: None,
                last_error: None,
            })
        }

        pub(super) fn connect(&mut self) -> Result<()> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&self.config.device)
                .with_context(|| format!("open v4l2 device {}", self.config.device))?;
            let mut format = device.format().context("read v4l2 format")?;
            format.width = self.config.width;
            format.height = self.config.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "CameraSource: failed to set format on {}: {}",
                        self.config.device,
                        err
                    );
                    device
                        .format()
                        .context("read v4l2 format after set failure")?
                }
            };

            if self.config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!(
                        "CameraSource: failed to set fps on {}: {}",
                        self.config.device,
                        err
                    );
                }
            }

            self.active_width = format.width;
            self.active_height = format.height;
            self.last_error = None;

            let state = DeviceStateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
                },
            }
            .try_build()
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?;
            self.state = Some(state);

            log::info!(
                "CameraSource: connected to {} ({}x{})",
                self.config.device,
                self.active_width,
                self.active_height
            );
            Ok(())
        }

        pub(super) fn stream_info(&self) -> StreamInfo {
            StreamInfo {
                width: self.active_width,
                height: self.active_height,
                fps: self.config.target_fps,
            }
        }

        pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
            use v4l::io::traits::CaptureStream;

            let state = self.state.as_mut().context("camera not connected")?;
            let capture = state.with_mut(|fields| fields.stream.next());
            let (buf, _meta) = match capture {
                Ok(capture) => capture,
                Err(err) => {
                    // Device went away mid-stream; the loop treats this as
                    // end of feed, not a crash.
                    self.last_error = Some(err.to_string());
                    log::warn!("CameraSource: capture ended on {}: {}", self.config.device, err);
                    return Ok(None);
                }
            };

            let index = self.frame_count;
            self.frame_count += 1;
            self.last_frame_at = Some(Instant::now());

            let frame = Frame::new(buf.to_vec(), self.active_width, self.active_height, index)?;
            Ok(Some(frame))
        }

        pub(super) fn is_healthy(&self) -> bool {
            if self.last_error.is_some() {
                return false;
            }
            let Some(last_frame_at) = self.last_frame_at else {
                return true;
            };
            last_frame_at.elapsed() <= self.health_grace()
        }

        pub(super) fn stats(&self) -> CameraStats {
            CameraStats {
                frames_captured: self.frame_count,
                device: self.config.device.clone(),
            }
        }

        fn health_grace(&self) -> Duration {
            let base_ms = if self.config.target_fps == 0 {
                2_000
            } else {
                (1000 / self.config.target_fps).saturating_mul(6)
            };
            Duration::from_millis(base_ms.max(2_000) as u64)
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            device: "stub://camera".to_string(),
            target_fps: 10,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn camera_source_produces_indexed_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        source.connect()?;

        let first = source.next_frame()?.expect("frame");
        let second = source.next_frame()?.expect("frame");
        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
        assert_eq!(first.width(), 64);
        assert_ne!(first.pixels(), second.pixels());

        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn camera_index_maps_to_device_path() {
        let config = CameraConfig::from_index(0);
        assert_eq!(config.device, "/dev/video0");
    }
}
