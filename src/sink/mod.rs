//! Frame sinks.
//!
//! A sink receives every annotated frame the pipeline produces, in order,
//! one write per successfully read input frame. `VideoFileSink` writes an
//! output video with the same geometry and rate as the input and a fixed
//! four-character codec tag; `stub://` output paths select an in-memory
//! counting sink for tests. Sinks are released exactly once, on every exit
//! path, via `finish` or drop.

#[cfg(feature = "sink-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

use anyhow::{anyhow, Result};

use crate::frame::{Frame, StreamInfo};
use crate::validate_codec_tag;

/// Destination for annotated frames.
pub trait FrameSink {
    /// Write one frame. Frames arrive in stream order.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Number of frames written so far.
    fn frames_written(&self) -> u64;

    /// Flush and close. Idempotent; called once on the normal path and
    /// again harmlessly from drop guards.
    fn finish(&mut self) -> Result<()>;
}

/// Video file sink.
pub struct VideoFileSink {
    backend: SinkBackend,
    path: String,
}

enum SinkBackend {
    Counting(CountingSink),
    #[cfg(feature = "sink-file-ffmpeg")]
    Ffmpeg(file_ffmpeg::FfmpegFileSink),
}

impl VideoFileSink {
    /// Create the output file with the input's geometry and rate.
    pub fn create(path: &str, info: StreamInfo, codec_tag: &str) -> Result<Self> {
        validate_codec_tag(codec_tag)?;
        if info.fps == 0 {
            return Err(anyhow!("sink requires a nonzero fps (normalize the stream info first)"));
        }

        if path.starts_with("stub://") {
            log::info!("VideoFileSink: writing {} (counting)", path);
            return Ok(Self {
                backend: SinkBackend::Counting(CountingSink::default()),
                path: path.to_string(),
            });
        }

        #[cfg(feature = "sink-file-ffmpeg")]
        {
            let sink = file_ffmpeg::FfmpegFileSink::create(path, info, codec_tag)?;
            log::info!("VideoFileSink: writing {} (ffmpeg, {})", path, codec_tag);
            Ok(Self {
                backend: SinkBackend::Ffmpeg(sink),
                path: path.to_string(),
            })
        }
        #[cfg(not(feature = "sink-file-ffmpeg"))]
        {
            Err(anyhow!(
                "encoding real files requires the sink-file-ffmpeg feature"
            ))
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        match &mut self.backend {
            SinkBackend::Counting(sink) => sink.write(frame),
            #[cfg(feature = "sink-file-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.write(frame),
        }
    }

    fn frames_written(&self) -> u64 {
        match &self.backend {
            SinkBackend::Counting(sink) => sink.frames_written(),
            #[cfg(feature = "sink-file-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.frames_written(),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match &mut self.backend {
            SinkBackend::Counting(sink) => sink.finish(),
            #[cfg(feature = "sink-file-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.finish(),
        }
    }
}

// ----------------------------------------------------------------------------
// Counting sink (stub://) for tests
// ----------------------------------------------------------------------------

/// In-memory sink that records write order without encoding anything.
#[derive(Default)]
struct CountingSink {
    frames_written: u64,
    last_index: Option<u64>,
    closed: bool,
}

impl FrameSink for CountingSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(anyhow!("write after finish"));
        }
        if let Some(last) = self.last_index {
            if frame.index() <= last {
                return Err(anyhow!(
                    "frames arrived out of order: {} after {}",
                    frame.index(),
                    last
                ));
            }
        }
        self.last_index = Some(frame.index());
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> StreamInfo {
        StreamInfo {
            width: 4,
            height: 4,
            fps: 10,
        }
    }

    fn frame(index: u64) -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, index).unwrap()
    }

    #[test]
    fn counting_sink_tracks_order_and_count() -> Result<()> {
        let mut sink = VideoFileSink::create("stub://out", info(), "mp4v")?;
        sink.write(&frame(0))?;
        sink.write(&frame(1))?;
        assert_eq!(sink.frames_written(), 2);

        // Out-of-order writes are a bug upstream.
        assert!(sink.write(&frame(1)).is_err());
        sink.finish()?;
        assert!(sink.write(&frame(2)).is_err());
        Ok(())
    }

    #[test]
    fn bad_codec_tags_are_rejected() {
        assert!(VideoFileSink::create("stub://out", info(), "not a tag").is_err());
        assert!(VideoFileSink::create("stub://out", info(), "mp4").is_err());
    }

    #[test]
    fn zero_fps_info_is_rejected() {
        let zero = StreamInfo {
            width: 4,
            height: 4,
            fps: 0,
        };
        assert!(VideoFileSink::create("stub://out", zero, "mp4v").is_err());
    }
}
