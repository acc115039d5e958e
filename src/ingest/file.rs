//! Local video file source.
//!
//! `FileSource` opens a local video file, reads its stream metadata once, and
//! yields decoded frames in order until end of stream. `stub://` paths select
//! a synthetic in-memory clip for tests; anything else decodes through FFmpeg
//! when the `ingest-file-ffmpeg` feature is enabled.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use rand::RngCore;

use crate::frame::{Frame, StreamInfo};
use crate::SourceOpenError;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path, or a `stub://` synthetic clip for tests.
    pub path: String,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Local video file source.
#[derive(Debug)]
pub struct FileSource {
    backend: FileBackend,
    path: String,
}

#[derive(Debug)]
enum FileBackend {
    Synthetic(SyntheticClip),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Open the source and read its stream metadata.
    ///
    /// Failure here is a `SourceOpenError`: bad path, no video track, or a
    /// decoder the build does not carry. Nothing has been produced yet, so
    /// aborting leaves no partial output behind.
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(SourceOpenError::new(
                &config.path,
                "file ingestion only supports local paths (no URL schemes)",
            )
            .into());
        }

        if config.path.starts_with("stub://") {
            let clip = SyntheticClip::parse(&config.path)?;
            log::info!("FileSource: opened {} (synthetic)", config.path);
            return Ok(Self {
                backend: FileBackend::Synthetic(clip),
                path: config.path,
            });
        }

        if !Path::new(&config.path).is_file() {
            return Err(SourceOpenError::new(&config.path, "no such file").into());
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            let source = FfmpegFileSource::open(&config.path)?;
            log::info!("FileSource: opened {} (ffmpeg)", config.path);
            Ok(Self {
                backend: FileBackend::Ffmpeg(source),
                path: config.path,
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(SourceOpenError::new(
                &config.path,
                "decoding real files requires the ingest-file-ffmpeg feature",
            )
            .into())
        }
    }

    /// Stream metadata, read once at open time.
    pub fn stream_info(&self) -> StreamInfo {
        match &self.backend {
            FileBackend::Synthetic(clip) => clip.stream_info(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stream_info(),
        }
    }

    /// Read the next frame; `Ok(None)` is normal end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(clip) => clip.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        let frames_read = match &self.backend {
            FileBackend::Synthetic(clip) => clip.frames_read,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_read(),
        };
        FileStats {
            frames_read,
            path: self.path.clone(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_read: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Synthetic clip (stub://) for tests
// ----------------------------------------------------------------------------

/// Synthetic finite clip described by the stub path itself, e.g.
/// `stub://clip?frames=10&fps=5&width=64&height=48`.
#[derive(Debug)]
struct SyntheticClip {
    frames: u64,
    width: u32,
    height: u32,
    fps: u32,
    frames_read: u64,
}

impl SyntheticClip {
    fn parse(path: &str) -> Result<Self> {
        let mut clip = Self {
            frames: 30,
            width: 64,
            height: 48,
            fps: 10,
            frames_read: 0,
        };

        if let Some(query) = path.split('?').nth(1) {
            for pair in query.split('&') {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                let value: u64 = value.parse().map_err(|_| {
                    SourceOpenError::new(path, format!("bad stub parameter '{pair}'"))
                })?;
                match key {
                    "frames" => clip.frames = value,
                    "width" => clip.width = value as u32,
                    "height" => clip.height = value as u32,
                    "fps" => clip.fps = value as u32,
                    _ => {
                        return Err(SourceOpenError::new(
                            path,
                            format!("unknown stub parameter '{key}'"),
                        )
                        .into())
                    }
                }
            }
        }

        Ok(clip)
    }

    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frames_read >= self.frames {
            return Ok(None);
        }
        let index = self.frames_read;
        self.frames_read += 1;
        Ok(Some(synthetic_frame(self.width, self.height, index)?))
    }
}

/// Deterministic synthetic pixels: a pattern mixed with the frame index so
/// consecutive frames differ (motion-style backends see a changing scene).
pub(crate) fn synthetic_frame(width: u32, height: u32, index: u64) -> Result<Frame> {
    let pixel_count = (width as usize) * (height as usize) * 3;
    let mut pixels = vec![0u8; pixel_count];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = ((i as u64 + index * 7) % 256) as u8;
    }
    Frame::new(pixels, width, height, index)
}

/// Container extensions the upload path accepts.
const UPLOAD_EXTENSIONS: [&str; 3] = ["mp4", "mov", "avi"];

/// Persist uploaded video bytes to a local path `FileSource` can open.
///
/// This is the core's upload seam: the presentation layer hands over raw
/// bytes, the core hands back a path. Files land in the system temp
/// directory under a random suffix so concurrent uploads never collide.
pub fn stage_upload(bytes: &[u8], extension: &str) -> Result<PathBuf> {
    let extension = extension.to_ascii_lowercase();
    if !UPLOAD_EXTENSIONS.contains(&extension.as_str()) {
        return Err(anyhow!(
            "unsupported upload container '.{}' (accepted: {})",
            extension,
            UPLOAD_EXTENSIONS.join(", ")
        ));
    }

    let mut suffix = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut suffix);
    let path = std::env::temp_dir().join(format!(
        "vigil_upload_{}.{}",
        hex::encode(suffix),
        extension
    ));
    std::fs::write(&path, bytes)?;
    log::info!("staged {} uploaded bytes at {}", bytes.len(), path.display());
    Ok(path)
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_clip_yields_exactly_its_frame_count() -> Result<()> {
        let mut source = FileSource::open(FileConfig::new("stub://clip?frames=3&fps=5"))?;
        assert_eq!(source.stream_info().fps, 5);

        let mut count = 0;
        while let Some(frame) = source.next_frame()? {
            assert_eq!(frame.index(), count);
            count += 1;
        }
        assert_eq!(count, 3);

        // End of stream is sticky.
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_read, 3);
        Ok(())
    }

    #[test]
    fn empty_clip_is_not_an_error() -> Result<()> {
        let mut source = FileSource::open(FileConfig::new("stub://empty?frames=0"))?;
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn url_schemes_are_rejected() {
        let err = FileSource::open(FileConfig::new("https://example.com/video.mp4"))
            .expect_err("must reject URL");
        assert!(err.downcast_ref::<SourceOpenError>().is_some());
    }

    #[test]
    fn missing_file_is_a_source_open_error() {
        let err = FileSource::open(FileConfig::new("/nonexistent/video.mp4"))
            .expect_err("must reject missing file");
        assert!(err.downcast_ref::<SourceOpenError>().is_some());
    }

    #[test]
    fn staged_uploads_land_on_disk_with_their_extension() -> Result<()> {
        let path = stage_upload(b"not really video", "MP4")?;
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));
        assert_eq!(std::fs::read(&path)?, b"not really video");
        std::fs::remove_file(&path)?;

        assert!(stage_upload(b"x", "exe").is_err());
        Ok(())
    }
}
