//! Vigil video analysis pipeline.
//!
//! Feeds video from a file or camera through a pretrained object-detection
//! backend, draws the detections onto each frame, and raises text alerts when
//! a sentinel class ("person" by default) appears. A small local HTTP API
//! serves status, alerts, and the latest annotated frame to the browser
//! dashboard.
//!
//! # Architecture
//!
//! Everything is a thin, single-threaded per-frame loop around an opaque
//! detector:
//!
//! - `frame`: frame and stream-metadata types
//! - `ingest`: frame sources (video files, cameras, `stub://` synthetics)
//! - `detect`: the detector seam (backend trait, registry, annotation)
//! - `sink`: frame sinks (output video files, counting stub)
//! - `pipeline`: the frame processor and the batch state machine
//! - `live`: the cooperative live-feed loop
//! - `api`: the dashboard HTTP surface
//!
//! The batch pipeline guarantees one output frame per successfully read
//! input frame, in order, and a deduplicated alert list; sources and sinks
//! are released exactly once on every exit path.

use std::fmt;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};

pub mod api;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod live;
pub mod pipeline;
pub mod sink;
pub mod ui;

pub use api::{ApiConfig, ApiHandle, ApiServer, Dashboard};
pub use detect::{annotate, BackendRegistry, BoundingBox, Detection, DetectorBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::{Frame, StreamInfo, DEFAULT_FPS};
pub use ingest::{stage_upload, CameraConfig, CameraSource, FileConfig, FileSource};
pub use live::{run_live, FrameDisplay, LiveStats};
pub use pipeline::{
    Alert, AlertLog, FrameProcessor, PipelineConfig, PipelineReport, ProcessedFrame, VideoPipeline,
};
pub use sink::{FrameSink, VideoFileSink};

// -------------------- Source open failures --------------------

/// A source could not be opened: bad path, missing codec, camera unavailable.
///
/// This is the one failure the caller must distinguish (the batch pipeline
/// aborts with no output and an empty alert list), so it is a typed error
/// rather than a bare message; everything else propagates through `anyhow`.
#[derive(Clone, Debug)]
pub struct SourceOpenError {
    pub source_name: String,
    pub reason: String,
}

impl SourceOpenError {
    pub fn new(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SourceOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not open '{}': {}", self.source_name, self.reason)
    }
}

impl std::error::Error for SourceOpenError {}

// -------------------- Codec tag discipline --------------------

/// A conforming output codec tag is exactly four alphanumeric characters
/// (the container's four-character code), e.g. "mp4v", "avc1", "mjpg".
pub fn validate_codec_tag(tag: &str) -> Result<()> {
    // Compile once for hot paths.
    static CODEC_TAG_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = CODEC_TAG_RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9]{4}$").unwrap());

    if !re.is_match(tag) {
        return Err(anyhow!(
            "codec tag must be exactly four alphanumeric characters, got '{}'",
            tag
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_tags_are_four_alphanumerics() {
        assert!(validate_codec_tag("mp4v").is_ok());
        assert!(validate_codec_tag("MJPG").is_ok());
        assert!(validate_codec_tag("mp4").is_err());
        assert!(validate_codec_tag("mp4v ").is_err());
        assert!(validate_codec_tag("h.264").is_err());
    }

    #[test]
    fn source_open_error_is_downcastable() {
        let err: anyhow::Error = SourceOpenError::new("clip.mp4", "no such file").into();
        let open = err.downcast_ref::<SourceOpenError>().expect("typed error");
        assert_eq!(open.source_name, "clip.mp4");
        assert!(err.to_string().contains("clip.mp4"));
    }
}
