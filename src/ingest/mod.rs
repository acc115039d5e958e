//! Frame sources.
//!
//! This module provides the two inputs the pipeline consumes:
//! - Local video files (`FileSource`; FFmpeg decode behind
//!   feature `ingest-file-ffmpeg`)
//! - Live cameras (`CameraSource`; V4L2 capture behind feature `ingest-v4l2`)
//!
//! Both also accept `stub://` paths that produce synthetic frames for tests
//! and model-free demos.
//!
//! Sources yield frames in stream order and report end-of-stream as
//! `Ok(None)`; an `Err` from `next_frame` is a source fault. Stream metadata
//! (width, height, fps) is read once at open/connect time and reused when
//! constructing the sink. A source handle is exclusively owned and released
//! on drop, exactly once, on every exit path.

pub mod camera;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use camera::{CameraConfig, CameraSource};
pub use file::{stage_upload, FileConfig, FileSource};
