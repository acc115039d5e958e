//! The analysis pipeline.
//!
//! `FrameProcessor` is the per-frame unit: one detector invocation, one
//! annotated copy, one label list. `VideoPipeline` drives a whole file
//! through it: Opening -> Streaming -> Draining -> Closed, with a terminal
//! Failed state when the source cannot be opened. Alerts for the sentinel
//! class are collected deduplicated, in first-seen order.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};

use crate::detect::{annotate, Detection, DetectorBackend};
use crate::frame::Frame;
use crate::ingest::{FileConfig, FileSource};
use crate::sink::{FrameSink, VideoFileSink};

/// One frame's processing output.
pub struct ProcessedFrame {
    /// Copy of the input with boxes and label tags drawn.
    pub annotated: Frame,
    /// Raw detections, in model output order.
    pub detections: Vec<Detection>,
    /// Resolved class labels, same order, duplicates allowed.
    pub labels: Vec<String>,
}

/// Per-frame processor: detector invocation plus annotation.
///
/// The backend is shared behind a mutex because `detect` takes `&mut self`;
/// a processor never calls it concurrently.
pub struct FrameProcessor {
    backend: Arc<Mutex<dyn DetectorBackend>>,
    labels: &'static [&'static str],
}

impl FrameProcessor {
    pub fn new<B: DetectorBackend + 'static>(backend: B) -> Self {
        let labels = backend.labels();
        Self {
            backend: Arc::new(Mutex::new(backend)),
            labels,
        }
    }

    /// Build from a registry-held backend.
    pub fn from_shared(backend: Arc<Mutex<dyn DetectorBackend>>) -> Result<Self> {
        let labels = {
            let guard = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            guard.labels()
        };
        Ok(Self { backend, labels })
    }

    /// Process one frame: detect, annotate a copy, resolve labels.
    ///
    /// The input frame is never mutated. Zero detections still produce an
    /// annotated frame (pixel-identical to the input). A detector failure is
    /// fatal for this frame; no partial result is returned.
    pub fn process(&mut self, frame: &Frame) -> Result<ProcessedFrame> {
        let detections = {
            let mut guard = self
                .backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            guard
                .detect(frame.pixels(), frame.width(), frame.height())
                .with_context(|| format!("detection failed on frame {}", frame.index()))?
        };

        let annotated = annotate(frame, &detections, self.labels)?;
        let labels = detections
            .iter()
            .map(|d| crate::detect::labels::resolve(self.labels, d.class_id).to_string())
            .collect();

        Ok(ProcessedFrame {
            annotated,
            detections,
            labels,
        })
    }
}

// ----------------------------------------------------------------------------
// Alerts
// ----------------------------------------------------------------------------

/// A sentinel-class sighting at a stream timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct Alert {
    pub label: String,
    pub timestamp_secs: f64,
}

impl Alert {
    pub fn new(label: impl Into<String>, frame_index: u64, fps: u32) -> Self {
        Self {
            label: label.into(),
            timestamp_secs: frame_index as f64 / fps as f64,
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} detected at {:.2} seconds",
            capitalize(&self.label),
            self.timestamp_secs
        )
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Deduplicated alert collection.
///
/// Keyed by the rendered string; iteration preserves first-seen order, so a
/// report reads chronologically while duplicates collapse.
#[derive(Default)]
pub struct AlertLog {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an alert; returns true when it was not already present.
    pub fn record(&mut self, alert: &Alert) -> bool {
        let rendered = alert.to_string();
        if self.seen.insert(rendered.clone()) {
            self.ordered.push(rendered);
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn as_strings(&self) -> &[String] {
        &self.ordered
    }

    pub fn into_strings(self) -> Vec<String> {
        self.ordered
    }
}

// ----------------------------------------------------------------------------
// Batch pipeline
// ----------------------------------------------------------------------------

/// Batch pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Input video path (or a `stub://` synthetic clip).
    pub input: String,
    /// Output video path (or `stub://` for a counting sink).
    pub output: String,
    /// Four-character codec tag for the output file.
    pub codec: String,
    /// Sentinel class whose detections raise alerts.
    pub alert_label: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: String::new(),
            output: "output.mp4".to_string(),
            codec: "mp4v".to_string(),
            alert_label: "person".to_string(),
        }
    }
}

/// Completed-run summary returned to the caller/UI.
#[derive(Clone, Debug, serde::Serialize)]
pub struct PipelineReport {
    pub output_path: String,
    pub alerts: Vec<String>,
    pub frames_processed: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PipelineState {
    Opening,
    Streaming,
    Draining,
    Closed,
    Failed,
}

/// Batch pipeline over one video file.
pub struct VideoPipeline {
    config: PipelineConfig,
    processor: FrameProcessor,
    state: PipelineState,
}

impl VideoPipeline {
    pub fn new(config: PipelineConfig, processor: FrameProcessor) -> Self {
        Self {
            config,
            processor,
            state: PipelineState::Opening,
        }
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("pipeline: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the pipeline to completion or failure.
    ///
    /// On an open failure the error carries a `SourceOpenError` and no output
    /// file is presented as valid. Source and sink are released on every exit
    /// path; one output frame is written per successfully read input frame.
    pub fn run(&mut self) -> Result<PipelineReport> {
        self.transition(PipelineState::Opening);

        let mut source = match FileSource::open(FileConfig::new(&self.config.input)) {
            Ok(source) => source,
            Err(err) => {
                self.transition(PipelineState::Failed);
                log::error!("could not open {}: {err:#}", self.config.input);
                return Err(err);
            }
        };

        let info = source.stream_info().normalized();
        let mut sink = match VideoFileSink::create(&self.config.output, info, &self.config.codec) {
            Ok(sink) => sink,
            Err(err) => {
                self.transition(PipelineState::Failed);
                log::error!("could not create {}: {err:#}", self.config.output);
                return Err(err);
            }
        };

        self.transition(PipelineState::Streaming);
        let mut alerts = AlertLog::new();
        let stream_result = stream_frames(
            &mut self.processor,
            &mut source,
            &mut sink,
            &self.config.alert_label,
            info.fps,
            &mut alerts,
        );

        // Draining runs on every exit path, early failure included.
        self.transition(PipelineState::Draining);
        let finish_result = sink.finish();
        drop(source);

        let frames_processed = stream_result?;
        finish_result?;

        self.transition(PipelineState::Closed);
        debug_assert_eq!(sink.frames_written(), frames_processed);
        log::info!(
            "processing complete: {} frames, {} alerts, output at {}",
            frames_processed,
            alerts.len(),
            self.config.output
        );

        Ok(PipelineReport {
            output_path: self.config.output.clone(),
            alerts: alerts.into_strings(),
            frames_processed,
        })
    }
}

/// Streaming phase body: read, process, alert, write, repeat.
fn stream_frames(
    processor: &mut FrameProcessor,
    source: &mut FileSource,
    sink: &mut VideoFileSink,
    alert_label: &str,
    fps: u32,
    alerts: &mut AlertLog,
) -> Result<u64> {
    let mut frames_processed = 0u64;

    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            // End of stream, or a mid-stream read fault: both end Streaming.
            Ok(None) => break,
            Err(err) => {
                log::warn!("frame read failed, ending stream: {err:#}");
                break;
            }
        };

        let processed = processor.process(&frame)?;
        for label in &processed.labels {
            if label.as_str() == alert_label {
                let alert = Alert::new(label.clone(), frame.index(), fps);
                if alerts.record(&alert) {
                    log::info!("{}", alert);
                }
            }
        }

        sink.write(&processed.annotated)?;
        frames_processed += 1;
    }

    Ok(frames_processed)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::labels::PERSON_CLASS_ID;
    use crate::detect::StubBackend;

    #[test]
    fn alert_renders_with_two_decimal_places() {
        let alert = Alert::new("person", 3, 5);
        assert_eq!(alert.to_string(), "Person detected at 0.60 seconds");
    }

    #[test]
    fn alert_log_collapses_duplicates_in_order() {
        let mut log = AlertLog::new();
        assert!(log.record(&Alert::new("person", 3, 5)));
        assert!(log.record(&Alert::new("person", 4, 5)));
        assert!(!log.record(&Alert::new("person", 3, 5)));

        assert_eq!(
            log.as_strings(),
            [
                "Person detected at 0.60 seconds",
                "Person detected at 0.80 seconds",
            ]
        );
    }

    #[test]
    fn processor_reports_labels_in_detection_order() -> Result<()> {
        let backend = StubBackend::new()
            .with_detection_at(0, PERSON_CLASS_ID, 0.9)
            .with_detection_at(0, 2, 0.8);
        let mut processor = FrameProcessor::new(backend);

        let frame = Frame::new(vec![0u8; 64 * 48 * 3], 64, 48, 0)?;
        let processed = processor.process(&frame)?;

        assert_eq!(processed.labels, ["person", "car"]);
        assert_eq!(processed.detections.len(), 2);
        Ok(())
    }
}
