use anyhow::Result;

use vigil_pipeline::detect::labels::PERSON_CLASS_ID;
use vigil_pipeline::{
    Frame, FrameProcessor, PipelineConfig, SourceOpenError, StubBackend, VideoPipeline,
};

fn pipeline_config(input: &str) -> PipelineConfig {
    PipelineConfig {
        input: input.to_string(),
        output: "stub://out".to_string(),
        ..PipelineConfig::default()
    }
}

#[test]
fn quiet_frames_pass_through_pixel_identical() -> Result<()> {
    let mut processor = FrameProcessor::new(StubBackend::new());
    let frame = Frame::new(
        (0..64 * 48 * 3).map(|i| (i % 253) as u8).collect(),
        64,
        48,
        0,
    )?;

    let processed = processor.process(&frame)?;

    assert!(processed.detections.is_empty());
    assert_eq!(processed.annotated.pixels(), frame.pixels());
    Ok(())
}

#[test]
fn every_read_frame_is_written() -> Result<()> {
    let processor = FrameProcessor::new(StubBackend::new());
    let mut pipeline = VideoPipeline::new(pipeline_config("stub://clip?frames=10&fps=5"), processor);

    let report = pipeline.run()?;

    assert_eq!(report.frames_processed, 10);
    assert_eq!(report.output_path, "stub://out");
    Ok(())
}

#[test]
fn person_on_frame_three_at_five_fps_alerts_at_060_seconds() -> Result<()> {
    let backend = StubBackend::new().with_detection_at(3, PERSON_CLASS_ID, 0.9);
    let mut pipeline = VideoPipeline::new(
        pipeline_config("stub://clip?frames=10&fps=5"),
        FrameProcessor::new(backend),
    );

    let report = pipeline.run()?;

    assert_eq!(report.alerts, ["Person detected at 0.60 seconds"]);
    assert_eq!(report.frames_processed, 10);
    Ok(())
}

#[test]
fn duplicate_sightings_collapse_to_one_alert() -> Result<()> {
    // Two person detections on the same frame render the same alert string.
    let backend = StubBackend::new()
        .with_detection_at(3, PERSON_CLASS_ID, 0.9)
        .with_detection_at(3, PERSON_CLASS_ID, 0.7)
        .with_detection_at(7, PERSON_CLASS_ID, 0.8);
    let mut pipeline = VideoPipeline::new(
        pipeline_config("stub://clip?frames=10&fps=5"),
        FrameProcessor::new(backend),
    );

    let report = pipeline.run()?;

    assert_eq!(
        report.alerts,
        [
            "Person detected at 0.60 seconds",
            "Person detected at 1.40 seconds",
        ]
    );

    let unique: std::collections::HashSet<_> = report.alerts.iter().collect();
    assert_eq!(unique.len(), report.alerts.len());
    Ok(())
}

#[test]
fn non_sentinel_detections_raise_no_alerts() -> Result<()> {
    // Class 2 is "car"; only the sentinel class alerts.
    let backend = StubBackend::new().with_detection_at(1, 2, 0.9);
    let mut pipeline = VideoPipeline::new(
        pipeline_config("stub://clip?frames=5&fps=5"),
        FrameProcessor::new(backend),
    );

    let report = pipeline.run()?;

    assert!(report.alerts.is_empty());
    assert_eq!(report.frames_processed, 5);
    Ok(())
}

#[test]
fn deterministic_detector_yields_identical_alerts_across_runs() -> Result<()> {
    let run = || -> Result<Vec<String>> {
        let backend = StubBackend::new()
            .with_detection_at(2, PERSON_CLASS_ID, 0.9)
            .with_detection_at(6, PERSON_CLASS_ID, 0.9);
        let mut pipeline = VideoPipeline::new(
            pipeline_config("stub://clip?frames=8&fps=4"),
            FrameProcessor::new(backend),
        );
        Ok(pipeline.run()?.alerts)
    };

    assert_eq!(run()?, run()?);
    Ok(())
}

#[test]
fn empty_source_closes_cleanly_with_no_alerts() -> Result<()> {
    let processor = FrameProcessor::new(StubBackend::new());
    let mut pipeline = VideoPipeline::new(pipeline_config("stub://empty?frames=0"), processor);

    let report = pipeline.run()?;

    assert!(report.alerts.is_empty());
    assert_eq!(report.frames_processed, 0);
    Ok(())
}

#[test]
fn nonexistent_input_fails_as_source_open_error() {
    let processor = FrameProcessor::new(StubBackend::new());
    let mut pipeline = VideoPipeline::new(
        pipeline_config("/nonexistent/footage.mp4"),
        processor,
    );

    let err = pipeline.run().expect_err("open must fail");
    let open = err
        .downcast_ref::<SourceOpenError>()
        .expect("SourceOpenError");
    assert_eq!(open.source_name, "/nonexistent/footage.mp4");
}

#[test]
fn zero_fps_input_still_produces_defined_timestamps() -> Result<()> {
    // fps=0 in the container falls back to DEFAULT_FPS (30); frame 3 lands
    // at 0.10 seconds.
    let backend = StubBackend::new().with_detection_at(3, PERSON_CLASS_ID, 0.9);
    let mut pipeline = VideoPipeline::new(
        pipeline_config("stub://clip?frames=5&fps=0"),
        FrameProcessor::new(backend),
    );

    let report = pipeline.run()?;

    assert_eq!(report.alerts, ["Person detected at 0.10 seconds"]);
    Ok(())
}
