//! analyze - batch video analysis CLI
//!
//! Runs the batch pipeline over one video file: every frame is annotated
//! into the output file and person sightings become a deduplicated alert
//! list printed at the end.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;

use vigil_pipeline::detect::labels::PERSON_CLASS_ID;
use vigil_pipeline::ui::Ui;
use vigil_pipeline::{
    FrameProcessor, PipelineConfig, PipelineReport, SourceOpenError, StubBackend, VideoPipeline,
};

#[derive(Parser, Debug)]
#[command(
    name = "analyze",
    about = "Analyze a video file: annotate detections, collect person alerts"
)]
struct Args {
    /// Input video file (mp4, mov, avi; stub:// clips for demos)
    input: String,

    /// Output video path
    #[arg(short, long, default_value = "output.mp4", env = "VIGIL_OUTPUT")]
    output: String,

    /// Four-character codec tag for the output file
    #[arg(long, default_value = "mp4v", env = "VIGIL_CODEC")]
    codec: String,

    /// Class whose detections raise alerts
    #[arg(long, default_value = "person", env = "VIGIL_ALERT_LABEL")]
    alert_label: String,

    /// Detector backend: stub, or tract with --model
    #[arg(long, default_value = "stub", env = "VIGIL_BACKEND")]
    backend: String,

    /// ONNX model path for the tract backend
    #[arg(long, env = "VIGIL_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Detection confidence threshold
    #[arg(long, default_value_t = 0.5, env = "VIGIL_CONFIDENCE")]
    confidence: f32,

    /// Model input width for the tract backend
    #[arg(long, default_value_t = 640)]
    model_width: u32,

    /// Model input height for the tract backend
    #[arg(long, default_value_t = 480)]
    model_height: u32,

    /// Progress output: auto, plain, pretty
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            if let Some(open) = err.downcast_ref::<SourceOpenError>() {
                eprintln!("error: {}", open);
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<PipelineReport> {
    let processor = build_processor(args)?;
    let config = PipelineConfig {
        input: args.input.clone(),
        output: args.output.clone(),
        codec: args.codec.clone(),
        alert_label: args.alert_label.to_lowercase(),
    };

    let ui = Ui::from_flag(args.ui.as_deref(), std::io::stderr().is_terminal());
    let stage = ui.stage("Analyzing video");
    let report = VideoPipeline::new(config, processor).run()?;
    stage.finish_with(format!(
        "{} frames, {} alerts",
        report.frames_processed,
        report.alerts.len()
    ));

    Ok(report)
}

fn build_processor(args: &Args) -> Result<FrameProcessor> {
    if !(0.0..=1.0).contains(&args.confidence) {
        return Err(anyhow!("--confidence must be in 0..=1"));
    }
    match args.backend.as_str() {
        "stub" => Ok(FrameProcessor::new(
            StubBackend::new().with_motion_class(PERSON_CLASS_ID),
        )),
        "tract" => build_tract(args),
        other => Err(anyhow!("unknown backend '{other}'")),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(args: &Args) -> Result<FrameProcessor> {
    let model = args
        .model
        .as_ref()
        .ok_or_else(|| anyhow!("--backend tract requires --model"))?;
    let backend = vigil_pipeline::TractBackend::new(model, args.model_width, args.model_height)?
        .with_threshold(args.confidence);
    Ok(FrameProcessor::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_args: &Args) -> Result<FrameProcessor> {
    Err(anyhow!(
        "this build does not include the tract backend; rebuild with --features backend-tract"
    ))
}

fn print_report(report: &PipelineReport) {
    println!("Output video saved at: {}", report.output_path);
    if report.alerts.is_empty() {
        println!("No specific events were detected.");
        return;
    }
    println!("Detected events:");
    for alert in &report.alerts {
        println!("  {alert}");
    }
}
