//! Live feed loop.
//!
//! A caller-driven cooperative loop: read one frame from the camera, process
//! it, push the annotated copy to a display surface, while an externally
//! owned run flag stays true. The flag is checked once per iteration, not
//! preemptively; a blocking camera read cannot be interrupted mid-call. No
//! alerts accumulate and nothing is written to disk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::frame::Frame;
use crate::ingest::CameraSource;
use crate::pipeline::FrameProcessor;

/// Display surface for live frames.
///
/// The dashboard's latest-frame slot implements this; tests use probes.
pub trait FrameDisplay {
    fn show(&mut self, frame: &Frame, labels: &[String]) -> Result<()>;
}

/// Outcome of one live run.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiveStats {
    pub frames_processed: u64,
}

/// Drive the live loop until the flag clears or the feed ends.
///
/// Takes the camera by value: the device is released when this returns, on
/// every exit path. The run flag is owned by the presentation layer (button
/// handlers, Ctrl-C) and only read here.
pub fn run_live(
    mut source: CameraSource,
    processor: &mut FrameProcessor,
    display: &mut dyn FrameDisplay,
    run_flag: &AtomicBool,
) -> Result<LiveStats> {
    let mut stats = LiveStats::default();
    let mut last_health_log = Instant::now();

    while run_flag.load(Ordering::SeqCst) {
        let Some(frame) = source.next_frame()? else {
            log::info!("camera feed ended");
            break;
        };

        let processed = processor.process(&frame)?;
        display.show(&processed.annotated, &processed.labels)?;
        stats.frames_processed += 1;

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let camera_stats = source.stats();
            log::info!(
                "camera health={} frames={} device={}",
                source.is_healthy(),
                camera_stats.frames_captured,
                camera_stats.device
            );
            last_health_log = Instant::now();
        }
    }

    log::info!("live loop stopped after {} frames", stats.frames_processed);
    Ok(stats)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::ingest::CameraConfig;
    use std::sync::Arc;

    struct StopAfterFirst {
        flag: Arc<AtomicBool>,
        shown: u64,
    }

    impl FrameDisplay for StopAfterFirst {
        fn show(&mut self, _frame: &Frame, _labels: &[String]) -> Result<()> {
            self.shown += 1;
            // Simulates the stop button firing after the first frame renders.
            self.flag.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn stub_camera() -> CameraSource {
        let config = CameraConfig {
            device: "stub://camera".to_string(),
            target_fps: 10,
            width: 32,
            height: 32,
        };
        let mut source = CameraSource::new(config).unwrap();
        source.connect().unwrap();
        source
    }

    #[test]
    fn flag_cleared_after_first_iteration_processes_exactly_one_frame() -> Result<()> {
        let flag = Arc::new(AtomicBool::new(true));
        let mut display = StopAfterFirst {
            flag: flag.clone(),
            shown: 0,
        };
        let mut processor = FrameProcessor::new(StubBackend::new());

        let stats = run_live(stub_camera(), &mut processor, &mut display, &flag)?;

        assert_eq!(stats.frames_processed, 1);
        assert_eq!(display.shown, 1);
        Ok(())
    }

    #[test]
    fn flag_false_at_entry_processes_nothing() -> Result<()> {
        let flag = AtomicBool::new(false);
        let mut display = StopAfterFirst {
            flag: Arc::new(AtomicBool::new(false)),
            shown: 0,
        };
        let mut processor = FrameProcessor::new(StubBackend::new());

        let stats = run_live(stub_camera(), &mut processor, &mut display, &flag)?;

        assert_eq!(stats.frames_processed, 0);
        assert_eq!(display.shown, 0);
        Ok(())
    }
}
