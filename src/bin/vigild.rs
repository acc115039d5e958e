//! vigild - Vigil dashboard daemon
//!
//! This daemon:
//! 1. Serves the dashboard HTTP API (status, alerts, latest frame, run flag)
//! 2. Waits for the dashboard (or env defaults) to set the live run flag
//! 3. Drives the live feed loop: camera -> detector -> annotated frame
//! 4. Publishes each annotated frame to the dashboard's latest-frame slot
//! 5. Stops cleanly on Ctrl-C, releasing the camera and the API thread

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use vigil_pipeline::config::VigildConfig;
use vigil_pipeline::detect::labels::PERSON_CLASS_ID;
use vigil_pipeline::{
    run_live, ApiConfig, ApiServer, BackendRegistry, CameraConfig, CameraSource, Dashboard,
    FrameProcessor, StubBackend,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = VigildConfig::load()?;

    let dashboard = Dashboard::new();
    let run_flag = dashboard.run_flag();

    let api_config = ApiConfig {
        addr: cfg.api_addr.clone(),
        token_path: cfg.api_token_path.clone(),
    };
    let api_handle = ApiServer::new(api_config, dashboard.clone()).spawn()?;
    log::info!("dashboard api listening on {}", api_handle.addr);
    if let Some(path) = &api_handle.token_path {
        log::info!("dashboard capability token written to {}", path.display());
    } else {
        log::warn!(
            "dashboard capability token (handle securely): {}",
            api_handle.token
        );
    }

    let mut processor = build_processor(&cfg)?;

    // Ctrl-C ends the daemon: clear the run flag so the live loop exits its
    // current iteration, then let the outer loop observe shutdown.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let run_flag = run_flag.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
            run_flag.store(false, Ordering::SeqCst);
        })?;
    }

    log::info!(
        "vigild running. camera={} backend={}",
        cfg.camera.device,
        cfg.detector.backend
    );

    while !shutdown.load(Ordering::SeqCst) {
        if !run_flag.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
            continue;
        }

        match start_live_session(&cfg, &mut processor, &dashboard, &run_flag) {
            Ok(stats) => {
                log::info!("live session ended after {} frames", stats.frames_processed);
            }
            Err(err) => {
                log::error!("live session failed: {err:#}");
                dashboard.record_error(format!("live feed stopped: {err}"));
                run_flag.store(false, Ordering::SeqCst);
            }
        }
    }

    api_handle.stop()?;
    log::info!("vigild stopped");
    Ok(())
}

fn start_live_session(
    cfg: &VigildConfig,
    processor: &mut FrameProcessor,
    dashboard: &Dashboard,
    run_flag: &AtomicBool,
) -> Result<vigil_pipeline::LiveStats> {
    let camera_config = CameraConfig {
        device: cfg.camera.device.clone(),
        target_fps: cfg.camera.target_fps,
        width: cfg.camera.width,
        height: cfg.camera.height,
    };
    let mut camera = CameraSource::new(camera_config)?;
    camera.connect()?;

    let mut display = dashboard.clone();
    run_live(camera, processor, &mut display, run_flag)
}

fn build_processor(cfg: &VigildConfig) -> Result<FrameProcessor> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new().with_motion_class(PERSON_CLASS_ID));

    #[cfg(feature = "backend-tract")]
    if cfg.detector.backend == "tract" {
        let model_path = cfg
            .detector
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("tract backend requires detector.model_path"))?;
        let backend =
            vigil_pipeline::TractBackend::new(model_path, cfg.camera.width, cfg.camera.height)?
                .with_threshold(cfg.detector.confidence);
        registry.register(backend);
    }

    registry.set_default(&cfg.detector.backend)?;
    let backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    FrameProcessor::from_shared(backend)
}
