use std::sync::Mutex;

use tempfile::NamedTempFile;

use vigil_pipeline::config::VigildConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VIGIL_CONFIG",
        "VIGIL_OUTPUT",
        "VIGIL_CODEC",
        "VIGIL_ALERT_LABEL",
        "VIGIL_API_ADDR",
        "VIGIL_API_TOKEN_PATH",
        "VIGIL_CAMERA",
        "VIGIL_BACKEND",
        "VIGIL_MODEL_PATH",
        "VIGIL_CONFIDENCE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        output = "annotated.mp4"
        codec = "MJPG"
        alert_label = "Person"

        [api]
        addr = "127.0.0.1:9001"

        [camera]
        index = 2
        target_fps = 15
        width = 800
        height = 600

        [detector]
        backend = "tract"
        model_path = "models/yolov8n.onnx"
        confidence = 0.4
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("VIGIL_CONFIG", file.path());
    std::env::set_var("VIGIL_CAMERA", "/dev/video7");
    std::env::set_var("VIGIL_CONFIDENCE", "0.25");

    let cfg = VigildConfig::load().expect("load config");

    assert_eq!(cfg.output, "annotated.mp4");
    // Codec tags and labels are normalized to lowercase.
    assert_eq!(cfg.codec, "mjpg");
    assert_eq!(cfg.alert_label, "person");
    assert_eq!(cfg.api_addr, "127.0.0.1:9001");
    // Env wins over the file's camera index mapping.
    assert_eq!(cfg.camera.device, "/dev/video7");
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.camera.height, 600);
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(cfg.detector.confidence, 0.25);

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = VigildConfig::load().expect("load config");

    assert_eq!(cfg.output, "output.mp4");
    assert_eq!(cfg.codec, "mp4v");
    assert_eq!(cfg.alert_label, "person");
    assert_eq!(cfg.camera.device, "stub://camera");
    assert_eq!(cfg.detector.backend, "stub");

    clear_env();
}

#[test]
fn invalid_codec_tag_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VIGIL_CODEC", "h.264");
    let err = VigildConfig::load().expect_err("codec must be rejected");
    assert!(err.to_string().contains("codec tag"));

    clear_env();
}

#[test]
fn camera_index_in_file_maps_to_device_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"[camera]\nindex = 0\n").expect("write config");
    std::env::set_var("VIGIL_CONFIG", file.path());

    let cfg = VigildConfig::load().expect("load config");
    assert_eq!(cfg.camera.device, "/dev/video0");

    clear_env();
}
