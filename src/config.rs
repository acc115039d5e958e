use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_API_ADDR: &str = "127.0.0.1:8790";
const DEFAULT_OUTPUT_PATH: &str = "output.mp4";
const DEFAULT_CODEC_TAG: &str = "mp4v";
const DEFAULT_ALERT_LABEL: &str = "person";
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_CAMERA_DEVICE: &str = "stub://camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct VigildConfigFile {
    output: Option<String>,
    codec: Option<String>,
    alert_label: Option<String>,
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    token_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    index: Option<u32>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct VigildConfig {
    pub output: String,
    pub codec: String,
    pub alert_label: String,
    pub api_addr: String,
    pub api_token_path: Option<PathBuf>,
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub confidence: f32,
}

impl VigildConfig {
    /// Load configuration: TOML file named by `VIGIL_CONFIG`, then env
    /// overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VIGIL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VigildConfigFile) -> Self {
        let api_addr = file
            .api
            .as_ref()
            .and_then(|api| api.addr.clone())
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let api_token_path = file.api.and_then(|api| api.token_path);

        let camera_file = file.camera.unwrap_or_default();
        let device = camera_file.device.unwrap_or_else(|| match camera_file.index {
            Some(index) => format!("/dev/video{index}"),
            None => DEFAULT_CAMERA_DEVICE.to_string(),
        });
        let camera = CameraSettings {
            device,
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector_file.model_path,
            confidence: detector_file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
        };

        Self {
            output: file.output.unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string()),
            codec: file.codec.unwrap_or_else(|| DEFAULT_CODEC_TAG.to_string()),
            alert_label: file
                .alert_label
                .unwrap_or_else(|| DEFAULT_ALERT_LABEL.to_string()),
            api_addr,
            api_token_path,
            camera,
            detector,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(output) = std::env::var("VIGIL_OUTPUT") {
            if !output.trim().is_empty() {
                self.output = output;
            }
        }
        if let Ok(codec) = std::env::var("VIGIL_CODEC") {
            if !codec.trim().is_empty() {
                self.codec = codec;
            }
        }
        if let Ok(label) = std::env::var("VIGIL_ALERT_LABEL") {
            if !label.trim().is_empty() {
                self.alert_label = label;
            }
        }
        if let Ok(addr) = std::env::var("VIGIL_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(path) = std::env::var("VIGIL_API_TOKEN_PATH") {
            if !path.trim().is_empty() {
                self.api_token_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(device) = std::env::var("VIGIL_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(backend) = std::env::var("VIGIL_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend;
            }
        }
        if let Ok(model) = std::env::var("VIGIL_MODEL_PATH") {
            if !model.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(model));
            }
        }
        if let Ok(confidence) = std::env::var("VIGIL_CONFIDENCE") {
            self.detector.confidence = confidence
                .parse()
                .map_err(|_| anyhow!("VIGIL_CONFIDENCE must be a number in 0..=1"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        crate::validate_codec_tag(&self.codec)?;
        self.codec = self.codec.to_lowercase();

        if self.alert_label.trim().is_empty() {
            return Err(anyhow!("alert label must not be empty"));
        }
        self.alert_label = self.alert_label.to_lowercase();

        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(anyhow!("detector confidence must be in 0..=1"));
        }
        if self.output.trim().is_empty() {
            return Err(anyhow!("output path must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<VigildConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
