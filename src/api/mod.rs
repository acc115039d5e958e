//! Dashboard HTTP surface.
//!
//! The browser dashboard is an external collaborator; this module is the
//! minimal local API it talks to. A background thread serves:
//!
//! - `GET  /health`      liveness probe (no token)
//! - `GET  /status`      run flag, frame counters, latest labels
//! - `GET  /alerts`      alert strings from the last batch run
//! - `GET  /frame.jpg`   latest annotated frame as JPEG
//! - `POST /live/start`  set the live run flag
//! - `POST /live/stop`   clear the live run flag
//!
//! Every request except `/health` presents the per-process capability token
//! as a bearer header. The server binds loopback and stops via an atomic
//! shutdown flag.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::RngCore;
use serde::Serialize;

use crate::frame::Frame;
use crate::live::FrameDisplay;
use crate::pipeline::PipelineReport;

const MAX_REQUEST_BYTES: usize = 8192;
const JPEG_QUALITY: u8 = 80;

/// Shared state between the pipelines and the API thread.
#[derive(Default)]
struct DashboardState {
    latest_jpeg: Option<Vec<u8>>,
    latest_labels: Vec<String>,
    live_frames: u64,
    alerts: Vec<String>,
    output_path: Option<String>,
    last_error: Option<String>,
}

/// Handle to the dashboard state plus the live run flag.
///
/// The run flag is the explicit process-wide live-mode state: initialized
/// here, mutated only by the start/stop handlers (and Ctrl-C), read once per
/// live-loop iteration.
#[derive(Clone)]
pub struct Dashboard {
    state: Arc<Mutex<DashboardState>>,
    run_flag: Arc<AtomicBool>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DashboardState::default())),
            run_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn run_flag(&self) -> Arc<AtomicBool> {
        self.run_flag.clone()
    }

    /// Publish a finished batch run.
    pub fn record_report(&self, report: &PipelineReport) {
        if let Ok(mut state) = self.state.lock() {
            state.alerts = report.alerts.clone();
            state.output_path = Some(report.output_path.clone());
            state.last_error = None;
        }
    }

    /// Publish a one-line failure summary.
    pub fn record_error(&self, message: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.last_error = Some(message.into());
        }
    }

    fn status(&self) -> Result<StatusPayload> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("dashboard lock poisoned"))?;
        Ok(StatusPayload {
            live_running: self.run_flag.load(Ordering::SeqCst),
            live_frames: state.live_frames,
            latest_labels: state.latest_labels.clone(),
            output_path: state.output_path.clone(),
            last_error: state.last_error.clone(),
        })
    }

    fn alerts(&self) -> Result<Vec<String>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("dashboard lock poisoned"))?;
        Ok(state.alerts.clone())
    }

    fn latest_jpeg(&self) -> Result<Option<Vec<u8>>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("dashboard lock poisoned"))?;
        Ok(state.latest_jpeg.clone())
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDisplay for Dashboard {
    /// The live loop's display surface: encode and publish the latest frame.
    fn show(&mut self, frame: &Frame, labels: &[String]) -> Result<()> {
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode(
            frame.pixels(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgb8,
        )?;

        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("dashboard lock poisoned"))?;
        state.latest_jpeg = Some(jpeg);
        state.latest_labels = labels.to_vec();
        state.live_frames += 1;
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusPayload {
    live_running: bool,
    live_frames: u64,
    latest_labels: Vec<String>,
    output_path: Option<String>,
    last_error: Option<String>,
}

/// API server configuration.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub token_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8790".to_string(),
            token_path: None,
        }
    }
}

/// Running API server handle.
#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    pub token: String,
    pub token_path: Option<PathBuf>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    dashboard: Dashboard,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, dashboard: Dashboard) -> Self {
        Self { cfg, dashboard }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let token = generate_token();
        if let Some(path) = &self.cfg.token_path {
            write_token_file(path, &token)?;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let dashboard = self.dashboard.clone();
        let expected_token = token.clone();
        let token_path = self.cfg.token_path.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, dashboard, &expected_token, shutdown_thread) {
                log::error!("dashboard api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            token,
            token_path,
            shutdown,
            join: Some(join),
        })
    }
}

fn generate_token() -> String {
    let mut token = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut token);
    hex::encode(token)
}

fn run_api(
    listener: TcpListener,
    dashboard: Dashboard,
    expected_token: &str,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &dashboard, expected_token) {
                    log::warn!("dashboard api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    dashboard: &Dashboard,
    expected_token: &str,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;

    if request.method == "GET" && request.path == "/health" {
        write_json_response(&mut stream, 200, r#"{"status":"ok"}"#)?;
        return Ok(());
    }

    if request.has_query_token() {
        write_json_response(
            &mut stream,
            400,
            r#"{"error":"token_query_param_not_allowed"}"#,
        )?;
        return Ok(());
    }

    let token = match request.bearer_token() {
        Some(token) => token,
        None => {
            write_json_response(&mut stream, 401, r#"{"error":"missing_token"}"#)?;
            return Ok(());
        }
    };
    if token != expected_token {
        write_json_response(&mut stream, 401, r#"{"error":"invalid_token"}"#)?;
        return Err(anyhow!("capability token invalid"));
    }

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/status") => {
            let payload = serde_json::to_vec(&dashboard.status()?)?;
            write_response(&mut stream, 200, "application/json", &payload)?;
        }
        ("GET", "/alerts") => {
            let payload = serde_json::to_vec(&dashboard.alerts()?)?;
            write_response(&mut stream, 200, "application/json", &payload)?;
        }
        ("GET", "/frame.jpg") => match dashboard.latest_jpeg()? {
            Some(jpeg) => write_response(&mut stream, 200, "image/jpeg", &jpeg)?,
            None => write_json_response(&mut stream, 404, r#"{"error":"no_frame"}"#)?,
        },
        ("POST", "/live/start") => {
            dashboard.run_flag.store(true, Ordering::SeqCst);
            log::info!("live run flag set by dashboard");
            write_json_response(&mut stream, 200, r#"{"live_running":true}"#)?;
        }
        ("POST", "/live/stop") => {
            dashboard.run_flag.store(false, Ordering::SeqCst);
            log::info!("live run flag cleared by dashboard");
            write_json_response(&mut stream, 200, r#"{"live_running":false}"#)?;
        }
        _ => {
            write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)?;
        }
    }
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        raw_path: raw_path.to_string(),
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        401 => "HTTP/1.1 401 Unauthorized",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    raw_path: String,
}

impl HttpRequest {
    fn bearer_token(&self) -> Option<String> {
        if let Some(value) = self.headers.get("authorization") {
            let parts: Vec<&str> = value.split_whitespace().collect();
            if parts.len() == 2 && parts[0].eq_ignore_ascii_case("bearer") {
                return Some(parts[1].to_string());
            }
        }
        None
    }

    fn has_query_token(&self) -> bool {
        if let Some(query) = self.raw_path.split('?').nth(1) {
            for pair in query.split('&') {
                if let Some((k, _)) = pair.split_once('=') {
                    if k == "token" {
                        return true;
                    }
                }
            }
        }
        false
    }
}

fn write_token_file(path: &Path, token: &str) -> Result<()> {
    std::fs::write(path, format!("{token}\n"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}
