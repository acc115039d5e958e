use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::Ordering;

use anyhow::Result;
use serde_json::Value;

use vigil_pipeline::api::{ApiConfig, ApiHandle, ApiServer};
use vigil_pipeline::{Dashboard, Frame, FrameDisplay, PipelineReport};

fn read_response(stream: &mut TcpStream) -> Result<(String, Vec<u8>)> {
    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap_or(response.len());
    let headers = String::from_utf8_lossy(&response[..split]).to_string();
    let body = response[(split + 4).min(response.len())..].to_vec();
    Ok((headers, body))
}

fn get(addr: std::net::SocketAddr, path: &str, token: Option<&str>) -> Result<(String, Vec<u8>)> {
    request(addr, "GET", path, token)
}

fn post(addr: std::net::SocketAddr, path: &str, token: Option<&str>) -> Result<(String, Vec<u8>)> {
    request(addr, "POST", path, token)
}

fn request(
    addr: std::net::SocketAddr,
    method: &str,
    path: &str,
    token: Option<&str>,
) -> Result<(String, Vec<u8>)> {
    let mut stream = TcpStream::connect(addr)?;
    let auth = match token {
        Some(token) => format!("Authorization: Bearer {token}\r\n"),
        None => String::new(),
    };
    let request = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n{auth}\r\n");
    stream.write_all(request.as_bytes())?;
    read_response(&mut stream)
}

struct TestApi {
    dashboard: Dashboard,
    handle: Option<ApiHandle>,
}

impl TestApi {
    fn spawn() -> Result<Self> {
        let dashboard = Dashboard::new();
        let config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            token_path: None,
        };
        let handle = ApiServer::new(config, dashboard.clone()).spawn()?;
        Ok(Self {
            dashboard,
            handle: Some(handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.handle.as_ref().expect("api handle")
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

#[test]
fn health_endpoint_is_public() -> Result<()> {
    let api = TestApi::spawn()?;

    let (headers, body) = get(api.handle().addr, "/health", None)?;
    assert!(headers.contains("200 OK"));
    assert!(String::from_utf8_lossy(&body).contains(r#""status":"ok""#));
    Ok(())
}

#[test]
fn status_requires_the_capability_token() -> Result<()> {
    let api = TestApi::spawn()?;

    let (headers, _) = get(api.handle().addr, "/status", None)?;
    assert!(headers.contains("401 Unauthorized"));

    let (headers, _) = get(api.handle().addr, "/status", Some("deadbeef"))?;
    assert!(headers.contains("401 Unauthorized"));

    let token = api.handle().token.clone();
    let (headers, body) = get(api.handle().addr, "/status", Some(&token))?;
    assert!(headers.contains("200 OK"));

    let value: Value = serde_json::from_slice(&body)?;
    assert_eq!(value["live_running"], Value::Bool(false));
    Ok(())
}

#[test]
fn live_buttons_flip_the_run_flag() -> Result<()> {
    let api = TestApi::spawn()?;
    let token = api.handle().token.clone();
    let run_flag = api.dashboard.run_flag();

    let (headers, _) = post(api.handle().addr, "/live/start", Some(&token))?;
    assert!(headers.contains("200 OK"));
    assert!(run_flag.load(Ordering::SeqCst));

    let (headers, _) = post(api.handle().addr, "/live/stop", Some(&token))?;
    assert!(headers.contains("200 OK"));
    assert!(!run_flag.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn alerts_reflect_the_last_batch_report() -> Result<()> {
    let api = TestApi::spawn()?;
    let token = api.handle().token.clone();

    api.dashboard.record_report(&PipelineReport {
        output_path: "annotated.mp4".to_string(),
        alerts: vec!["Person detected at 0.60 seconds".to_string()],
        frames_processed: 10,
    });

    let (headers, body) = get(api.handle().addr, "/alerts", Some(&token))?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_slice(&body)?;
    assert_eq!(value[0], "Person detected at 0.60 seconds");
    Ok(())
}

#[test]
fn latest_frame_appears_after_a_live_show() -> Result<()> {
    let api = TestApi::spawn()?;
    let token = api.handle().token.clone();

    let (headers, _) = get(api.handle().addr, "/frame.jpg", Some(&token))?;
    assert!(headers.contains("404 Not Found"));

    let frame = Frame::new(vec![128u8; 32 * 24 * 3], 32, 24, 0)?;
    let mut display = api.dashboard.clone();
    display.show(&frame, &["person".to_string()])?;

    let (headers, body) = get(api.handle().addr, "/frame.jpg", Some(&token))?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("image/jpeg"));
    // JPEG SOI marker.
    assert_eq!(&body[..2], &[0xFF, 0xD8]);

    let (_, status_body) = get(api.handle().addr, "/status", Some(&token))?;
    let value: Value = serde_json::from_slice(&status_body)?;
    assert_eq!(value["live_frames"], 1);
    assert_eq!(value["latest_labels"][0], "person");
    Ok(())
}

#[test]
fn token_in_query_string_is_refused() -> Result<()> {
    let api = TestApi::spawn()?;
    let token = api.handle().token.clone();

    let path = format!("/status?token={token}");
    let (headers, _) = get(api.handle().addr, &path, None)?;
    assert!(headers.contains("400 Bad Request"));
    Ok(())
}
