use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use ridewatch::annotate::FrameAnnotator;
use ridewatch::detect::StubBackend;
use ridewatch::transport::LogSink;
use ridewatch::{
    ApiConfig, ApiHandle, ApiServer, CropStore, PipelineRuntime, PipelineSettings,
    SessionRegistry, SessionState, ViolationNotifier,
};

struct TestApi {
    dir: tempfile::TempDir,
    sessions: Arc<SessionRegistry>,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(target_fps: u32) -> Result<Self> {
        let dir = tempdir()?;
        let runtime = PipelineRuntime {
            settings: PipelineSettings {
                frame_width: 64,
                frame_height: 48,
                target_fps,
                queue_capacity: 4,
                poll_timeout: Duration::from_millis(20),
                ..PipelineSettings::default()
            },
            detector: Arc::new(StubBackend::new()),
            annotator: FrameAnnotator::default(),
            crops: CropStore::open(dir.path().join("detections"))?,
            notifier: Arc::new(ViolationNotifier::spawn(Arc::new(LogSink), 1, 8)?),
        };
        let sessions = Arc::new(SessionRegistry::new(runtime));
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            video_root: Some(dir.path().to_path_buf()),
        };
        let api_handle = ApiServer::new(api_config, Arc::clone(&sessions)).spawn()?;
        Ok(Self {
            dir,
            sessions,
            api_handle: Some(api_handle),
        })
    }

    fn addr(&self) -> SocketAddr {
        self.api_handle.as_ref().map(|h| h.addr).unwrap()
    }

    fn request(&self, method: &str, path: &str, body: Option<&str>) -> Result<(u16, String, Vec<u8>)> {
        let mut stream = TcpStream::connect(self.addr())?;
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        let body = body.unwrap_or("");
        let request = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes())?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        let split = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response headers");
        let headers = String::from_utf8_lossy(&response[..split]).into_owned();
        let status = headers
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("status code");
        Ok((status, headers, response[split + 4..].to_vec()))
    }

    fn json(&self, method: &str, path: &str, body: Option<&str>) -> Result<(u16, Value)> {
        let (status, _, body) = self.request(method, path, body)?;
        Ok((status, serde_json::from_slice(&body)?))
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        self.sessions.stop_all();
        if let Some(handle) = self.api_handle.take() {
            let _ = handle.stop();
        }
    }
}

#[test]
fn health_reports_ok() -> Result<()> {
    let api = TestApi::new(0)?;
    let (status, body) = api.json("GET", "/health", None)?;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[test]
fn unknown_routes_and_methods_are_rejected() -> Result<()> {
    let api = TestApi::new(0)?;
    assert_eq!(api.json("GET", "/nope", None)?.0, 404);
    assert_eq!(api.json("PUT", "/health", None)?.0, 405);
    assert_eq!(api.json("GET", "/stop", None)?.0, 405);
    Ok(())
}

#[test]
fn confidence_for_unknown_name_is_zero() -> Result<()> {
    let api = TestApi::new(0)?;
    let (status, body) = api.json("GET", "/confidence/never_seen.mp4", None)?;
    assert_eq!(status, 200);
    for key in ["confidence", "motorcycle_conf", "no_helmet_conf", "plate_conf"] {
        assert_eq!(body[key].as_f64(), Some(0.0), "{key}");
    }
    Ok(())
}

#[test]
fn stop_validates_filename() -> Result<()> {
    let api = TestApi::new(0)?;
    assert_eq!(api.json("POST", "/stop", Some("{}"))?.0, 400);
    assert_eq!(api.json("POST", "/stop", None)?.0, 400);
    let (status, _) = api.json("POST", "/stop", Some(r#"{"filename":"ghost"}"#))?;
    assert_eq!(status, 404);
    Ok(())
}

#[test]
fn process_rejects_missing_video() -> Result<()> {
    let api = TestApi::new(0)?;
    let (status, body) = api.json(
        "POST",
        "/process",
        Some(r#"{"video_path":"missing.mp4","filename":"missing.mp4"}"#),
    )?;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap_or_default().contains("missing.mp4"));

    let (status, _, _) = api.request("GET", "/process?filename=x", None)?;
    assert_eq!(status, 400);
    assert!(api.sessions.summaries().is_empty());
    Ok(())
}

#[test]
fn post_process_starts_then_reuses_then_stops() -> Result<()> {
    let api = TestApi::new(50)?;
    let body = r#"{"video_path":"stub://ride?frames=100000&width=64&height=48","filename":"ride.mp4"}"#;

    let (status, started) = api.json("POST", "/process", Some(body))?;
    assert_eq!(status, 200);
    assert_eq!(started["status"], "started");
    let (_, reused) = api.json("POST", "/process", Some(body))?;
    assert_eq!(reused["status"], "reused");

    let (status, listing) = api.json("GET", "/sessions", None)?;
    assert_eq!(status, 200);
    assert_eq!(listing["sessions"][0]["video_id"], "ride.mp4");

    let (status, stopped) = api.json("POST", "/stop", Some(r#"{"filename":"ride.mp4"}"#))?;
    assert_eq!(status, 200);
    assert_eq!(stopped["success"], true);

    let session = api.sessions.get("ride.mp4").expect("session registered");
    assert!(session.wait_until_stopped(Duration::from_secs(10)));
    assert_eq!(session.state(), SessionState::Stopped);
    Ok(())
}

#[test]
fn get_process_streams_multipart_jpeg_until_video_ends() -> Result<()> {
    let api = TestApi::new(0)?;
    let (status, headers, body) = api.request(
        "GET",
        "/process?video_path=stub%3A%2F%2Fclip%3Fframes%3D3%26width%3D64%26height%3D48&filename=clip",
        None,
    )?;
    assert_eq!(status, 200);
    assert!(headers.contains("multipart/x-mixed-replace; boundary=frame"));

    let text = String::from_utf8_lossy(&body);
    assert_eq!(text.matches("--frame\r\n").count(), 3);
    assert_eq!(text.matches("Content-Type: image/jpeg").count(), 3);

    let session = api.sessions.get("clip").expect("session registered");
    assert_eq!(session.state(), SessionState::Stopped);
    Ok(())
}

#[test]
fn relative_paths_resolve_against_video_root() -> Result<()> {
    let api = TestApi::new(0)?;
    std::fs::write(api.dir.path().join("present.mp4"), b"placeholder")?;
    let (status, body) = api.json(
        "POST",
        "/process",
        Some(r#"{"video_path":"present.mp4"}"#),
    )?;
    // The file exists, so the request passes validation; decoding it needs the
    // ffmpeg feature and the placeholder bytes are not a real video either way.
    assert_eq!(status, 500, "{body}");
    Ok(())
}

#[test]
fn delete_session_removes_it() -> Result<()> {
    let api = TestApi::new(50)?;
    assert_eq!(api.json("DELETE", "/sessions/ghost", None)?.0, 404);

    let body = r#"{"video_path":"stub://gone?frames=100000&width=64&height=48","filename":"gone"}"#;
    assert_eq!(api.json("POST", "/process", Some(body))?.0, 200);
    let session = api.sessions.get("gone").expect("session registered");

    let (status, _) = api.json("DELETE", "/sessions/gone", None)?;
    assert_eq!(status, 200);
    assert!(api.sessions.get("gone").is_none());
    assert!(session.wait_until_stopped(Duration::from_secs(10)));
    Ok(())
}

#[test]
fn path_segments_keep_plus_signs() -> Result<()> {
    let api = TestApi::new(50)?;
    let body = r#"{"video_path":"stub://plus?frames=100000&width=64&height=48","filename":"a+b.mp4"}"#;
    assert_eq!(api.json("POST", "/process", Some(body))?.0, 200);
    let session = api.sessions.get("a+b.mp4").expect("session registered");

    assert_eq!(api.json("DELETE", "/sessions/a%20b.mp4", None)?.0, 404);
    assert_eq!(api.json("DELETE", "/sessions/a+b.mp4", None)?.0, 200);
    assert!(session.wait_until_stopped(Duration::from_secs(10)));
    Ok(())
}
