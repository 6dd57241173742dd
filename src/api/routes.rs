use anyhow::Result;
use serde_json::json;
use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;

use super::http::{read_request, write_json, write_stream_head, HttpRequest};
use super::ApiConfig;
use crate::ingest;
use crate::session::{Session, SessionRegistry, StartOutcome, StopOutcome};
use crate::storage::resolve_video_id;
use crate::stream::{multipart_content_type, multipart_part, FrameStream};

pub(super) fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    sessions: &SessionRegistry,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json(&mut stream, 403, &json!({"error": "forbidden"}))?;
        return Ok(());
    }

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            write_json(&mut stream, 400, &json!({"error": err.to_string()}))?;
            return Err(err);
        }
    };
    log::debug!("{} {} from {}", request.method, request.path, peer);

    let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();
    match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["health"]) => write_json(&mut stream, 200, &json!({"status": "ok"})),
        ("GET", ["process"]) => stream_process(stream, &request, cfg, sessions),
        ("POST", ["process"]) => start_process(&mut stream, &request, cfg, sessions),
        ("POST", ["stop"]) => stop_process(&mut stream, &request, sessions),
        ("GET", ["confidence", name]) => {
            let name = percent_decode(name);
            let snapshot = match sessions.get(&name) {
                Some(session) => session.confidence(),
                None => sessions.confidence(resolve_video_id(&name)),
            };
            write_json(&mut stream, 200, &serde_json::to_value(snapshot)?)
        }
        ("GET", ["sessions"]) => {
            let body = json!({
                "sessions": sessions.summaries(),
                "notifier": sessions.runtime().notifier.stats(),
            });
            write_json(&mut stream, 200, &body)
        }
        ("DELETE", ["sessions", id]) => {
            let id = percent_decode(id);
            match sessions.remove(&id) {
                Some(_) => write_json(&mut stream, 200, &json!({"success": true})),
                None => write_json(&mut stream, 404, &json!({"error": "session not found"})),
            }
        }
        (_, ["health"] | ["process"] | ["stop"] | ["sessions"] | ["confidence", _] | ["sessions", _]) => {
            write_json(&mut stream, 405, &json!({"error": "method_not_allowed"}))
        }
        _ => write_json(&mut stream, 404, &json!({"error": "not_found"})),
    }
}

/// Path segments keep `+` literal; only `%XX` escapes are decoded.
fn percent_decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

struct ProcessRequest {
    video_path: String,
    filename: String,
}

/// `video_path` is required; `filename` defaults to the path's file name.
fn parse_process_request(
    video_path: Option<&str>,
    filename: Option<&str>,
    cfg: &ApiConfig,
) -> std::result::Result<ProcessRequest, String> {
    let requested = video_path
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| "video_path is required".to_string())?;
    let video_path = ingest::resolve_source(cfg.video_root.as_deref(), requested);
    if !ingest::is_available(&video_path) {
        return Err(format!("video file not found: {}", requested));
    }
    let filename = match filename.map(str::trim).filter(|f| !f.is_empty()) {
        Some(name) => name.to_string(),
        None => std::path::Path::new(requested)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| requested.to_string()),
    };
    Ok(ProcessRequest {
        video_path,
        filename,
    })
}

fn start_session(
    stream: &mut TcpStream,
    request: ProcessRequest,
    sessions: &SessionRegistry,
) -> Result<Option<(Arc<Session>, bool)>> {
    match sessions.start(&request.filename, &request.video_path) {
        Ok(StartOutcome::Started(session)) => Ok(Some((session, true))),
        Ok(StartOutcome::Reused(session)) => Ok(Some((session, false))),
        Err(err) => {
            log::warn!("could not start {}: {:#}", request.filename, err);
            write_json(stream, 500, &json!({"error": format!("{:#}", err)}))?;
            Ok(None)
        }
    }
}

fn stream_process(
    mut stream: TcpStream,
    request: &HttpRequest,
    cfg: &ApiConfig,
    sessions: &SessionRegistry,
) -> Result<()> {
    let parsed = match parse_process_request(
        request.query_param("video_path"),
        request.query_param("filename"),
        cfg,
    ) {
        Ok(parsed) => parsed,
        Err(message) => return write_json(&mut stream, 400, &json!({"error": message})),
    };
    let Some((session, _)) = start_session(&mut stream, parsed, sessions)? else {
        return Ok(());
    };

    write_stream_head(&mut stream, &multipart_content_type())?;
    let frames = FrameStream::new(session, sessions.runtime().settings.poll_timeout);
    for payload in frames {
        let part = multipart_part(&payload);
        if let Err(err) = stream.write_all(&part).and_then(|_| stream.flush()) {
            log::info!("viewer disconnected: {}", err);
            break;
        }
    }
    Ok(())
}

fn start_process(
    stream: &mut TcpStream,
    request: &HttpRequest,
    cfg: &ApiConfig,
    sessions: &SessionRegistry,
) -> Result<()> {
    let body = match request.json_body() {
        Ok(body) => body,
        Err(err) => return write_json(stream, 400, &json!({"error": err.to_string()})),
    };
    let parsed = match parse_process_request(
        body.get("video_path").and_then(|v| v.as_str()),
        body.get("filename").and_then(|v| v.as_str()),
        cfg,
    ) {
        Ok(parsed) => parsed,
        Err(message) => return write_json(stream, 400, &json!({"error": message})),
    };
    let Some((session, started)) = start_session(stream, parsed, sessions)? else {
        return Ok(());
    };
    write_json(
        stream,
        200,
        &json!({
            "success": true,
            "filename": session.id(),
            "status": if started { "started" } else { "reused" },
        }),
    )
}

fn stop_process(stream: &mut TcpStream, request: &HttpRequest, sessions: &SessionRegistry) -> Result<()> {
    let filename = request
        .json_body()
        .ok()
        .and_then(|body| body.get("filename").and_then(|v| v.as_str()).map(str::to_string))
        .filter(|name| !name.trim().is_empty());
    let Some(filename) = filename else {
        return write_json(stream, 400, &json!({"error": "filename is required"}));
    };
    match sessions.stop(&filename) {
        StopOutcome::Requested => write_json(stream, 200, &json!({"success": true})),
        StopOutcome::NotFound => write_json(
            stream,
            404,
            &json!({"error": "no session for this filename"}),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_decode_only_touches_escapes() {
        assert_eq!(percent_decode("a+b.mp4"), "a+b.mp4");
        assert_eq!(percent_decode("a%20b.mp4"), "a b.mp4");
        assert_eq!(percent_decode("ride_frame3_plate.jpg"), "ride_frame3_plate.jpg");
        // invalid UTF-8 after decoding falls back to the raw segment
        assert_eq!(percent_decode("%FF"), "%FF");
    }
}
