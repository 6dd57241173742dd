//! Per-session frame delivery.
//!
//! - `StreamQueue`: bounded drop-oldest buffer the producer writes into.
//! - `FrameStream`: a viewer's blocking iterator over that buffer.
//! - `multipart_part`: framing for `multipart/x-mixed-replace` responses.

mod consumer;
mod queue;

pub use consumer::FrameStream;
pub use queue::{StreamQueue, DEFAULT_QUEUE_CAPACITY};

/// Multipart boundary used by the live stream endpoint.
pub const MULTIPART_BOUNDARY: &str = "frame";

/// Content type announced for a live stream response.
pub fn multipart_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", MULTIPART_BOUNDARY)
}

/// Wrap one JPEG payload as a multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        MULTIPART_BOUNDARY,
        jpeg.len()
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_carries_boundary_and_payload() {
        let part = multipart_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let text = String::from_utf8_lossy(&part);
        assert!(text.starts_with("--frame\r\nContent-Type: image/jpeg\r\n"));
        assert!(text.contains("Content-Length: 4\r\n\r\n"));
        assert!(part.ends_with(&[0xFF, 0xD9, b'\r', b'\n']));
    }
}
