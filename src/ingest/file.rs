//! Local file frame source.
//!
//! `FileSource` opens either a real video file (ffmpeg backend) or a synthetic
//! clip addressed as `stub://name?frames=N&width=W&height=H&fail_at=K`. The
//! synthetic backend produces a moving gradient and, when `fail_at` is set,
//! reports a decode error at that frame index. `open_delay_ms=D` makes the open
//! itself take `D` milliseconds, standing in for a slow container probe.
//!
//! Only local paths are accepted; any other URL scheme is rejected up front.

use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Duration;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::FrameSource;
use crate::frame::Frame;

const STUB_SCHEME: &str = "stub://";
const DEFAULT_STUB_FRAMES: u64 = 90;
const DEFAULT_STUB_WIDTH: u32 = 320;
const DEFAULT_STUB_HEIGHT: u32 = 240;

/// Local file frame source.
pub struct FileSource {
    path: String,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Open `path` for decoding. Fails when the file is missing, unreadable,
    /// or has no video track.
    pub fn open(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        let backend = if path.starts_with(STUB_SCHEME) {
            let source = SyntheticFileSource::parse(path)?;
            if !source.open_delay.is_zero() {
                std::thread::sleep(source.open_delay);
            }
            FileBackend::Synthetic(source)
        } else {
            if !Path::new(path).is_file() {
                return Err(anyhow!("video file not found: {}", path));
            }
            open_decoder(path)?
        };
        log::info!("FileSource: opened {}", path);
        Ok(Self {
            path: path.to_string(),
            backend,
        })
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_decoder(path: &str) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(FfmpegFileSource::open(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_decoder(path: &str) -> Result<FileBackend> {
    Err(anyhow!(
        "decoding {} requires the ingest-file-ffmpeg feature",
        path
    ))
}

impl FrameSource for FileSource {
    fn describe(&self) -> &str {
        &self.path
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }
}

/// Whether `path` names something `FileSource::open` could try to decode.
pub fn is_available(path: &str) -> bool {
    if path.starts_with(STUB_SCHEME) {
        return SyntheticFileSource::parse(path).is_ok();
    }
    is_local_file_path(path) && Path::new(path).is_file()
}

/// Resolve a requested video path against an optional root directory.
///
/// Synthetic clips and absolute paths pass through unchanged.
pub fn resolve_source(root: Option<&Path>, requested: &str) -> String {
    if requested.starts_with(STUB_SCHEME) || Path::new(requested).is_absolute() {
        return requested.to_string();
    }
    match root {
        Some(root) => root.join(requested).to_string_lossy().into_owned(),
        None => requested.to_string(),
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct SyntheticFileSource {
    frames: u64,
    width: u32,
    height: u32,
    fail_at: Option<u64>,
    open_delay: Duration,
    next_index: u64,
}

impl SyntheticFileSource {
    fn parse(path: &str) -> Result<Self> {
        let url = url::Url::parse(path).map_err(|e| anyhow!("invalid stub source {}: {}", path, e))?;
        let mut source = Self {
            frames: DEFAULT_STUB_FRAMES,
            width: DEFAULT_STUB_WIDTH,
            height: DEFAULT_STUB_HEIGHT,
            fail_at: None,
            open_delay: Duration::ZERO,
            next_index: 0,
        };
        for (key, value) in url.query_pairs() {
            let parsed: u64 = value
                .parse()
                .map_err(|_| anyhow!("stub source parameter {} must be an integer", key))?;
            match &*key {
                "frames" => source.frames = parsed,
                "width" => source.width = dimension(&key, parsed)?,
                "height" => source.height = dimension(&key, parsed)?,
                "fail_at" => source.fail_at = Some(parsed),
                "open_delay_ms" => source.open_delay = Duration::from_millis(parsed),
                other => return Err(anyhow!("unknown stub source parameter {}", other)),
            }
        }
        Ok(source)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let index = self.next_index;
        if self.fail_at == Some(index) {
            return Err(anyhow!("synthetic decode failure at frame {}", index));
        }
        if index >= self.frames {
            return Ok(None);
        }
        self.next_index += 1;
        let shift = (index % 256) as u32;
        let image = image::RgbImage::from_fn(self.width, self.height, |x, y| {
            image::Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                (index % 256) as u8,
            ])
        });
        Ok(Some(Frame::new(index, image)))
    }
}

fn dimension(key: &str, value: u64) -> Result<u32> {
    match u32::try_from(value) {
        Ok(v) if v > 0 && v <= 8192 => Ok(v),
        _ => Err(anyhow!("stub source {} must be within 1..=8192", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut FileSource) -> Vec<u64> {
        let mut seen = Vec::new();
        while let Some(frame) = source.next_frame().expect("decode") {
            seen.push(frame.index);
        }
        seen
    }

    #[test]
    fn stub_clip_yields_requested_frames_then_ends() {
        let mut source = FileSource::open("stub://clip?frames=3&width=8&height=6").unwrap();
        assert_eq!(drain(&mut source), vec![0, 1, 2]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn stub_clip_uses_requested_size() {
        let mut source = FileSource::open("stub://clip?frames=1&width=8&height=6").unwrap();
        let frame = source.next_frame().unwrap().expect("frame");
        assert_eq!((frame.width(), frame.height()), (8, 6));
    }

    #[test]
    fn stub_clip_fails_at_requested_index() {
        let mut source = FileSource::open("stub://clip?frames=5&width=4&height=4&fail_at=2").unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn stub_open_delay_holds_the_open() {
        let start = std::time::Instant::now();
        FileSource::open("stub://clip?frames=1&open_delay_ms=40").unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(is_available("stub://clip?open_delay_ms=40"));
    }

    #[test]
    fn rejects_remote_and_missing_sources() {
        assert!(FileSource::open("rtsp://camera/stream").is_err());
        assert!(FileSource::open("").is_err());
        assert!(FileSource::open("/definitely/not/here.mp4").is_err());
        assert!(FileSource::open("stub://clip?colour=red").is_err());
    }

    #[test]
    fn availability_checks_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("ride.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        assert!(is_available(video.to_str().unwrap()));
        assert!(!is_available(dir.path().join("other.mp4").to_str().unwrap()));
        assert!(is_available("stub://clip?frames=2"));
        assert!(!is_available("stub://clip?frames=many"));
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let root = Path::new("/srv/videos");
        assert_eq!(resolve_source(Some(root), "a.mp4"), "/srv/videos/a.mp4");
        assert_eq!(resolve_source(Some(root), "/tmp/b.mp4"), "/tmp/b.mp4");
        assert_eq!(resolve_source(Some(root), "stub://c"), "stub://c");
        assert_eq!(resolve_source(None, "a.mp4"), "a.mp4");
    }
}
