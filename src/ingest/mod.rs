//! Frame ingestion sources.
//!
//! Sessions pull decoded frames from a `FrameSource`. Two backends exist:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` clips for tests and demos
//!
//! Sources only decode. Pacing, resizing and detection belong to the session
//! producer, and a source is dropped the moment its session ends so the decoder
//! handle is released promptly.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::{is_available, resolve_source, FileSource};

use anyhow::Result;

use crate::frame::Frame;

/// A sequential frame decoder.
///
/// Decoder handles are not required to be `Send`; sessions open their source
/// on the thread that consumes it.
pub trait FrameSource {
    /// Human-readable origin, used in logs.
    fn describe(&self) -> &str;

    /// Decode the next frame.
    ///
    /// `Ok(None)` means the video is exhausted. Errors are decode failures and
    /// end the session.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}
