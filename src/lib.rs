//! Ridewatch: helmet-violation detection over recorded traffic video.
//!
//! Each video is processed by a session that decodes frames, runs an object
//! detector, and flags frames where a motorcycle, a rider without a helmet and
//! a license plate are all visible. Flagged frames produce evidence crops and a
//! report to a downstream processor. Annotated frames are streamed live to
//! viewers over HTTP as MJPEG.
//!
//! # Module Structure
//!
//! - `config`: daemon configuration (file + environment)
//! - `frame`, `ingest`: decoded frames and the sources that produce them
//! - `detect`: detector backends and detection types
//! - `violation`: per-frame rule evaluation and confidence snapshots
//! - `annotate`: preview overlays
//! - `stream`: bounded per-session frame queue and viewer iterator
//! - `session`: session lifecycle, registry and the producer loop
//! - `storage`: violation crop files
//! - `transport`: violation reports and their delivery
//! - `api`: HTTP control and streaming surface

pub mod annotate;
pub mod api;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod session;
pub mod storage;
pub mod stream;
pub mod transport;
pub mod violation;

pub use api::{ApiConfig, ApiHandle, ApiServer};
pub use config::{DaemonConfig, DetectorSettings, NotifierSettings, PipelineSettings};
pub use detect::{BoundingBox, Detection, DetectorBackend, ObjectClass};
pub use frame::Frame;
pub use ingest::{FileSource, FrameSource};
pub use session::{
    PipelineRuntime, Session, SessionRegistry, SessionState, SessionSummary, StartOutcome,
    StopOutcome,
};
pub use storage::CropStore;
pub use stream::{FrameStream, StreamQueue};
pub use transport::{ViolationNotifier, ViolationReport, ViolationSink};
pub use violation::{evaluate, ConfidenceSnapshot, ViolationCandidate};
