use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detection engine seam.
///
/// The pipeline treats the model as opaque: a frame goes in, a list of
/// detections in working-frame pixel coordinates comes out. One backend
/// instance is shared by every session, so implementations must be `Sync`
/// and take `&self`.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one frame.
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    /// Release transient accelerator caches. Called periodically by producers.
    fn release_caches(&self) {}
}
