use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

type Script = Box<dyn Fn(u64) -> Result<Vec<Detection>> + Send + Sync>;

/// Model-free backend.
///
/// Without a script it reports nothing. `from_fn` scripts the detections per
/// frame index, which is how tests and demos drive the violation path.
pub struct StubBackend {
    script: Option<Script>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { script: None }
    }

    pub fn from_fn<F>(script: F) -> Self
    where
        F: Fn(u64) -> Result<Vec<Detection>> + Send + Sync + 'static,
    {
        Self {
            script: Some(Box::new(script)),
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        match &self.script {
            Some(script) => script(frame.index),
            None => Ok(Vec::new()),
        }
    }
}
