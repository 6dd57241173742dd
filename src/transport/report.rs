use serde::{Deserialize, Serialize};

use crate::storage::{detection_id, CropFiles};
use crate::violation::ConfidenceSnapshot;

/// One violation, as posted to the downstream processor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViolationReport {
    /// `{video_id}_frame{N}`.
    pub id: String,
    /// Session id the violation came from.
    pub filename: String,
    pub frame_number: u64,
    pub motorcycle_image: String,
    pub plate_image: String,
    #[serde(flatten)]
    pub confidence: ConfidenceSnapshot,
}

impl ViolationReport {
    pub fn new(
        video_id: &str,
        frame_number: u64,
        crops: &CropFiles,
        confidence: ConfidenceSnapshot,
    ) -> Self {
        Self {
            id: detection_id(video_id, frame_number),
            filename: video_id.to_string(),
            frame_number,
            motorcycle_image: crops.vehicle.clone(),
            plate_image: crops.plate.clone(),
            confidence,
        }
    }
}
