//! Per-frame violation evaluation.
//!
//! A frame is a violation when a motorcycle, a rider without a helmet and a
//! license plate are all detected in that same frame.
//!
//! Classification is a single linear scan that overwrites per category, so when
//! a category appears more than once the LAST detection in list order wins, for
//! both its box and its confidence. This is not a best-confidence pick; the
//! downstream confidence semantics depend on it.

use serde::{Deserialize, Serialize};

use crate::detect::{BoundingBox, Detection, ObjectClass};

/// Per-category confidences and their mean, as reported to callers.
///
/// The mean is always taken over exactly three categories with 0.0 standing
/// in for an absent one, so it is biased low when a category is missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSnapshot {
    #[serde(rename = "confidence")]
    pub mean: f32,
    #[serde(rename = "motorcycle_conf")]
    pub vehicle: f32,
    #[serde(rename = "no_helmet_conf")]
    pub missing_helmet: f32,
    #[serde(rename = "plate_conf")]
    pub plate: f32,
}

impl ConfidenceSnapshot {
    pub fn from_categories(vehicle: f32, missing_helmet: f32, plate: f32) -> Self {
        let vehicle = unit(vehicle);
        let missing_helmet = unit(missing_helmet);
        let plate = unit(plate);
        Self {
            mean: (vehicle + missing_helmet + plate) / 3.0,
            vehicle,
            missing_helmet,
            plate,
        }
    }
}

fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Aggregate of one frame's detections. Lives for one evaluation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViolationCandidate {
    pub vehicle: Option<BoundingBox>,
    pub missing_helmet: bool,
    pub plate: Option<BoundingBox>,
    pub confidence: ConfidenceSnapshot,
}

impl ViolationCandidate {
    /// All three categories present in the same frame.
    pub fn is_violation(&self) -> bool {
        self.vehicle.is_some() && self.missing_helmet && self.plate.is_some()
    }
}

/// Classify one frame's detections.
pub fn evaluate(detections: &[Detection]) -> ViolationCandidate {
    let mut vehicle = None;
    let mut missing_helmet = false;
    let mut plate = None;
    let (mut vehicle_conf, mut helmet_conf, mut plate_conf) = (0.0, 0.0, 0.0);

    for det in detections {
        match det.class {
            ObjectClass::Motorcycle => {
                vehicle = Some(det.bbox);
                vehicle_conf = det.confidence;
            }
            ObjectClass::NoHelmet => {
                missing_helmet = true;
                helmet_conf = det.confidence;
            }
            ObjectClass::LicensePlate => {
                plate = Some(det.bbox);
                plate_conf = det.confidence;
            }
            _ => {}
        }
    }

    ViolationCandidate {
        vehicle,
        missing_helmet,
        plate,
        confidence: ConfidenceSnapshot::from_categories(vehicle_conf, helmet_conf, plate_conf),
    }
}
