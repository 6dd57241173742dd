//! YOLO output decoding and non-maximum suppression.
//!
//! Kept free of any inference runtime so it can be exercised without a model.

use anyhow::{anyhow, Result};

use super::result::{BoundingBox, Detection};

/// Thresholds applied after inference.
#[derive(Clone, Copy, Debug)]
pub struct DecodeParams {
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
    /// Multiply model x coordinates by this to reach working-frame pixels.
    pub scale_x: f32,
    /// Multiply model y coordinates by this to reach working-frame pixels.
    pub scale_y: f32,
    /// Working-frame size; boxes are clamped to it.
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Decode a `[1, 4 + classes, anchors]` YOLO head laid out row-major.
///
/// Each anchor contributes at most one detection: its best-scoring class,
/// when that score reaches `params.confidence` and its box is finite and
/// overlaps the working frame.
pub fn decode_yolo(
    output: &[f32],
    channels: usize,
    anchors: usize,
    params: &DecodeParams,
) -> Result<Vec<Detection>> {
    if channels < 5 {
        return Err(anyhow!(
            "model head has {} channels; expected 4 box channels plus classes",
            channels
        ));
    }
    if output.len() != channels * anchors {
        return Err(anyhow!(
            "model head length {} does not match {}x{}",
            output.len(),
            channels,
            anchors
        ));
    }

    let at = |channel: usize, anchor: usize| output[channel * anchors + anchor];
    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (4..channels)
            .map(|c| (c - 4, at(c, anchor)))
            .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !score.is_finite() || score < params.confidence {
            continue;
        }
        let (cx, cy) = (at(0, anchor), at(1, anchor));
        let (w, h) = (at(2, anchor), at(3, anchor));
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
            continue;
        }
        let Some(bbox) = BoundingBox::from_f32(
            (cx - w / 2.0) * params.scale_x,
            (cy - h / 2.0) * params.scale_y,
            (cx + w / 2.0) * params.scale_x,
            (cy + h / 2.0) * params.scale_y,
        )
        .clamp_to(params.frame_width, params.frame_height) else {
            continue;
        };
        candidates.push(Detection::new(class_id as u32, score, bbox));
    }

    Ok(non_max_suppression(
        candidates,
        params.iou,
        params.max_detections,
    ))
}

/// Class-agnostic greedy NMS. Output is sorted by descending confidence.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(max_detections.min(detections.len()));
    for det in detections {
        if kept.len() >= max_detections {
            break;
        }
        if kept.iter().all(|k| k.bbox.iou(&det.bbox) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}
