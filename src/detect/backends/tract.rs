#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{decode_yolo, DecodeParams};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Tract-based backend for YOLO-style ONNX helmet models.
///
/// Frames are stretched to a square `input_size` input; boxes are mapped back
/// to working-frame pixels before NMS.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.6,
            iou_threshold: 0.5,
            max_detections: 10,
        })
    }

    /// Override the default post-processing thresholds.
    pub fn with_thresholds(mut self, confidence: f32, iou: f32, max_detections: usize) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self.max_detections = max_detections;
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let side = self.input_size;
        let resized = imageops::resize(frame.image(), side, side, FilterType::Triangle);
        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let (channels, anchors) = match shape.as_slice() {
            [1, c, n] => (*c, *n),
            other => return Err(anyhow!("unexpected model output shape {:?}", other)),
        };
        let flat: Vec<f32> = view.iter().copied().collect();
        let params = DecodeParams {
            confidence: self.confidence_threshold,
            iou: self.iou_threshold,
            max_detections: self.max_detections,
            scale_x: frame.width() as f32 / self.input_size as f32,
            scale_y: frame.height() as f32 / self.input_size as f32,
            frame_width: frame.width(),
            frame_height: frame.height(),
        };
        decode_yolo(&flat, channels, anchors, &params)
    }
}
