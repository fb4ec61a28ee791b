#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::RegionClassifier;
use crate::detect::result::Region;
use crate::frame::Frame;

/// Tract-based backend for ONNX person classifiers.
///
/// The model takes a `1x3xHxW` float RGB tensor in 0..1 and emits one person score
/// per candidate region (any output shape; every element is one region). Frames of
/// other sizes are nearest-neighbour resampled to the model input.
/// No network I/O, no disk access beyond model loading.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        frame.validate()?;
        let rgb = frame.to_rgb();
        let (src_w, src_h) = (frame.width() as usize, frame.height() as usize);
        let (dst_w, dst_h) = (self.width as usize, self.height as usize);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, dst_h, dst_w),
            |(_, channel, y, x)| {
                let sy = y * src_h / dst_h;
                let sx = x * src_w / dst_w;
                rgb[(sy * src_w + sx) * 3 + channel] as f32 / 255.0
            },
        );
        Ok(input.into_tensor())
    }

    fn extract_regions(outputs: TVec<TValue>) -> Result<Vec<Region>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok(scores
            .iter()
            .copied()
            .filter(|score| score.is_finite())
            .map(|score| Region::new(score.clamp(0.0, 1.0)))
            .collect())
    }
}

impl RegionClassifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, frame: &Frame) -> Result<Vec<Region>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        Self::extract_regions(outputs)
    }
}
