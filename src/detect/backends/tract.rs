#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::Predictor;
use crate::detect::result::{BoundingBox, Instance, Mask};
use crate::frame::Frame;

/// Mask probabilities at or above this become foreground.
const MASK_THRESHOLD: f32 = 0.5;

/// Tract-based ONNX instance segmentation.
///
/// Expects a Mask R-CNN style export: one `[1, 3, H, W]` float RGB input in
/// `0..1`, and outputs `boxes [N, 4]`, `labels [N]`, `scores [N]`, plus an
/// optional `masks [N, 1, H, W]`. The model is loaded once and reused.
pub struct TractPredictor {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    score_threshold: f32,
}

impl TractPredictor {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                f32::fact([1, 3, height as usize, width as usize]).into(),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "tract: loaded {} for {}x{} input",
            model_path.display(),
            width,
            height
        );

        Ok(Self {
            model,
            width,
            height,
            score_threshold: 0.7,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }
        if frame.channels != 3 {
            return Err(anyhow!("expected 3-channel frame, got {}", frame.channels));
        }

        let pixels = frame.pixels();
        let width = frame.width as usize;
        // Frame is BGR, the model wants RGB planes.
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, frame.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + (2 - channel);
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode_outputs(&self, outputs: TVec<TValue>) -> Result<Vec<Instance>> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "model produced {} outputs, expected boxes/labels/scores",
                outputs.len()
            ));
        }
        let boxes = outputs[0]
            .to_array_view::<f32>()
            .context("boxes output was not f32")?;
        let labels = outputs[1]
            .cast_to::<i64>()
            .context("labels output is not integral")?;
        let labels = labels.as_slice::<i64>()?;
        let scores = outputs[2]
            .to_array_view::<f32>()
            .context("scores output was not f32")?;
        let masks = match outputs.get(3) {
            Some(masks) => Some(
                masks
                    .to_array_view::<f32>()
                    .context("masks output was not f32")?,
            ),
            None => None,
        };

        let n = scores.len();
        if boxes.len() != n * 4 || labels.len() != n {
            return Err(anyhow!(
                "inconsistent output sizes: {} boxes values, {} labels, {} scores",
                boxes.len(),
                labels.len(),
                n
            ));
        }
        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        let plane = self.width as usize * self.height as usize;

        let mut instances = Vec::new();
        for i in 0..n {
            if scores[i] < self.score_threshold {
                continue;
            }
            let class_id = usize::try_from(labels[i])
                .map_err(|_| anyhow!("negative class label {}", labels[i]))?;
            let b = &boxes[i * 4..i * 4 + 4];
            let bbox = BoundingBox::new(b[0], b[1], b[2], b[3]).clamp(self.width, self.height);
            let mut instance = Instance::new(class_id, bbox, scores[i]);
            if let Some(masks) = &masks {
                let flat: Vec<bool> = masks
                    .iter()
                    .skip(i * plane)
                    .take(plane)
                    .map(|&p| p >= MASK_THRESHOLD)
                    .collect();
                instance = instance.with_mask(Mask::new(self.width, self.height, flat)?);
            }
            instances.push(instance);
        }

        instances.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(instances)
    }
}

impl Predictor for TractPredictor {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn predict(&mut self, frame: &Frame) -> Result<Vec<Instance>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_outputs(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::zeroed(self.width, self.height, 3);
        self.predict(&blank).map(|_| ())
    }
}
