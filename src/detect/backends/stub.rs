use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::Predictor;
use crate::detect::result::{BoundingBox, Instance, Mask};
use crate::frame::Frame;

/// Classes in the COCO thing catalog.
const DEFAULT_NUM_CLASSES: usize = 80;
/// Bytes of digest consumed per synthesized instance.
const BYTES_PER_INSTANCE: usize = 7;

/// Deterministic stand-in for a real model.
///
/// Instances are derived from a SHA-256 digest of the pixels, so the same
/// frame always yields the same detections and a blank frame yields none.
pub struct StubPredictor {
    score_threshold: f32,
    num_classes: usize,
}

impl StubPredictor {
    pub fn new(score_threshold: f32) -> Self {
        Self {
            score_threshold,
            num_classes: DEFAULT_NUM_CLASSES,
        }
    }

    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes.max(1);
        self
    }
}

impl Predictor for StubPredictor {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn predict(&mut self, frame: &Frame) -> Result<Vec<Instance>> {
        if frame.is_blank() {
            return Ok(Vec::new());
        }

        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();
        let count = (digest[0] % 4) as usize + 1;
        let w = frame.width as f32;
        let h = frame.height as f32;

        let mut instances: Vec<Instance> = digest[1..]
            .chunks_exact(BYTES_PER_INSTANCE)
            .take(count)
            .filter_map(|b| {
                let class_id = b[0] as usize % self.num_classes;
                let x1 = b[1] as f32 / 255.0 * w * 0.7;
                let y1 = b[2] as f32 / 255.0 * h * 0.7;
                let bw = (0.1 + b[3] as f32 / 255.0 * 0.2) * w;
                let bh = (0.1 + b[4] as f32 / 255.0 * 0.2) * h;
                let score = 0.5 + b[5] as f32 / 255.0 * 0.5;
                if score < self.score_threshold {
                    return None;
                }
                let bbox =
                    BoundingBox::new(x1, y1, x1 + bw, y1 + bh).clamp(frame.width, frame.height);
                let mask = Mask::from_box(frame.width, frame.height, &bbox);
                Some(Instance::new(class_id, bbox, score).with_mask(mask))
            })
            .collect();

        instances.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(instances)
    }
}
