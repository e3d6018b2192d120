//! Generated camera frames for `stub://` topics.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::Frame;

/// Synthetic camera.
///
/// Produces a gradient background with a bright square drifting across it,
/// so consecutive frames always differ.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_count: u64,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_count: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible jitter.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame_count
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;

        let w = self.width as usize;
        let h = self.height as usize;
        let mut pixels = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) * 3;
                pixels[idx] = (x * 255 / w.max(1)) as u8;
                pixels[idx + 1] = (y * 255 / h.max(1)) as u8;
                pixels[idx + 2] = 64;
            }
        }

        let side = (w.min(h) / 4).max(1);
        let travel = w.saturating_sub(side).max(1);
        let x0 = (self.frame_count as usize * 7) % travel;
        let jitter = self.rng.gen_range(0..=h.saturating_sub(side) / 8);
        let y0 = (h.saturating_sub(side) / 2 + jitter).min(h.saturating_sub(side));
        for y in y0..(y0 + side).min(h) {
            for x in x0..(x0 + side).min(w) {
                let idx = (y * w + x) * 3;
                pixels[idx..idx + 3].copy_from_slice(&[40, 200, 255]);
            }
        }

        Frame::from_bgr8(self.width, self.height, pixels)
    }
}
