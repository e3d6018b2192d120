//! Frame storage and hand-off.
//!
//! - `Frame`: owned BGR8 pixel buffer (height × width × channels, row-major).
//! - `FrameSlot`: single-slot exchange between the image subscriber and the
//!   detect loop. Publishing swaps the whole `Arc<Frame>`, so a reader sees
//!   either the previous frame or the new one, never a partial write.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Only interleaved 3-channel BGR frames are handled by the detector.
pub const FRAME_CHANNELS: u8 = 3;

/// Owned BGR8 frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl Frame {
    /// All-black frame of the given shape.
    pub fn zeroed(width: u32, height: u32, channels: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self {
            data: vec![0u8; len],
            width,
            height,
            channels,
        }
    }

    /// Wrap an interleaved BGR8 buffer. The length must be `width * height * 3`.
    pub fn from_bgr8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(FRAME_CHANNELS as usize))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} BGR bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            channels: FRAME_CHANNELS,
        })
    }

    /// Convert an RGB image into a BGR frame.
    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let mut data = Vec::with_capacity(image.as_raw().len());
        for px in image.pixels() {
            data.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        Self {
            data,
            width: image.width(),
            height: image.height(),
            channels: FRAME_CHANNELS,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn shape(&self) -> (u32, u32, u8) {
        (self.height, self.width, self.channels)
    }

    /// True when every byte is zero (the state right after construction).
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// BGR channels of pixel `(x, y)`.
    pub fn bgr_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height || self.channels != FRAME_CHANNELS {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * FRAME_CHANNELS as usize;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Channel-swapped copy for rendering and encoding.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        if self.channels != FRAME_CHANNELS {
            return Err(anyhow!(
                "cannot render {}-channel frame as RGB",
                self.channels
            ));
        }
        let mut rgb = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(3) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }
}

/// Frame taken from the slot together with its publish sequence number.
#[derive(Clone, Debug)]
pub struct FrameSnapshot {
    pub frame: Arc<Frame>,
    /// 0 for the initial blank frame, then incremented on every publish.
    pub seq: u64,
}

struct SlotState {
    frame: Arc<Frame>,
    seq: u64,
    warned_shapes: HashSet<(u32, u32, u8)>,
}

/// Most-recent-wins frame exchange.
///
/// The slot is created holding the configured blank frame; its shape is the
/// expected shape for later frames. Mismatched frames are still accepted,
/// with a warning logged once per distinct shape.
pub struct FrameSlot {
    expected: (u32, u32, u8),
    state: Mutex<SlotState>,
}

impl FrameSlot {
    pub fn new(initial: Frame) -> Self {
        Self {
            expected: initial.shape(),
            state: Mutex::new(SlotState {
                frame: Arc::new(initial),
                seq: 0,
                warned_shapes: HashSet::new(),
            }),
        }
    }

    /// Replace the current frame. Returns the new sequence number.
    pub fn publish(&self, frame: Frame) -> Result<u64> {
        let shape = frame.shape();
        let frame = Arc::new(frame);
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("frame slot lock poisoned"))?;
        if shape != self.expected && state.warned_shapes.insert(shape) {
            log::warn!(
                "frame shape {:?} differs from configured {:?}",
                shape,
                self.expected
            );
        }
        state.frame = frame;
        state.seq += 1;
        Ok(state.seq)
    }

    /// Take the current frame. Only the `Arc` is cloned.
    pub fn snapshot(&self) -> Result<FrameSnapshot> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("frame slot lock poisoned"))?;
        Ok(FrameSnapshot {
            frame: Arc::clone(&state.frame),
            seq: state.seq,
        })
    }

    pub fn expected_shape(&self) -> (u32, u32, u8) {
        self.expected
    }
}
