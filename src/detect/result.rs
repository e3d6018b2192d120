use anyhow::{anyhow, Result};

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left, `(x2, y2)` bottom-right.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn center(&self) -> [f32; 2] {
        [(self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0]
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Clip to `[0, width] x [0, height]`.
    pub fn clamp(&self, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// Binary per-pixel mask, frame sized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn new(width: u32, height: u32, bits: Vec<bool>) -> Result<Self> {
        if bits.len() != width as usize * height as usize {
            return Err(anyhow!(
                "mask has {} cells, expected {}x{}",
                bits.len(),
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            bits,
        })
    }

    /// Rectangle mask covering `bbox`, used when a backend has no mask head.
    pub fn from_box(width: u32, height: u32, bbox: &BoundingBox) -> Self {
        let b = bbox.clamp(width, height);
        let mut bits = vec![false; width as usize * height as usize];
        for y in b.y1 as u32..b.y2 as u32 {
            for x in b.x1 as u32..b.x2 as u32 {
                bits[y as usize * width as usize + x as usize] = true;
            }
        }
        Self {
            width,
            height,
            bits,
        }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn area(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }
}

/// One detected object.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    /// Index into the model's class catalog.
    pub class_id: usize,
    pub bbox: BoundingBox,
    pub score: f32,
    pub mask: Option<Mask>,
}

impl Instance {
    pub fn new(class_id: usize, bbox: BoundingBox, score: f32) -> Self {
        Self {
            class_id,
            bbox,
            score,
            mask: None,
        }
    }

    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_is_box_midpoint() {
        let b = BoundingBox::new(10.0, 20.0, 30.0, 60.0);
        assert_eq!(b.center(), [20.0, 40.0]);
        assert_eq!(b.to_array(), [10.0, 20.0, 30.0, 60.0]);
        assert_eq!(b.width(), 20.0);
        assert_eq!(b.height(), 40.0);
    }

    #[test]
    fn clamp_keeps_box_inside_frame() {
        let b = BoundingBox::new(-5.0, 2.0, 120.0, 50.0).clamp(100, 40);
        assert_eq!(b.to_array(), [0.0, 2.0, 100.0, 40.0]);
    }

    #[test]
    fn mask_from_box_covers_box_area() {
        let mask = Mask::from_box(10, 10, &BoundingBox::new(2.0, 3.0, 5.0, 7.0));
        assert_eq!(mask.area(), 12);
        assert!(mask.contains(2, 3));
        assert!(!mask.contains(5, 7));
        assert!(!mask.contains(20, 20));
    }

    #[test]
    fn mask_rejects_wrong_size() {
        assert!(Mask::new(2, 2, vec![true; 3]).is_err());
    }
}
