use ab_glyph::FontVec;
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::ClassCatalog;
use crate::detect::{Instance, Mask};
use crate::frame::Frame;

const PALETTE: [[u8; 3]; 10] = [
    [0, 114, 189],
    [217, 83, 25],
    [237, 177, 32],
    [126, 47, 142],
    [119, 172, 48],
    [77, 190, 238],
    [162, 20, 47],
    [76, 76, 76],
    [255, 0, 0],
    [0, 255, 0],
];

const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];
const LABEL_PADDING: u32 = 2;

/// Fonts tried when no font file is configured.
const SYSTEM_FONTS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

/// Stable color for a class id.
pub fn class_color(class_id: usize) -> [u8; 3] {
    PALETTE[class_id % PALETTE.len()]
}

/// `"<name> <score>%"` label for one instance.
pub fn instance_label(instance: &Instance, catalog: &ClassCatalog) -> String {
    format!(
        "{} {:.0}%",
        catalog.name(instance.class_id),
        instance.score * 100.0
    )
}

/// Load a TrueType/OpenType font for label text.
pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read font {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))
}

/// First readable font from the usual system locations.
pub fn system_font() -> Option<FontVec> {
    SYSTEM_FONTS
        .iter()
        .map(Path::new)
        .filter(|path| path.exists())
        .find_map(|path| load_font(path).ok())
}

/// Draws masks, boxes and class labels over a frame.
///
/// Without a font the label tab is still drawn, sized for the text, but
/// holds no glyphs.
#[derive(Clone)]
pub struct Visualizer {
    mask_alpha: f32,
    box_thickness: u32,
    /// Label text height in pixels.
    label_scale: f32,
    font: Option<Arc<FontVec>>,
}

impl std::fmt::Debug for Visualizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visualizer")
            .field("mask_alpha", &self.mask_alpha)
            .field("box_thickness", &self.box_thickness)
            .field("label_scale", &self.label_scale)
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self {
            mask_alpha: 0.5,
            box_thickness: 2,
            label_scale: 12.0,
            font: None,
        }
    }
}

impl Visualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mask_alpha(mut self, alpha: f32) -> Self {
        self.mask_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn with_box_thickness(mut self, thickness: u32) -> Self {
        self.box_thickness = thickness.max(1);
        self
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(Arc::new(font));
        self
    }

    /// RGB copy of `frame` with `instances` drawn on top, labelled from `catalog`.
    pub fn render(
        &self,
        frame: &Frame,
        instances: &[&Instance],
        catalog: &ClassCatalog,
    ) -> Result<RgbImage> {
        let mut image = frame.to_rgb_image()?;
        for instance in instances {
            let color = class_color(instance.class_id);
            if let Some(mask) = &instance.mask {
                self.blend_mask(&mut image, mask, color);
            }
            self.draw_box(&mut image, instance, color);
        }
        // Labels last so masks of later instances do not cover them.
        for instance in instances {
            let label = instance_label(instance, catalog);
            self.draw_label(&mut image, instance, &label, class_color(instance.class_id));
        }
        Ok(image)
    }

    fn blend_mask(&self, image: &mut RgbImage, mask: &Mask, color: [u8; 3]) {
        let width = image.width().min(mask.width);
        let height = image.height().min(mask.height);
        let a = self.mask_alpha;
        for y in 0..height {
            for x in 0..width {
                if !mask.contains(x, y) {
                    continue;
                }
                let px = image.get_pixel_mut(x, y);
                for c in 0..3 {
                    px[c] = (px[c] as f32 * (1.0 - a) + color[c] as f32 * a).round() as u8;
                }
            }
        }
    }

    fn draw_box(&self, image: &mut RgbImage, instance: &Instance, color: [u8; 3]) {
        let bbox = instance.bbox.clamp(image.width(), image.height());
        let x = bbox.x1 as i32;
        let y = bbox.y1 as i32;
        let w = bbox.width() as u32;
        let h = bbox.height() as u32;
        if w == 0 || h == 0 {
            return;
        }
        // Nested outlines give the stroke its thickness.
        for t in 0..self.box_thickness.min(w / 2).min(h / 2).max(1) {
            let rect = Rect::at(x + t as i32, y + t as i32).of_size(
                (w - 2 * t).max(1),
                (h - 2 * t).max(1),
            );
            draw_hollow_rect_mut(image, rect, Rgb(color));
        }
    }

    /// Pixel size of the label text.
    fn label_size(&self, label: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(self.label_scale, &**font, label),
            None => {
                let glyph_width = (self.label_scale * 0.6).ceil() as u32;
                (
                    glyph_width * label.chars().count() as u32,
                    self.label_scale.ceil() as u32,
                )
            }
        }
    }

    /// Filled tab at the box's top-left, above the box when it fits.
    fn draw_label(&self, image: &mut RgbImage, instance: &Instance, label: &str, color: [u8; 3]) {
        let bbox = instance.bbox.clamp(image.width(), image.height());
        if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return;
        }
        let (text_w, text_h) = self.label_size(label);
        let tab_w = text_w + 2 * LABEL_PADDING;
        let tab_h = text_h + 2 * LABEL_PADDING;
        let x = bbox.x1 as i32;
        let top = bbox.y1 as i32;
        let y = if top >= tab_h as i32 { top - tab_h as i32 } else { top };

        draw_filled_rect_mut(image, Rect::at(x, y).of_size(tab_w, tab_h), Rgb(color));
        if let Some(font) = &self.font {
            draw_text_mut(
                image,
                Rgb(LABEL_TEXT_COLOR),
                x + LABEL_PADDING as i32,
                y + LABEL_PADDING as i32,
                self.label_scale,
                &**font,
                label,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::COCO_2017_TRAIN;
    use crate::detect::BoundingBox;

    fn coco() -> ClassCatalog {
        ClassCatalog::for_dataset(COCO_2017_TRAIN).unwrap()
    }

    #[test]
    fn render_without_instances_is_rgb_copy() {
        let frame = Frame::from_bgr8(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let image = Visualizer::new().render(&frame, &[], &coco()).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(image.get_pixel(1, 0).0, [6, 5, 4]);
    }

    #[test]
    fn render_draws_box_outline_in_class_color() {
        let frame = Frame::zeroed(60, 60, 3);
        let instance = Instance::new(1, BoundingBox::new(10.0, 30.0, 30.0, 45.0), 0.9);
        let image = Visualizer::new()
            .with_box_thickness(1)
            .render(&frame, &[&instance], &coco())
            .unwrap();
        assert_eq!(image.get_pixel(29, 30).0, class_color(1));
        assert_eq!(image.get_pixel(20, 44).0, class_color(1));
        // Interior and surroundings untouched.
        assert_eq!(image.get_pixel(20, 38).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(5, 50).0, [0, 0, 0]);
    }

    #[test]
    fn mask_is_alpha_blended() {
        let frame = Frame::zeroed(30, 30, 3);
        let bbox = BoundingBox::new(0.0, 0.0, 20.0, 20.0);
        let instance = Instance::new(0, bbox, 0.9).with_mask(Mask::from_box(30, 30, &bbox));
        let image = Visualizer::new()
            .with_mask_alpha(0.5)
            .render(&frame, &[&instance], &coco())
            .unwrap();
        let expected = class_color(0).map(|c| (c as f32 * 0.5).round() as u8);
        assert_eq!(image.get_pixel(10, 16).0, expected);
        assert_eq!(image.get_pixel(25, 25).0, [0, 0, 0]);
    }

    #[test]
    fn label_names_class_and_score() {
        let instance = Instance::new(2, BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.874);
        assert_eq!(instance_label(&instance, &coco()), "car 87%");
        let unknown = Instance::new(500, BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.5);
        assert_eq!(instance_label(&unknown, &coco()), "class_500 50%");
    }

    #[test]
    fn label_tab_sits_above_the_box() {
        let frame = Frame::zeroed(120, 80, 3);
        let instance = Instance::new(0, BoundingBox::new(10.0, 40.0, 60.0, 70.0), 0.9);
        let plain = Visualizer::new();
        let image = plain.render(&frame, &[&instance], &coco()).unwrap();

        let (text_w, text_h) = plain.label_size("person 90%");
        let tab_h = text_h + 2 * LABEL_PADDING;
        // Tab occupies the rows just above the box, starting at its left edge.
        assert_eq!(image.get_pixel(12, 40 - tab_h / 2).0, class_color(0));
        assert_eq!(image.get_pixel(10 + text_w, 39).0, class_color(0));
        assert_eq!(image.get_pixel(12, 40 - tab_h - 1).0, [0, 0, 0]);
    }

    #[test]
    fn label_tab_moves_inside_at_top_edge() {
        let frame = Frame::zeroed(80, 60, 3);
        let instance = Instance::new(3, BoundingBox::new(5.0, 0.0, 70.0, 50.0), 0.9);
        let image = Visualizer::new()
            .render(&frame, &[&instance], &coco())
            .unwrap();
        assert_eq!(image.get_pixel(20, 8).0, class_color(3));
    }

    #[test]
    fn label_text_is_drawn_with_a_font() {
        let Some(font) = system_font() else {
            return;
        };
        let frame = Frame::zeroed(160, 80, 3);
        let instance = Instance::new(0, BoundingBox::new(10.0, 40.0, 150.0, 70.0), 0.9);
        let image = Visualizer::new()
            .with_font(font)
            .render(&frame, &[&instance], &coco())
            .unwrap();
        let text_pixels = (10..150)
            .flat_map(|x| (20..40).map(move |y| (x, y)))
            .filter(|&(x, y)| {
                let px = image.get_pixel(x, y).0;
                px != class_color(0) && px != [0, 0, 0]
            })
            .count();
        assert!(text_pixels > 0);
    }

    #[test]
    fn load_font_rejects_non_font_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-font.ttf");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(load_font(&path).is_err());
        assert!(load_font(&dir.path().join("missing.ttf")).is_err());
    }
}
