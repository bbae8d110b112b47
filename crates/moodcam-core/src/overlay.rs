//! Overlay drawn over the video: detection boxes and the emotion caption.

use crate::emotion::DominantEmotion;
use crate::types::{BoundingBox, FaceDetection};
use image::{Rgba, RgbaImage};
use std::path::Path;

const BOX_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);
const BOX_LINE_WIDTH: u32 = 2;
const LABEL_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 128]);
const LABEL_FONT_SIZE: u32 = 16;
const LABEL_PADDING: u32 = 10;

/// A drawable surface laid over the video.
pub trait OverlaySurface: Send {
    /// Surface size in pixels.
    fn size(&self) -> (u32, u32);
    fn clear(&mut self);
    fn draw_box(&mut self, bounding_box: &BoundingBox);
    fn draw_label(&mut self, anchor: (f32, f32), text: &str);
}

/// Scale detections from frame pixel space onto an overlay of `display` size.
pub fn project_detections(
    faces: &[FaceDetection],
    frame: (u32, u32),
    display: (u32, u32),
) -> Vec<BoundingBox> {
    faces
        .iter()
        .map(|f| f.bounding_box.rescaled(frame, display))
        .collect()
}

/// Replace whatever is on `overlay` with `faces` and the dominant caption.
///
/// The caption is anchored at the first face's bottom-left corner.
pub fn redraw(
    overlay: &mut dyn OverlaySurface,
    faces: &[FaceDetection],
    frame: (u32, u32),
    dominant: &DominantEmotion,
) {
    let boxes = project_detections(faces, frame, overlay.size());
    overlay.clear();
    for b in &boxes {
        overlay.draw_box(b);
    }
    if let Some(first) = boxes.first() {
        overlay.draw_label(first.bottom_left(), &dominant.caption());
    }
}

/// Raster overlay backed by an RGBA image.
///
/// Text is not rasterized; the label background is, and the caption is kept
/// alongside for callers that print it.
pub struct CanvasOverlay {
    image: RgbaImage,
    caption: Option<String>,
}

impl CanvasOverlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            caption: None,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    /// Write the overlay to disk; format follows the extension.
    pub fn save(&self, path: &Path) -> Result<(), image::ImageError> {
        self.image.save(path)
    }

    fn fill_rect(&mut self, x0: i64, y0: i64, w: u32, h: u32, color: Rgba<u8>) {
        let (iw, ih) = self.image.dimensions();
        let x_start = x0.clamp(0, iw as i64) as u32;
        let y_start = y0.clamp(0, ih as i64) as u32;
        let x_end = (x0 + w as i64).clamp(0, iw as i64) as u32;
        let y_end = (y0 + h as i64).clamp(0, ih as i64) as u32;
        for y in y_start..y_end {
            for x in x_start..x_end {
                self.image.put_pixel(x, y, color);
            }
        }
    }
}

impl OverlaySurface for CanvasOverlay {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn clear(&mut self) {
        for p in self.image.pixels_mut() {
            *p = Rgba([0, 0, 0, 0]);
        }
        self.caption = None;
    }

    fn draw_box(&mut self, b: &BoundingBox) {
        let x = b.x.round() as i64;
        let y = b.y.round() as i64;
        let w = b.width.max(0.0).round() as u32;
        let h = b.height.max(0.0).round() as u32;
        let t = BOX_LINE_WIDTH;

        self.fill_rect(x, y, w, t, BOX_COLOR);
        self.fill_rect(x, y + h as i64 - t as i64, w, t, BOX_COLOR);
        self.fill_rect(x, y, t, h, BOX_COLOR);
        self.fill_rect(x + w as i64 - t as i64, y, t, h, BOX_COLOR);
    }

    fn draw_label(&mut self, anchor: (f32, f32), text: &str) {
        // Approximate glyph advance at 0.6em.
        let text_w = (text.chars().count() as f32 * LABEL_FONT_SIZE as f32 * 0.6).ceil() as u32;
        let w = text_w + 2 * LABEL_PADDING;
        let h = LABEL_FONT_SIZE + 2 * LABEL_PADDING;
        self.fill_rect(anchor.0.round() as i64, anchor.1.round() as i64, w, h, LABEL_BACKGROUND);
        self.caption = Some(text.to_string());
    }
}
